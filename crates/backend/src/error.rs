use scrivener_types::{TransitionError, ValidationError};

/// Every error a store implementation can return.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested change would break the run lifecycle.
    #[error("invalid run transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// The record was rejected before it reached storage.
    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing storage cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn transformation_not_found(id: &str) -> Self {
        StoreError::NotFound {
            entity: "transformation",
            id: id.to_string(),
        }
    }

    pub fn run_not_found(id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "transformation run",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

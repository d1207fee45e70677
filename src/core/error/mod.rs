use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Application-level failure surfaced to a CLI user.
///
/// Domain errors (`StoreError`, `EngineError`, ...) stay typed inside the
/// engine; they are wrapped into an `AppError` with a stable code at the
/// command boundary.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            severity: ErrorSeverity::Error,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            recovery_suggestions: vec![],
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_suggestion<T: Into<String>>(mut self, suggestion: T) -> Self {
        self.recovery_suggestions.push(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::InternalError, e.to_string())
            .with_code("ANYHOW_ERROR")
            .with_suggestion("Check the error details");
        error.source = Some(e);
        error
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), Box::new(e))
            .with_code("IO_ERROR")
            .with_suggestion("Check file permissions and paths")
    }
}

impl From<scrivener_backend::StoreError> for AppError {
    fn from(e: scrivener_backend::StoreError) -> Self {
        let (category, code) = match &e {
            scrivener_backend::StoreError::NotFound { .. } => {
                (ErrorCategory::ValidationError, "STORE-404")
            }
            scrivener_backend::StoreError::Conflict(_)
            | scrivener_backend::StoreError::Invalid(_)
            | scrivener_backend::StoreError::InvalidTransition(_) => {
                (ErrorCategory::ValidationError, "STORE-400")
            }
            scrivener_backend::StoreError::Serialization(_) => {
                (ErrorCategory::SerializationError, "STORE-422")
            }
            scrivener_backend::StoreError::Database(_)
            | scrivener_backend::StoreError::Unavailable(_) => {
                (ErrorCategory::StorageError, "STORE-500")
            }
        };
        AppError::with_source(category, e.to_string(), Box::new(e)).with_code(code)
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str, context: Option<String>);
}

/// Writes errors to stderr for the user and mirrors them into the tracing log.
pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    pub fn new() -> Self {
        DefaultErrorReporter
    }
}

impl Default for DefaultErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        if error.severity == ErrorSeverity::Warning {
            let context = (!error.context.is_empty()).then(|| format!("{:?}", error.context));
            self.report_warning(&format!("{}: {}", error.code, error.message), context);
            for suggestion in &error.recovery_suggestions {
                eprintln!("  Hint: {}", suggestion);
            }
            return;
        }

        tracing::error!(
            code = %error.code,
            category = %error.category,
            occurred_at = %error.occurred_at,
            "{}",
            error.message
        );
        eprintln!("[ERROR] {}: {}", error.code, error.message);
        if !error.context.is_empty() {
            eprintln!("  Context: {:?}", error.context);
        }
        if let Some(ref source) = error.source {
            if source.to_string() != error.message {
                eprintln!("  Caused by: {}", source);
            }
        }
        for suggestion in &error.recovery_suggestions {
            eprintln!("  Hint: {}", suggestion);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        tracing::warn!("{}", message);
        eprintln!("[WARNING] {}", message);
        if let Some(ref ctx) = context {
            eprintln!("  Context: {}", ctx);
        }
    }
}

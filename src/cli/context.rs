#![allow(clippy::result_large_err)]

use crate::core::{
    AppError, ConfigLoader, Credentials, ErrorCategory, PipelineOrchestrator, ProviderRegistry,
    ScrivenerConfig, StepEvaluator,
};
use scrivener_backend::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a subcommand needs: resolved configuration and an open store.
pub struct CommandContext {
    pub config: ScrivenerConfig,
    pub workspace: PathBuf,
    pub store: Arc<SqliteStore>,
}

impl CommandContext {
    pub async fn open(
        config_path: Option<&Path>,
        database: Option<&Path>,
        workspace: &Path,
    ) -> Result<Self, AppError> {
        let mut config = ConfigLoader::load(config_path, workspace)?;
        if let Some(database) = database {
            config.storage.database_path = database.to_path_buf();
        }

        let database_path = if config.storage.database_path.is_absolute() {
            config.storage.database_path.clone()
        } else {
            workspace.join(&config.storage.database_path)
        };
        tracing::debug!(path = %database_path.display(), "Opening run store");
        let store = SqliteStore::open(&database_path).await.map_err(|e| {
            AppError::from(e)
                .with_context(format!("database: {}", database_path.display()))
                .with_suggestion("Pass --database or set SCRIVENER_DATABASE_PATH to a writable file")
        })?;

        Ok(CommandContext {
            config,
            workspace: workspace.to_path_buf(),
            store: Arc::new(store),
        })
    }

    /// Engine wired to the vendor adapters and the keys from configuration.
    pub fn orchestrator(&self) -> Result<PipelineOrchestrator, AppError> {
        let providers = ProviderRegistry::from_config(
            &self.config.providers,
            self.config.execution.request_timeout(),
        )
        .map_err(|e| {
            AppError::with_source(
                ErrorCategory::ConfigurationError,
                format!("Failed to build HTTP client: {}", e),
                Box::new(e),
            )
            .with_code("CFG-020")
        })?;
        let credentials = Credentials::from_config(&self.config.providers);
        Ok(PipelineOrchestrator::new(
            self.store.clone(),
            StepEvaluator::new(providers, credentials),
        ))
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

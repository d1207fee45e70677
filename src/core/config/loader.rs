#![allow(clippy::result_large_err)]

use super::{ConfigValidator, ScrivenerConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use scrivener_types::InferenceProvider;
use std::env;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "scrivener.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the full configuration: defaults, then the config file, then
    /// environment overrides, then validation.
    ///
    /// An explicit `config_path` must exist; the workspace file is optional.
    pub fn load(
        config_path: Option<&Path>,
        workspace_path: &Path,
    ) -> Result<ScrivenerConfig, AppError> {
        let config = match config_path {
            Some(path) => {
                let mut config = Self::load_from_file(path)?.ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ConfigurationError,
                        format!("Config file {} does not exist", path.display()),
                    )
                    .with_code("CFG-003")
                })?;
                Self::apply_env_overrides(&mut config);
                config
            }
            None => Self::load_from_workspace(workspace_path)?,
        };

        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load config from workspace root (workspace/scrivener.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<ScrivenerConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ScrivenerConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("CFG-001")
        })?;

        let config: ScrivenerConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Environment variables take precedence over config file values
    fn apply_env_overrides(config: &mut ScrivenerConfig) {
        if let Ok(database_path) = env::var("SCRIVENER_DATABASE_PATH") {
            if !database_path.trim().is_empty() {
                config.storage.database_path = PathBuf::from(database_path);
            }
        }

        for provider in InferenceProvider::ALL {
            let prefix = Self::env_prefix(provider);
            let section = config.providers.get_mut(provider);
            if let Ok(api_key) = env::var(format!("{}_API_KEY", prefix)) {
                if !api_key.trim().is_empty() {
                    section.api_key = Some(api_key);
                }
            }
            if let Ok(base_url) = env::var(format!("{}_BASE_URL", prefix)) {
                if !base_url.trim().is_empty() {
                    section.base_url = Some(base_url);
                }
            }
        }

        if let Ok(timeout_str) = env::var("SCRIVENER_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout_str.trim().parse::<u64>() {
                config.execution.request_timeout_seconds = timeout;
            }
        }

        if let Ok(timeout_str) = env::var("SCRIVENER_STEP_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout_str.trim().parse::<u64>() {
                config.execution.step_timeout_seconds = Some(timeout);
            }
        }
    }

    fn env_prefix(provider: InferenceProvider) -> &'static str {
        match provider {
            InferenceProvider::OpenAi => "SCRIVENER_OPENAI",
            InferenceProvider::Groq => "SCRIVENER_GROQ",
            InferenceProvider::Anthropic => "SCRIVENER_ANTHROPIC",
            InferenceProvider::Google => "SCRIVENER_GOOGLE",
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "SCRIVENER_DATABASE_PATH - Override the run store database (default: .scrivener/scrivener.db)",
            "SCRIVENER_OPENAI_API_KEY - API key for OpenAI prompt steps",
            "SCRIVENER_GROQ_API_KEY - API key for Groq prompt steps",
            "SCRIVENER_ANTHROPIC_API_KEY - API key for Anthropic prompt steps",
            "SCRIVENER_GOOGLE_API_KEY - API key for Google prompt steps",
            "SCRIVENER_OPENAI_BASE_URL - Override the OpenAI endpoint",
            "SCRIVENER_GROQ_BASE_URL - Override the Groq endpoint",
            "SCRIVENER_ANTHROPIC_BASE_URL - Override the Anthropic endpoint",
            "SCRIVENER_GOOGLE_BASE_URL - Override the Google endpoint",
            "SCRIVENER_REQUEST_TIMEOUT_SECONDS - Transport timeout per vendor request (default: 60)",
            "SCRIVENER_STEP_TIMEOUT_SECONDS - Deadline for a single step (default: none)",
        ]
    }
}

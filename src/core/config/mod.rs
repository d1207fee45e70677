use scrivener_types::InferenceProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

/// Main Scrivener configuration loaded from scrivener.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScrivenerConfig {
    /// Run store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-vendor credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Execution limits
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

/// One section per completion vendor
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub groq: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub google: ProviderConfig,
}

/// Credential and endpoint for a single vendor
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override of the vendor's public endpoint, e.g. for a proxy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Transport timeout for a single vendor request
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Deadline for one step; unset means no engine-level deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_seconds: Option<u64>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: InferenceProvider) -> &ProviderConfig {
        match provider {
            InferenceProvider::OpenAi => &self.openai,
            InferenceProvider::Groq => &self.groq,
            InferenceProvider::Anthropic => &self.anthropic,
            InferenceProvider::Google => &self.google,
        }
    }

    pub fn get_mut(&mut self, provider: InferenceProvider) -> &mut ProviderConfig {
        match provider {
            InferenceProvider::OpenAi => &mut self.openai,
            InferenceProvider::Groq => &mut self.groq,
            InferenceProvider::Anthropic => &mut self.anthropic,
            InferenceProvider::Google => &mut self.google,
        }
    }
}

impl ExecutionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_seconds.map(Duration::from_secs)
    }
}

// Default functions
fn default_database_path() -> PathBuf {
    PathBuf::from(".scrivener/scrivener.db")
}

fn default_request_timeout_seconds() -> u64 {
    60
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: default_database_path(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            request_timeout_seconds: default_request_timeout_seconds(),
            step_timeout_seconds: None,
        }
    }
}

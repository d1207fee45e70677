//! Completion vendor adapters.
//!
//! Each adapter turns one vendor's HTTP contract into
//! [`CompletionProvider::complete`] and maps the vendor's failures into the
//! shared [`CompletionError`] taxonomy. Nothing vendor-specific crosses this
//! module's boundary.

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiCompatibleProvider;

use crate::core::config::ProvidersConfig;
use async_trait::async_trait;
use scrivener_types::InferenceProvider;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Secret credential for one vendor. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Keys passed explicitly into every completion call.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<InferenceProvider, ApiKey>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, provider: InferenceProvider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, ApiKey::new(key));
        self
    }

    pub fn get(&self, provider: InferenceProvider) -> Option<&ApiKey> {
        self.keys.get(&provider)
    }

    pub fn from_config(config: &ProvidersConfig) -> Self {
        InferenceProvider::ALL
            .into_iter()
            .fold(Credentials::new(), |credentials, provider| {
                match config.get(provider).api_key.as_deref().map(str::trim) {
                    Some(key) if !key.is_empty() => credentials.with_key(provider, key),
                    _ => credentials,
                }
            })
    }

    /// The key for `provider`, or `AuthenticationFailed` before any request is made.
    pub fn require(&self, provider: InferenceProvider) -> Result<&ApiKey, CompletionError> {
        self.get(provider).ok_or_else(|| {
            CompletionError::AuthenticationFailed(ErrorDetail::new(
                provider,
                None,
                format!(
                    "No API key configured for {}. Please add one to your configuration.",
                    provider
                ),
            ))
        })
    }
}

/// Diagnostics carried by every completion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub provider: InferenceProvider,
    pub status: Option<u16>,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(provider: InferenceProvider, status: Option<u16>, message: impl Into<String>) -> Self {
        ErrorDetail {
            provider,
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}, HTTP {})", self.message, self.provider, status),
            None => write!(f, "{} ({})", self.message, self.provider),
        }
    }
}

/// Vendor-agnostic completion failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(ErrorDetail),
    #[error("Access denied: {0}")]
    AccessDenied(ErrorDetail),
    #[error("Model not found: {0}")]
    ModelNotFound(ErrorDetail),
    #[error("Invalid request: {0}")]
    InvalidRequest(ErrorDetail),
    #[error("Rate limited: {0}")]
    RateLimited(ErrorDetail),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(ErrorDetail),
    #[error("Connection failed: {0}")]
    ConnectionFailed(ErrorDetail),
    #[error("Empty response: {0}")]
    EmptyResponse(ErrorDetail),
}

impl CompletionError {
    pub fn detail(&self) -> &ErrorDetail {
        match self {
            CompletionError::AuthenticationFailed(detail)
            | CompletionError::AccessDenied(detail)
            | CompletionError::ModelNotFound(detail)
            | CompletionError::InvalidRequest(detail)
            | CompletionError::RateLimited(detail)
            | CompletionError::ServiceUnavailable(detail)
            | CompletionError::ConnectionFailed(detail)
            | CompletionError::EmptyResponse(detail) => detail,
        }
    }

    /// Map an HTTP failure status into the taxonomy. A vendor message wins over the default text.
    pub fn from_status(
        provider: InferenceProvider,
        status: u16,
        vendor_message: Option<String>,
    ) -> Self {
        let message = |default: String| {
            let text = vendor_message
                .clone()
                .filter(|message| !message.trim().is_empty())
                .unwrap_or(default);
            ErrorDetail::new(provider, Some(status), text)
        };
        match status {
            401 => CompletionError::AuthenticationFailed(message(
                "Your API key appears to be invalid or expired. Please update your API key."
                    .to_string(),
            )),
            403 => CompletionError::AccessDenied(message(
                "Your account doesn't have access to this model or feature.".to_string(),
            )),
            404 => CompletionError::ModelNotFound(message(
                "The requested model was not found. Please check the model name.".to_string(),
            )),
            422 => CompletionError::InvalidRequest(message(
                "The request was valid but the server cannot process it. Please check your parameters."
                    .to_string(),
            )),
            429 => CompletionError::RateLimited(message(
                "Too many requests. Please try again later.".to_string(),
            )),
            status if status >= 500 => CompletionError::ServiceUnavailable(message(format!(
                "The {} service is temporarily unavailable (Error {}). Please try again in a few minutes.",
                provider, status
            ))),
            _ => CompletionError::InvalidRequest(message(format!(
                "Invalid request to {} API.",
                provider
            ))),
        }
    }

    pub fn empty_response(provider: InferenceProvider) -> Self {
        CompletionError::EmptyResponse(ErrorDetail::new(
            provider,
            None,
            format!("{} API returned an empty response", provider),
        ))
    }
}

/// One text-completion vendor.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    fn provider(&self) -> InferenceProvider;

    /// Complete `user_prompt` under `system_prompt`. Returns the vendor's text,
    /// never an empty string.
    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError>;
}

/// Builder used to register adapters before execution.
pub struct ProviderRegistryBuilder {
    providers: HashMap<InferenceProvider, Arc<dyn CompletionProvider>>,
}

impl Default for ProviderRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register an adapter; a later registration for the same vendor replaces the earlier one.
    pub fn register<T: CompletionProvider>(mut self, provider: T) -> Self {
        self.providers.insert(provider.provider(), Arc::new(provider));
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            inner: Arc::new(self.providers),
        }
    }
}

/// Immutable adapter lookup shared by every run.
#[derive(Clone)]
pub struct ProviderRegistry {
    inner: Arc<HashMap<InferenceProvider, Arc<dyn CompletionProvider>>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistryBuilder::new().build()
    }

    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// The four HTTP adapters sharing one client with the given transport timeout.
    pub fn from_config(
        config: &ProvidersConfig,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("scrivener/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::builder()
            .register(OpenAiCompatibleProvider::openai(
                client.clone(),
                config.openai.base_url.as_deref(),
            ))
            .register(OpenAiCompatibleProvider::groq(
                client.clone(),
                config.groq.base_url.as_deref(),
            ))
            .register(AnthropicProvider::new(
                client.clone(),
                config.anthropic.base_url.as_deref(),
            ))
            .register(GoogleProvider::new(client, config.google.base_url.as_deref()))
            .build())
    }

    pub fn get(&self, provider: InferenceProvider) -> Option<Arc<dyn CompletionProvider>> {
        self.inner.get(&provider).cloned()
    }
}

/// A failed HTTP exchange before it is mapped into a [`CompletionError`].
#[derive(Debug)]
pub(crate) enum HttpFailure {
    Transport(reqwest::Error),
    Status { status: u16, body: String },
}

impl HttpFailure {
    pub(crate) fn into_completion_error(self, provider: InferenceProvider) -> CompletionError {
        match self {
            HttpFailure::Transport(err) => {
                let reason = if err.is_timeout() {
                    "the request timed out".to_string()
                } else {
                    err.to_string()
                };
                CompletionError::ConnectionFailed(ErrorDetail::new(
                    provider,
                    None,
                    format!("Unable to connect to the {} service: {}", provider, reason),
                ))
            }
            HttpFailure::Status { status, body } => {
                CompletionError::from_status(provider, status, vendor_error_message(&body))
            }
        }
    }
}

#[derive(Deserialize)]
struct VendorErrorBody {
    error: Option<VendorError>,
}

#[derive(Deserialize)]
struct VendorError {
    message: Option<String>,
}

/// The `error.message` field every supported vendor uses in failure bodies.
pub(crate) fn vendor_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<VendorErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|error| error.message)
}

/// Send the request and return the body of a 2xx response.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<String, HttpFailure> {
    let response = request.send().await.map_err(HttpFailure::Transport)?;
    let status = response.status();
    let body = response.text().await.map_err(HttpFailure::Transport)?;
    if !status.is_success() {
        return Err(HttpFailure::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Decode a success body; anything unreadable counts as an empty response.
pub(crate) fn decode<T: DeserializeOwned>(
    provider: InferenceProvider,
    body: &str,
) -> Result<T, CompletionError> {
    serde_json::from_str(body).map_err(|err| {
        tracing::debug!(%provider, error = %err, "Undecodable completion response");
        CompletionError::empty_response(provider)
    })
}

/// Reject blank text as an empty response.
pub(crate) fn non_empty(provider: InferenceProvider, text: String) -> Result<String, CompletionError> {
    if text.trim().is_empty() {
        Err(CompletionError::empty_response(provider))
    } else {
        Ok(text)
    }
}

/// Strip trailing slashes so paths can be appended verbatim.
pub(crate) fn base_url(configured: Option<&str>, default: &str) -> String {
    configured
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

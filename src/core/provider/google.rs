//! Google Gemini generateContent.

use super::{
    base_url, decode, non_empty, send, CompletionError, CompletionProvider, Credentials,
    ErrorDetail, HttpFailure,
};
use async_trait::async_trait;
use scrivener_types::InferenceProvider;
use serde::{Deserialize, Serialize};
use url::Url;

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: [Content; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GoogleProvider {
    pub fn new(client: reqwest::Client, base: Option<&str>) -> Self {
        GoogleProvider {
            client,
            base_url: base_url(base, GOOGLE_BASE_URL),
        }
    }

    /// The model id is one path segment, percent-encoded as needed.
    fn endpoint(&self, model: &str) -> Result<Url, CompletionError> {
        let invalid = |reason: String| {
            CompletionError::InvalidRequest(ErrorDetail::new(
                InferenceProvider::Google,
                None,
                format!("Invalid Google endpoint for model '{}': {}", model, reason),
            ))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["v1beta", "models"])
            .push(&format!("{}:generateContent", model));
        Ok(url)
    }
}

/// Gemini reports a bad key as 400 with reason `API_KEY_INVALID`.
fn map_failure(failure: HttpFailure) -> CompletionError {
    let provider = InferenceProvider::Google;
    match failure {
        HttpFailure::Status { status: 400, body } if body.contains("API_KEY_INVALID") => {
            let message = super::vendor_error_message(&body).unwrap_or_else(|| {
                "Your API key appears to be invalid or expired. Please update your API key."
                    .to_string()
            });
            CompletionError::AuthenticationFailed(ErrorDetail::new(provider, Some(400), message))
        }
        other => other.into_completion_error(provider),
    }
}

#[async_trait]
impl CompletionProvider for GoogleProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Google
    }

    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        let provider = self.provider();
        let api_key = credentials.require(provider)?;
        // Gemini gets one combined prompt rather than separate roles.
        let payload = GenerateRequest {
            contents: [Content {
                parts: vec![Part {
                    text: Some(format!("{}\n{}", system_prompt, user_prompt)),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let request = self
            .client
            .post(self.endpoint(model)?)
            .header("x-goog-api-key", api_key.expose())
            .json(&payload);
        let body = send(request).await.map_err(map_failure)?;

        let response: GenerateResponse = decode(provider, &body)?;
        let text = response
            .candidates
            .into_iter()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .find(|text| !text.trim().is_empty())
            .unwrap_or_default();
        non_empty(provider, text)
    }
}

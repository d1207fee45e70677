//! Anthropic messages API.

use super::{base_url, decode, non_empty, send, CompletionError, CompletionProvider, Credentials};
use async_trait::async_trait;
use scrivener_types::InferenceProvider;
use serde::{Deserialize, Serialize};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, base: Option<&str>) -> Self {
        AnthropicProvider {
            client,
            endpoint: format!("{}/v1/messages", base_url(base, ANTHROPIC_BASE_URL)),
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Anthropic
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
        let payload = MessagesRequest {
            model,
            system: system_prompt,
            messages: [UserMessage {
                role: "user",
                content: user_prompt,
            }],
            max_tokens: MAX_TOKENS,
        };

        let request = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        let body = send(request)
            .await
            .map_err(|failure| failure.into_completion_error(provider))?;

        let response: MessagesResponse = decode(provider, &body)?;
        // Only text blocks carry output; tool_use and thinking blocks are skipped.
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        non_empty(provider, text)
    }
}

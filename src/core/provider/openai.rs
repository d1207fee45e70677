//! OpenAI chat completions, also spoken by Groq.

use super::{base_url, decode, non_empty, send, CompletionError, CompletionProvider, Credentials};
use async_trait::async_trait;
use scrivener_types::InferenceProvider;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_PATH: &str = "/v1/chat/completions";
const GROQ_BASE_URL: &str = "https://api.groq.com";
const GROQ_PATH: &str = "/openai/v1/chat/completions";

/// Adapter for vendors exposing the OpenAI chat-completions contract.
pub struct OpenAiCompatibleProvider {
    provider: InferenceProvider,
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn openai(client: reqwest::Client, base: Option<&str>) -> Self {
        OpenAiCompatibleProvider {
            provider: InferenceProvider::OpenAi,
            client,
            endpoint: format!("{}{}", base_url(base, OPENAI_BASE_URL), OPENAI_PATH),
        }
    }

    pub fn groq(client: reqwest::Client, base: Option<&str>) -> Self {
        OpenAiCompatibleProvider {
            provider: InferenceProvider::Groq,
            client,
            endpoint: format!("{}{}", base_url(base, GROQ_BASE_URL), GROQ_PATH),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn provider(&self) -> InferenceProvider {
        self.provider
    }

    async fn complete(
        &self,
        credentials: &Credentials,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CompletionError> {
        let api_key = credentials.require(self.provider)?;
        let payload = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose())
            .json(&payload);
        let body = send(request)
            .await
            .map_err(|failure| failure.into_completion_error(self.provider))?;

        let response: ChatResponse = decode(self.provider, &body)?;
        let text = response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content.filter(|text| !text.trim().is_empty()))
            .unwrap_or_default();
        non_empty(self.provider, text)
    }
}

//! Chat completions over the OpenAI chat API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use trailhead_core::PipelineError;

use crate::embedding::OPENAI_BASE_URL;
use crate::http::error_detail;

/// Both chain stages want deterministic output, so the sampling temperature
/// is pinned rather than configurable.
const TEMPERATURE: f32 = 0.0;

/// Produces a completion for a fully rendered prompt.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// [`CompletionClient`] backed by `POST /v1/chat/completions`.
///
/// Each prompt is sent as a single user message; the templates carry all
/// instructions, so no system message is attached.
pub struct OpenAiChat {
    client: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(
        client: Client,
        api_key: SecretString,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
            max_tokens,
            base_url: OPENAI_BASE_URL.to_owned(),
        }
    }

    /// Redirects requests to another host. Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl CompletionClient for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: TEMPERATURE,
                max_tokens: self.max_tokens,
            })
            .send()
            .await
            .map_err(|err| PipelineError::Completion(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Completion(error_detail(status, &body)));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Completion(format!("malformed response: {err}")))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                PipelineError::Completion("response carried no choices".to_owned())
            })?;

        debug!(
            event_name = "rag.completion.received",
            model = %self.model,
            prompt_chars = prompt.len(),
            completion_chars = text.len(),
            "received chat completion"
        );
        Ok(text)
    }
}

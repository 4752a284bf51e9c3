//! Text embeddings over the OpenAI embeddings API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use trailhead_core::PipelineError;

use crate::http::error_detail;

/// Hosted OpenAI API endpoint. Shared with [`crate::completion`].
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Turns a piece of text into a vector suitable for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// [`Embedder`] backed by `POST /v1/embeddings`.
///
/// The HTTP client is supplied by the caller so its timeout and connection
/// pool are configured once, at startup.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
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
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|err| PipelineError::Embedding(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Embedding(error_detail(status, &body)));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Embedding(format!("malformed response: {err}")))?;

        let embedding = payload
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| {
                PipelineError::Embedding("response carried no embedding data".to_owned())
            })?;

        debug!(
            event_name = "rag.embedding.computed",
            model = %self.model,
            dimensions = embedding.len(),
            "computed question embedding"
        );
        Ok(embedding)
    }
}

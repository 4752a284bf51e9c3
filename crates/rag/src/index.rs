//! Similarity search over a Pinecone index.
//!
//! Pinecone splits its API across a control plane and a data plane: the
//! controller endpoint describes an index and hands back the host that
//! actually serves queries. [`PineconeIndex::connect`] performs that lookup
//! once, at startup, so a bad environment or index name fails the process
//! before any Slack traffic arrives.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use trailhead_core::config::PineconeConfig;
use trailhead_core::{PipelineError, SourceDocument};

use crate::http::error_detail;

/// Fetches the documents closest to a query vector.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SourceDocument>, PipelineError>;
}

/// [`VectorIndex`] backed by Pinecone's `POST /query`.
pub struct PineconeIndex {
    client: Client,
    api_key: SecretString,
    host: String,
    namespace: String,
    text_key: String,
}

impl PineconeIndex {
    /// Resolves the index host through the controller and returns a client
    /// bound to it.
    pub async fn connect(client: Client, config: &PineconeConfig) -> Result<Self, PipelineError> {
        let url = controller_url(&config.environment, &config.index_name);
        let response = client
            .get(&url)
            .header("Api-Key", config.api_key.expose_secret())
            .send()
            .await
            .map_err(|err| PipelineError::Retrieval(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Retrieval(error_detail(status, &body)));
        }

        let description: IndexDescription = response
            .json()
            .await
            .map_err(|err| PipelineError::Retrieval(format!("malformed response: {err}")))?;

        if !description.status.ready {
            warn!(
                event_name = "rag.index.not_ready",
                index_name = %config.index_name,
                "index described as not ready; queries may fail until it settles"
            );
        }
        info!(
            event_name = "rag.index.connected",
            index_name = %config.index_name,
            host = %description.status.host,
            namespace = %config.namespace,
            "resolved index host"
        );

        Ok(Self::with_host(
            client,
            config.api_key.clone(),
            description.status.host,
            config.namespace.clone(),
            config.text_key.clone(),
        ))
    }

    /// Binds directly to a known data-plane host, skipping the controller.
    pub fn with_host(
        client: Client,
        api_key: SecretString,
        host: impl Into<String>,
        namespace: impl Into<String>,
        text_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            host: host.into(),
            namespace: namespace.into(),
            text_key: text_key.into(),
        }
    }

    /// Data-plane host resolved at connect time.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn query_url(&self) -> String {
        format!("https://{}/query", self.host)
    }
}

fn controller_url(environment: &str, index_name: &str) -> String {
    format!("https://controller.{environment}.pinecone.io/databases/{index_name}")
}

#[derive(Deserialize)]
struct IndexDescription {
    status: IndexStatus,
}

#[derive(Deserialize)]
struct IndexStatus {
    host: String,
    #[serde(default)]
    ready: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Keeps retriever order. Matches whose metadata lacks the text field are
/// dropped rather than surfaced as empty documents.
fn documents_from_matches(matches: Vec<QueryMatch>, text_key: &str) -> Vec<SourceDocument> {
    matches
        .into_iter()
        .filter_map(|entry| match entry.metadata.get(text_key) {
            Some(serde_json::Value::String(text)) => Some(SourceDocument {
                id: entry.id,
                score: entry.score,
                text: text.clone(),
            }),
            _ => {
                debug!(
                    event_name = "rag.index.match_skipped",
                    match_id = %entry.id,
                    text_key,
                    "match metadata carries no text field"
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SourceDocument>, PipelineError> {
        let response = self
            .client
            .post(self.query_url())
            .header("Api-Key", self.api_key.expose_secret())
            .json(&QueryRequest {
                vector,
                top_k,
                namespace: &self.namespace,
                include_metadata: true,
            })
            .send()
            .await
            .map_err(|err| PipelineError::Retrieval(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Retrieval(error_detail(status, &body)));
        }

        let payload: QueryResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Retrieval(format!("malformed response: {err}")))?;

        let documents = documents_from_matches(payload.matches, &self.text_key);
        debug!(
            event_name = "rag.index.queried",
            top_k,
            matches = documents.len(),
            "fetched similar documents"
        );
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn match_from(value: serde_json::Value) -> QueryMatch {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn controller_url_is_scoped_to_environment_and_index() {
        assert_eq!(
            controller_url("us-west1-gcp", "travel-kb"),
            "https://controller.us-west1-gcp.pinecone.io/databases/travel-kb"
        );
    }

    #[test]
    fn index_description_exposes_the_data_plane_host() {
        let description: IndexDescription = serde_json::from_value(json!({
            "database": {"name": "travel-kb", "dimension": 1536, "metric": "cosine"},
            "status": {"ready": true, "state": "Ready", "host": "travel-kb-abc.svc.us-west1-gcp.pinecone.io", "port": 433}
        }))
        .unwrap();
        assert_eq!(
            description.status.host,
            "travel-kb-abc.svc.us-west1-gcp.pinecone.io"
        );
        assert!(description.status.ready);
    }

    #[test]
    fn query_request_uses_pinecone_field_casing() {
        let body = serde_json::to_value(QueryRequest {
            vector: &[0.5, -0.25],
            top_k: 5,
            namespace: "travel",
            include_metadata: true,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "vector": [0.5, -0.25],
                "topK": 5,
                "namespace": "travel",
                "includeMetadata": true,
            })
        );
    }

    #[test]
    fn matches_map_to_documents_in_retriever_order() {
        let matches = vec![
            match_from(json!({
                "id": "row-12",
                "score": 0.91,
                "metadata": {"combined": "Surf camp, 7 nights, $1200", "source": "listings"}
            })),
            match_from(json!({
                "id": "row-4",
                "score": 0.87,
                "metadata": {"combined": "Yoga retreat, 5 nights, $900"}
            })),
        ];
        let documents = documents_from_matches(matches, "combined");
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id, "row-12");
        assert_eq!(documents[0].text, "Surf camp, 7 nights, $1200");
        assert_eq!(documents[1].id, "row-4");
    }

    #[test]
    fn matches_without_the_text_field_are_dropped() {
        let matches = vec![
            match_from(json!({"id": "a", "score": 0.9, "metadata": {"combined": "kept"}})),
            match_from(json!({"id": "b", "score": 0.8, "metadata": {"other": "no text"}})),
            match_from(json!({"id": "c", "score": 0.7})),
        ];
        let documents = documents_from_matches(matches, "combined");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "a");
    }

    #[test]
    fn query_url_targets_the_resolved_host() {
        let index = PineconeIndex::with_host(
            Client::new(),
            SecretString::from("pc-key".to_owned()),
            "travel-kb-abc.svc.us-west1-gcp.pinecone.io",
            "travel",
            "combined",
        );
        assert_eq!(
            index.query_url(),
            "https://travel-kb-abc.svc.us-west1-gcp.pinecone.io/query"
        );
        assert_eq!(index.host(), "travel-kb-abc.svc.us-west1-gcp.pinecone.io");
    }
}

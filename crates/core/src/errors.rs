use thiserror::Error;

/// Failures raised while producing an answer for a received message.
///
/// Each variant carries the upstream detail as a string; the structured cause
/// is logged at the point of failure, and only the class travels upward so the
/// event handler can choose a user-safe notice.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("vector index request failed: {0}")]
    Retrieval(String),
    #[error("chat completion failed: {0}")]
    Completion(String),
}

impl PipelineError {
    /// A message safe to show in the conversation. Never includes upstream
    /// detail, hosts, or identifiers.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::Embedding(_) | Self::Retrieval(_) => {
                "I couldn't search the knowledge base just now. Please try again in a moment."
            }
            Self::Completion(_) => {
                "I couldn't compose an answer just now. Please try again in a moment."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineError;

    #[test]
    fn retrieval_classes_share_a_search_notice() {
        let embedding = PipelineError::Embedding("429 from upstream".to_owned());
        let retrieval = PipelineError::Retrieval("index host unreachable".to_owned());

        assert_eq!(embedding.user_notice(), retrieval.user_notice());
        assert!(embedding.user_notice().contains("search the knowledge base"));
    }

    #[test]
    fn completion_notice_does_not_leak_upstream_detail() {
        let error = PipelineError::Completion("model gpt-x quota exceeded at host y".to_owned());

        assert!(!error.user_notice().contains("quota"));
        assert!(!error.user_notice().contains("gpt"));
        assert!(error.user_notice().contains("try again"));
    }

    #[test]
    fn display_keeps_the_upstream_detail_for_logs() {
        let error = PipelineError::Retrieval("connection refused".to_owned());
        assert_eq!(error.to_string(), "vector index request failed: connection refused");
    }
}

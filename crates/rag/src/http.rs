//! Shared helpers for the REST clients.

use reqwest::StatusCode;
use serde::Deserialize;

/// Builds a human-readable detail string for a non-success upstream reply.
///
/// Understands the OpenAI error envelope (`{"error": {"message": ...}}`) and
/// the flat `{"message": ...}` shape Pinecone uses, falling back to the bare
/// status line when the body is anything else.
pub(crate) fn error_detail(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct Nested {
        error: NestedMessage,
    }

    #[derive(Deserialize)]
    struct NestedMessage {
        message: String,
    }

    #[derive(Deserialize)]
    struct Flat {
        message: String,
    }

    if let Ok(parsed) = serde_json::from_str::<Nested>(body) {
        return format!("{status}: {}", parsed.error.message);
    }
    if let Ok(parsed) = serde_json::from_str::<Flat>(body) {
        return format!("{status}: {}", parsed.message);
    }
    status.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_error_envelope_is_unwrapped() {
        let detail = error_detail(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#,
        );
        assert_eq!(detail, "401 Unauthorized: Incorrect API key provided");
    }

    #[test]
    fn flat_message_shape_is_unwrapped() {
        let detail = error_detail(
            StatusCode::NOT_FOUND,
            r#"{"message": "namespace not found", "code": 5}"#,
        );
        assert_eq!(detail, "404 Not Found: namespace not found");
    }

    #[test]
    fn unparseable_body_falls_back_to_the_status_line() {
        let detail = error_detail(StatusCode::BAD_GATEWAY, "<html>upstream down</html>");
        assert_eq!(detail, "502 Bad Gateway");
    }
}

//! Slack Web API client.
//!
//! Covers the three methods the assistant needs: `chat.postMessage` for the
//! placeholder, `chat.update` to replace it, and `conversations.history` for
//! the context window. Slack reports failures inside a 200 response
//! (`ok: false` plus an error code), so every call checks the envelope
//! before touching the payload.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use thiserror::Error;
use trailhead_core::HistoryMessage;

use crate::blocks::{Block, MessageTemplate};

/// Hosted Slack Web API endpoint.
pub const SLACK_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatApiError {
    #[error("slack web api request failed: {0}")]
    Request(String),
    #[error("slack {method} was rejected: {error}")]
    Rejected { method: &'static str, error: String },
    #[error("slack {method} response was malformed: {detail}")]
    Malformed {
        method: &'static str,
        detail: String,
    },
}

/// Channel and timestamp of a message accepted by `chat.postMessage`. The
/// timestamp is what later `chat.update` calls address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub ts: String,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, ChatApiError>;

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ChatApiError>;

    /// Fetches up to `limit` messages strictly older than `latest_ts`,
    /// newest first.
    async fn fetch_history(
        &self,
        channel_id: &str,
        latest_ts: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChatApiError>;
}

/// [`ChatApi`] that accepts every call and fetches nothing. Default wiring
/// for dispatchers that are not yet connected to a workspace.
#[derive(Default)]
pub struct NoopChatApi;

#[async_trait]
impl ChatApi for NoopChatApi {
    async fn post_message(
        &self,
        channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<PostedMessage, ChatApiError> {
        Ok(PostedMessage {
            channel_id: channel_id.to_owned(),
            ts: "0000000000.000000".to_owned(),
        })
    }

    async fn update_message(
        &self,
        _channel_id: &str,
        _ts: &str,
        _message: &MessageTemplate,
    ) -> Result<(), ChatApiError> {
        Ok(())
    }

    async fn fetch_history(
        &self,
        _channel_id: &str,
        _latest_ts: &str,
        _limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChatApiError> {
        Ok(Vec::new())
    }
}

/// Production [`ChatApi`] over HTTPS with a bot token.
pub struct SlackWebApi {
    client: Client,
    bot_token: SecretString,
    base_url: String,
}

impl SlackWebApi {
    pub fn new(client: Client, bot_token: SecretString) -> Self {
        Self {
            client,
            bot_token,
            base_url: SLACK_API_BASE_URL.to_owned(),
        }
    }

    /// Redirects requests to another host. Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn post_call<T, R>(&self, method: &'static str, body: &T) -> Result<R, ChatApiError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|err| ChatApiError::Request(format!("{method}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatApiError::Request(format!("{method}: {status}")));
        }

        response.json().await.map_err(|err| ChatApiError::Malformed {
            method,
            detail: err.to_string(),
        })
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: &'a [Block],
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Serialize)]
struct UpdateMessageRequest<'a> {
    channel: &'a str,
    ts: &'a str,
    text: &'a str,
    blocks: &'a [Block],
}

#[derive(Deserialize)]
struct UpdateMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct HistoryQuery<'a> {
    channel: &'a str,
    latest: &'a str,
    inclusive: bool,
    limit: usize,
}

#[derive(Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<RawHistoryMessage>,
}

#[derive(Deserialize)]
struct RawHistoryMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
}

fn rejected(method: &'static str, error: Option<String>) -> ChatApiError {
    ChatApiError::Rejected {
        method,
        error: error.unwrap_or_else(|| "unknown_error".to_owned()),
    }
}

fn history_messages(raw: Vec<RawHistoryMessage>) -> Vec<HistoryMessage> {
    raw.into_iter()
        .map(|message| HistoryMessage {
            sender_id: message.user,
            text: message.text,
        })
        .collect()
}

#[async_trait]
impl ChatApi for SlackWebApi {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, ChatApiError> {
        let response: PostMessageResponse = self
            .post_call(
                "chat.postMessage",
                &PostMessageRequest {
                    channel: channel_id,
                    text: &message.fallback_text,
                    blocks: &message.blocks,
                },
            )
            .await?;

        if !response.ok {
            return Err(rejected("chat.postMessage", response.error));
        }
        match (response.channel, response.ts) {
            (Some(channel_id), Some(ts)) => Ok(PostedMessage { channel_id, ts }),
            _ => Err(ChatApiError::Malformed {
                method: "chat.postMessage",
                detail: "accepted message carried no channel or ts".to_owned(),
            }),
        }
    }

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        message: &MessageTemplate,
    ) -> Result<(), ChatApiError> {
        let response: UpdateMessageResponse = self
            .post_call(
                "chat.update",
                &UpdateMessageRequest {
                    channel: channel_id,
                    ts,
                    text: &message.fallback_text,
                    blocks: &message.blocks,
                },
            )
            .await?;

        if !response.ok {
            return Err(rejected("chat.update", response.error));
        }
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel_id: &str,
        latest_ts: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChatApiError> {
        let response = self
            .client
            .get(self.endpoint("conversations.history"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&HistoryQuery {
                channel: channel_id,
                latest: latest_ts,
                inclusive: false,
                limit,
            })
            .send()
            .await
            .map_err(|err| ChatApiError::Request(format!("conversations.history: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatApiError::Request(format!(
                "conversations.history: {status}"
            )));
        }

        let payload: HistoryResponse =
            response.json().await.map_err(|err| ChatApiError::Malformed {
                method: "conversations.history",
                detail: err.to_string(),
            })?;

        if !payload.ok {
            return Err(rejected("conversations.history", payload.error));
        }
        Ok(history_messages(payload.messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks;
    use serde_json::json;

    #[test]
    fn post_message_request_matches_the_wire_format() {
        let message = blocks::thinking_message();
        let body = serde_json::to_value(PostMessageRequest {
            channel: "D024BE91L",
            text: &message.fallback_text,
            blocks: &message.blocks,
        })
        .unwrap();

        assert_eq!(body["channel"], "D024BE91L");
        assert_eq!(body["text"], "Thinking...");
        assert_eq!(body["blocks"][0]["type"], "section");
        assert_eq!(body["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(body["blocks"][0]["text"]["text"], "Processing ...");
    }

    #[test]
    fn history_query_pins_inclusive_to_false() {
        let query = serde_json::to_value(HistoryQuery {
            channel: "D024BE91L",
            latest: "1730000000.000500",
            inclusive: false,
            limit: 6,
        })
        .unwrap();
        assert_eq!(
            query,
            json!({
                "channel": "D024BE91L",
                "latest": "1730000000.000500",
                "inclusive": false,
                "limit": 6,
            })
        );
    }

    #[test]
    fn history_messages_keep_order_and_optional_senders() {
        let payload: HistoryResponse = serde_json::from_value(json!({
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "text": "newest", "ts": "3"},
                {"type": "message", "bot_id": "B1", "text": "bot reply", "ts": "2"},
                {"type": "message", "user": "U1", "ts": "1"},
            ],
            "has_more": false
        }))
        .unwrap();

        let messages = history_messages(payload.messages);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].sender_id.as_deref(), Some("U1"));
        assert_eq!(messages[0].text, "newest");
        assert_eq!(messages[1].sender_id, None, "bot posts carry no user field");
        assert_eq!(messages[2].text, "", "missing text maps to an empty string");
    }

    #[test]
    fn rejected_error_carries_the_slack_error_code() {
        let error = rejected("chat.update", Some("message_not_found".to_owned()));
        assert_eq!(
            error.to_string(),
            "slack chat.update was rejected: message_not_found"
        );
        let fallback = rejected("chat.postMessage", None);
        assert_eq!(
            fallback.to_string(),
            "slack chat.postMessage was rejected: unknown_error"
        );
    }

    #[tokio::test]
    async fn noop_api_accepts_calls_and_returns_empty_history() {
        let api = NoopChatApi;
        let posted = api
            .post_message("D1", &blocks::thinking_message())
            .await
            .unwrap();
        assert_eq!(posted.channel_id, "D1");
        api.update_message("D1", &posted.ts, &blocks::answer_message("hi"))
            .await
            .unwrap();
        assert!(api.fetch_history("D1", &posted.ts, 6).await.unwrap().is_empty());
    }
}

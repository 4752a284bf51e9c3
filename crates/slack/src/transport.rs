//! Production Socket Mode transport.
//!
//! `apps.connections.open` trades the app-level token for a single-use
//! websocket URL; the stream then carries control frames (`hello`,
//! `disconnect`) and envelopes. Slack retires each connection after a while
//! and says so with a `disconnect` frame, so the transport reopens the
//! socket itself and hands the runner an uninterrupted stream of envelopes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::api::SLACK_API_BASE_URL;
use crate::events::{MessageEvent, SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    client: Client,
    app_token: SecretString,
    base_url: String,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketTransport {
    pub fn new(client: Client, app_token: SecretString) -> Self {
        Self {
            client,
            app_token,
            base_url: SLACK_API_BASE_URL.to_owned(),
            stream: Mutex::new(None),
        }
    }

    /// Redirects the `apps.connections.open` call to another host.
    /// Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn open_socket_url(&self) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}/apps.connections.open", self.base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connect(format!(
                "apps.connections.open: {status}"
            )));
        }

        let payload: ConnectionsOpenResponse = response.json().await.map_err(|err| {
            TransportError::Connect(format!("malformed apps.connections.open response: {err}"))
        })?;

        if !payload.ok {
            return Err(TransportError::Connect(format!(
                "apps.connections.open was rejected: {}",
                payload.error.unwrap_or_else(|| "unknown_error".to_owned())
            )));
        }
        payload.url.ok_or_else(|| {
            TransportError::Connect("apps.connections.open carried no url".to_owned())
        })
    }
}

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

enum Frame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SlackEnvelope),
    Unknown { kind: String },
}

enum FrameAction {
    Skip,
    Reconnect,
    Deliver(SlackEnvelope),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

fn parse_frame(payload: &str) -> Result<Frame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(payload)?;
    Ok(match raw.kind.as_str() {
        "hello" => Frame::Hello,
        "disconnect" => Frame::Disconnect { reason: raw.reason },
        kind => match raw.envelope_id {
            Some(envelope_id) => Frame::Envelope(SlackEnvelope {
                envelope_id,
                event: envelope_event(kind, raw.payload),
            }),
            None => Frame::Unknown { kind: kind.to_owned() },
        },
    })
}

fn envelope_event(kind: &str, payload: Option<RawPayload>) -> SlackEvent {
    if kind != "events_api" {
        return SlackEvent::Unsupported { event_type: kind.to_owned() };
    }
    let Some(event) = payload.and_then(|payload| payload.event) else {
        return SlackEvent::Unsupported { event_type: kind.to_owned() };
    };
    if event.kind != "message" {
        return SlackEvent::Unsupported { event_type: event.kind };
    }

    SlackEvent::Message(MessageEvent {
        channel_id: event.channel.unwrap_or_default(),
        channel_type: event.channel_type.unwrap_or_default(),
        user_id: event.user,
        text: event.text.unwrap_or_default(),
        ts: event.ts.unwrap_or_default(),
        bot_id: event.bot_id,
        subtype: event.subtype,
    })
}

fn frame_action(payload: &str) -> FrameAction {
    match parse_frame(payload) {
        Ok(Frame::Hello) => {
            debug!(event_name = "ingress.slack.hello", "socket mode session established");
            FrameAction::Skip
        }
        Ok(Frame::Disconnect { reason }) => {
            info!(
                event_name = "ingress.slack.disconnect_requested",
                reason = reason.as_deref().unwrap_or("unspecified"),
                "slack asked for a reconnect"
            );
            FrameAction::Reconnect
        }
        Ok(Frame::Envelope(envelope)) => FrameAction::Deliver(envelope),
        Ok(Frame::Unknown { kind }) => {
            debug!(kind = %kind, "ignoring unrecognized socket frame");
            FrameAction::Skip
        }
        Err(error) => {
            warn!(error = %error, "dropping malformed socket frame");
            FrameAction::Skip
        }
    }
}

fn ack_payload(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_socket_url().await?;
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        *self.stream.lock().await = Some(stream);

        info!(
            event_name = "ingress.slack.socket_opened",
            "socket mode websocket established"
        );
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        loop {
            let action = {
                let mut guard = self.stream.lock().await;
                let Some(stream) = guard.as_mut() else {
                    return Err(TransportError::Receive("transport is not connected".to_owned()));
                };

                match stream.next().await {
                    None => FrameAction::Reconnect,
                    Some(Err(error)) => {
                        return Err(TransportError::Receive(error.to_string()));
                    }
                    Some(Ok(Message::Text(payload))) => frame_action(&payload),
                    Some(Ok(Message::Ping(payload))) => {
                        stream.send(Message::Pong(payload)).await.map_err(|err| {
                            TransportError::Receive(format!("pong failed: {err}"))
                        })?;
                        FrameAction::Skip
                    }
                    Some(Ok(Message::Close(_))) => FrameAction::Reconnect,
                    Some(Ok(_)) => FrameAction::Skip,
                }
            };

            match action {
                FrameAction::Skip => {}
                FrameAction::Reconnect => {
                    info!("socket mode connection ended; opening a fresh one");
                    self.connect().await?;
                }
                FrameAction::Deliver(envelope) => return Ok(Some(envelope)),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("transport is not connected".to_owned()));
        };
        stream
            .send(Message::Text(ack_payload(envelope_id)))
            .await
            .map_err(|err| TransportError::Acknowledge(err.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream
                .close(None)
                .await
                .map_err(|err| TransportError::Disconnect(err.to_string()))?;
        }
        Ok(())
    }
}

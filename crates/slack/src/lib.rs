//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for trailhead:
//! - **Socket Mode** (`socket`, `transport`) - WebSocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - Direct-message handling, placeholder + edit-in-place replies
//! - **Web API** (`api`) - `chat.postMessage`, `chat.update`, `conversations.history`
//! - **Block Kit** (`blocks`) - Message builders for the thinking/answer/failure templates
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to `message.im` events
//! 3. Set env vars: `TRAILHEAD_SLACK_APP_TOKEN`, `TRAILHEAD_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Envelopes → EventDispatcher → DmMessageHandler → AnswerService
//!                        ↓
//!                  Block Kit UI ← chat.update
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `WebSocketTransport` - Production transport; survives Slack's rolling refreshes
//! - `EventDispatcher` - Routes envelopes to the registered handlers
//! - `DmMessageHandler` - Placeholder-first reply flow for direct messages
//! - `AnswerService` - Trait the answering pipeline implements

pub mod api;
pub mod blocks;
pub mod events;
pub mod socket;
pub mod transport;

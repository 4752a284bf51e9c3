use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use trailhead_core::{
    format_history, Answer, ConversationTurn, PipelineError, HISTORY_WINDOW,
};

use crate::api::{ChatApi, ChatApiError, NoopChatApi};
use crate::blocks;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: String,
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type == "im"
    }

    /// Covers our own placeholder and answer edits echoing back as message
    /// events, plus joins, edits, and other subtyped noise.
    pub fn is_bot_authored(&self) -> bool {
        self.bot_id.is_some() || self.subtype.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A reply was delivered into the channel.
    Responded,
    /// Recognized and consumed without posting anything.
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Chat(#[from] ChatApiError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl EventHandlerError {
    /// Safe to show in the channel. Never carries upstream detail.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::Chat(_) => {
                "Something went wrong while talking to Slack. Please try again in a moment."
            }
            Self::Pipeline(error) => error.user_notice(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(DmMessageHandler::new(
        Arc::new(NoopChatApi),
        NoopAnswerService,
        HISTORY_WINDOW,
    ));
    dispatcher
}

/// Produces the grounded answer for a direct-message question.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, PipelineError>;
}

/// [`AnswerService`] for wiring that has no pipeline behind it yet.
#[derive(Default)]
pub struct NoopAnswerService;

#[async_trait]
impl AnswerService for NoopAnswerService {
    async fn answer(
        &self,
        _question: &str,
        _history: &[ConversationTurn],
    ) -> Result<Answer, PipelineError> {
        Ok(Answer {
            text: "The answering pipeline is not configured yet.".to_owned(),
            sources: Vec::new(),
        })
    }
}

/// Handles direct-message questions: placeholder first, then the answer (or
/// a failure notice) edited over it.
pub struct DmMessageHandler<S> {
    api: Arc<dyn ChatApi>,
    service: S,
    history_window: usize,
}

impl<S> DmMessageHandler<S>
where
    S: AnswerService,
{
    pub fn new(api: Arc<dyn ChatApi>, service: S, history_window: usize) -> Self {
        Self { api, service, history_window }
    }

    async fn run_pipeline(
        &self,
        event: &MessageEvent,
        user_id: &str,
    ) -> Result<Answer, EventHandlerError> {
        let messages = self
            .api
            .fetch_history(&event.channel_id, &event.ts, self.history_window)
            .await?;
        let history = format_history(&messages, user_id);
        let answer = self.service.answer(&event.text, &history).await?;
        Ok(answer)
    }
}

#[async_trait]
impl<S> EventHandler for DmMessageHandler<S>
where
    S: AnswerService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if !event.is_direct_message() || event.text.is_empty() {
            return Ok(HandlerResult::Ignored);
        }
        if event.is_bot_authored() {
            return Ok(HandlerResult::Processed);
        }
        let Some(user_id) = event.user_id.as_deref() else {
            return Ok(HandlerResult::Processed);
        };

        info!(
            event_name = "interface.dm.received",
            channel_id = %event.channel_id,
            message_ts = %event.ts,
            correlation_id = %ctx.correlation_id,
            "received direct message"
        );

        let placeholder = self
            .api
            .post_message(&event.channel_id, &blocks::thinking_message())
            .await?;

        match self.run_pipeline(event, user_id).await {
            Ok(answer) => {
                self.api
                    .update_message(
                        &placeholder.channel_id,
                        &placeholder.ts,
                        &blocks::answer_message(&answer.text),
                    )
                    .await?;

                info!(
                    event_name = "interface.dm.answered",
                    channel_id = %event.channel_id,
                    message_ts = %event.ts,
                    correlation_id = %ctx.correlation_id,
                    sources = answer.sources.len(),
                    "edited answer into placeholder"
                );
                Ok(HandlerResult::Responded)
            }
            Err(error) => {
                let notice = blocks::failure_message(error.user_notice(), &ctx.correlation_id);
                if let Err(edit_error) = self
                    .api
                    .update_message(&placeholder.channel_id, &placeholder.ts, &notice)
                    .await
                {
                    warn!(
                        event_name = "interface.dm.notice_failed",
                        channel_id = %event.channel_id,
                        correlation_id = %ctx.correlation_id,
                        error = %edit_error,
                        "failed to edit failure notice into placeholder"
                    );
                }
                Err(error)
            }
        }
    }
}

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    // Slack's wire name for plain text objects.
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            fallback_text: fallback_text.into(),
            blocks: Vec::new(),
        }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section {
            block_id: block_id.into(),
            text: builder.build(),
        });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context {
            block_id: block_id.into(),
            elements: builder.build(),
        });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            fallback_text: self.fallback_text,
            blocks: self.blocks,
        }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Interim placeholder posted the moment a question arrives. The notification
/// line says "Thinking..." while the rendered block shows "Processing ...".
pub fn thinking_message() -> MessageTemplate {
    MessageBuilder::new("Thinking...")
        .section("assistant.thinking.v1", |section| {
            section.mrkdwn("Processing ...");
        })
        .build()
}

/// Final answer, edited over the placeholder. The answer text doubles as the
/// notification fallback.
pub fn answer_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section("assistant.answer.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

/// Failure notice, edited over the placeholder so the conversation never
/// ends on a frozen "Thinking...".
pub fn failure_message(notice: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(notice.to_owned())
        .section("assistant.failure.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {notice}"));
        })
        .context("assistant.failure.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::{
        answer_message, failure_message, thinking_message, Block, MessageBuilder, TextObject,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("assistant.summary.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .context("assistant.meta.v1", |context| {
                context.plain("meta");
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                block_id,
                text: TextObject::Mrkdwn { .. }
            } if block_id == "assistant.summary.v1"
        ));
        assert!(matches!(
            &message.blocks[1],
            Block::Context { block_id, elements } if block_id == "assistant.meta.v1" && elements.len() == 1
        ));
    }

    #[test]
    fn thinking_template_pairs_fallback_and_processing_block() {
        let message = thinking_message();
        assert_eq!(message.fallback_text, "Thinking...");
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                text: TextObject::Mrkdwn { text },
                ..
            } if text == "Processing ..."
        ));
    }

    #[test]
    fn answer_template_mirrors_text_into_fallback() {
        let message = answer_message("Checkout is at *11am*.");
        assert_eq!(message.fallback_text, "Checkout is at *11am*.");
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                text: TextObject::Mrkdwn { text },
                ..
            } if text == "Checkout is at *11am*."
        ));
    }

    #[test]
    fn failure_template_contains_correlation_id() {
        let message = failure_message("Please try again in a moment.", "env-123");
        let elements = if let Block::Context { elements, .. } = &message.blocks[1] {
            Some(elements)
        } else {
            None
        };
        assert!(elements.is_some(), "expected context block");
        let elements = elements.expect("context block asserted above");
        assert!(matches!(
            elements.first(),
            Some(TextObject::Plain { text }) if text.contains("env-123")
        ));
    }

    #[test]
    fn text_objects_serialize_with_slack_type_names() {
        assert_eq!(
            serde_json::to_value(TextObject::plain("hi")).unwrap(),
            serde_json::json!({"type": "plain_text", "text": "hi"})
        );
        assert_eq!(
            serde_json::to_value(TextObject::mrkdwn("*hi*")).unwrap(),
            serde_json::json!({"type": "mrkdwn", "text": "*hi*"})
        );
    }
}

//! Short-term conversation history shaping.
//!
//! The chat platform delivers history newest-first; the condensation prompt
//! wants it chronological with each turn rendered as a labeled line. This
//! module does only that mapping: no deduplication, no truncation beyond the
//! window the caller already applied.

/// Who authored a turn in the short-term conversation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "USER MESSAGE",
            Self::Assistant => "SYSTEM RESPONSE",
        }
    }
}

/// One prior message, chronological once formatting has run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }

    /// Labeled-line rendering consumed by the condensation prompt.
    /// The label is glued to the text with a bare colon, no space.
    pub fn render(&self) -> String {
        format!("{}:{}", self.speaker.label(), self.text)
    }
}

/// A raw history message as delivered by the chat platform.
///
/// `sender_id` is absent for bot-authored messages, which is what classifies
/// them as assistant turns below.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    pub sender_id: Option<String>,
    pub text: String,
}

/// Maps platform history (newest first) into chronological turns.
///
/// A message is a user turn iff its sender id equals the asking user's id;
/// every other message (the assistant's own replies included) is an
/// assistant turn. Text is kept verbatim. Output length always equals input
/// length and the order is the exact reverse of the input order.
pub fn format_history(messages: &[HistoryMessage], current_user_id: &str) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = messages
        .iter()
        .map(|message| {
            let speaker = match message.sender_id.as_deref() {
                Some(sender) if sender == current_user_id => Speaker::User,
                _ => Speaker::Assistant,
            };
            ConversationTurn { speaker, text: message.text.clone() }
        })
        .collect();
    turns.reverse();
    turns
}

#[cfg(test)]
mod tests {
    use super::{format_history, ConversationTurn, HistoryMessage, Speaker};

    fn message(sender_id: Option<&str>, text: &str) -> HistoryMessage {
        HistoryMessage { sender_id: sender_id.map(str::to_owned), text: text.to_owned() }
    }

    #[test]
    fn output_length_equals_input_length() {
        let messages = vec![
            message(Some("U1"), "latest"),
            message(None, "middle"),
            message(Some("U1"), "oldest"),
        ];

        assert_eq!(format_history(&messages, "U1").len(), messages.len());
        assert!(format_history(&[], "U1").is_empty());
    }

    #[test]
    fn order_is_exactly_reversed_to_chronological() {
        let messages = vec![
            message(Some("U1"), "third"),
            message(None, "second"),
            message(Some("U1"), "first"),
        ];

        let turns = format_history(&messages, "U1");
        let texts: Vec<&str> = turns.iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn sender_matching_current_user_is_a_user_turn_everything_else_is_not() {
        let messages = vec![
            message(Some("U1"), "mine"),
            message(Some("U2"), "someone else"),
            message(None, "bot reply without a sender id"),
        ];

        let turns = format_history(&messages, "U1");
        assert_eq!(turns[2].speaker, Speaker::User);
        assert_eq!(turns[1].speaker, Speaker::Assistant);
        assert_eq!(turns[0].speaker, Speaker::Assistant);
    }

    #[test]
    fn rendering_glues_label_and_text_with_a_bare_colon() {
        assert_eq!(
            ConversationTurn::user("how much is the June retreat?").render(),
            "USER MESSAGE:how much is the June retreat?"
        );
        assert_eq!(
            ConversationTurn::assistant("It is *€900* per person.").render(),
            "SYSTEM RESPONSE:It is *€900* per person."
        );
    }

    #[test]
    fn text_is_kept_verbatim_untrimmed() {
        let messages = vec![message(Some("U1"), "  padded \n text ")];
        let turns = format_history(&messages, "U1");
        assert_eq!(turns[0].text, "  padded \n text ");
    }
}

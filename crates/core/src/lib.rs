//! Core domain for the trailhead assistant: configuration, the pipeline
//! error taxonomy, conversation-history shaping, and the prompt templates.
//! Nothing in this crate talks to the network; the clients live in
//! `trailhead-rag` and `trailhead-slack`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod history;
pub mod prompts;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, HISTORY_WINDOW,
    RETRIEVAL_TOP_K,
};
pub use domain::{Answer, SourceDocument};
pub use errors::PipelineError;
pub use history::{format_history, ConversationTurn, HistoryMessage, Speaker};
pub use prompts::{
    render_condense_prompt, render_qa_prompt, sanitize_question, CONDENSE_PROMPT, QA_PROMPT,
};

use std::sync::Arc;

use async_trait::async_trait;

use trailhead_core::{Answer, ConversationTurn, PipelineError};
use trailhead_rag::RetrievalChain;
use trailhead_slack::events::AnswerService;

/// [`AnswerService`] backed by the conversational retrieval chain.
///
/// The chain is shared by `Arc` because the socket runner spawns one task
/// per envelope and every task answers through the same clients.
pub struct ChainAnswerService {
    chain: Arc<RetrievalChain>,
}

impl ChainAnswerService {
    pub fn new(chain: Arc<RetrievalChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl AnswerService for ChainAnswerService {
    async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, PipelineError> {
        self.chain.answer(question, history).await
    }
}

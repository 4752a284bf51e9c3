//! Conversational retrieval chain.
//!
//! One call to [`RetrievalChain::answer`] runs the full pipeline: sanitize
//! the question, condense it against chat history when there is any, embed
//! the standalone question, fetch the closest documents, and ask the
//! completion model for a grounded answer. Failures short-circuit, so a
//! dead index never costs a completion call.

use std::sync::Arc;

use tracing::{debug, info};

use trailhead_core::{
    render_condense_prompt, render_qa_prompt, sanitize_question, Answer, ConversationTurn,
    PipelineError,
};

use crate::completion::CompletionClient;
use crate::embedding::Embedder;
use crate::index::VectorIndex;

pub struct RetrievalChain {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completions: Arc<dyn CompletionClient>,
    top_k: usize,
}

impl RetrievalChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completions: Arc<dyn CompletionClient>,
        top_k: usize,
    ) -> Self {
        Self { embedder, index, completions, top_k }
    }

    /// Answers `question` against the indexed documents.
    ///
    /// With an empty `history` the sanitized question goes straight to
    /// retrieval; otherwise a condensation call rewrites it into a
    /// standalone question first, and that rewrite is what gets embedded
    /// and answered.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, PipelineError> {
        let question = sanitize_question(question);

        let standalone = if history.is_empty() {
            question
        } else {
            let prompt = render_condense_prompt(&question, history);
            let condensed = self.completions.complete(&prompt).await?;
            debug!(
                event_name = "rag.chain.condensed",
                turns = history.len(),
                condensed_chars = condensed.len(),
                "rewrote follow-up into a standalone question"
            );
            condensed
        };

        let embedding = self.embedder.embed(&standalone).await?;
        let sources = self.index.query(&embedding, self.top_k).await?;
        let prompt = render_qa_prompt(&standalone, &sources);
        let text = self.completions.complete(&prompt).await?;

        info!(
            event_name = "rag.chain.answered",
            sources = sources.len(),
            answer_chars = text.len(),
            "composed grounded answer"
        );
        Ok(Answer { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use trailhead_core::SourceDocument;

    use super::*;

    struct ScriptedEmbedder {
        inputs: Mutex<Vec<String>>,
        vector: Vec<f32>,
    }

    impl ScriptedEmbedder {
        fn returning(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self { inputs: Mutex::new(Vec::new()), vector })
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            self.inputs.lock().await.push(text.to_owned());
            Ok(self.vector.clone())
        }
    }

    struct ScriptedIndex {
        queries: Mutex<Vec<(Vec<f32>, usize)>>,
        documents: Vec<SourceDocument>,
    }

    impl ScriptedIndex {
        fn returning(documents: Vec<SourceDocument>) -> Arc<Self> {
            Arc::new(Self {
                queries: Mutex::new(Vec::new()),
                documents,
            })
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<SourceDocument>, PipelineError> {
            self.queries.lock().await.push((vector.to_vec(), top_k));
            Ok(self.documents.clone())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<SourceDocument>, PipelineError> {
            Err(PipelineError::Retrieval("connection refused".to_owned()))
        }
    }

    struct ScriptedCompletions {
        prompts: Mutex<Vec<String>>,
        outputs: Mutex<VecDeque<Result<String, PipelineError>>>,
    }

    impl ScriptedCompletions {
        fn with_script(outputs: Vec<Result<String, PipelineError>>) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                outputs: Mutex::new(outputs.into()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletions {
        async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
            self.prompts.lock().await.push(prompt.to_owned());
            self.outputs
                .lock()
                .await
                .pop_front()
                .expect("completion script exhausted")
        }
    }

    fn document(id: &str, text: &str) -> SourceDocument {
        SourceDocument {
            id: id.to_owned(),
            score: 0.9,
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn bare_question_goes_straight_to_retrieval() {
        let embedder = ScriptedEmbedder::returning(vec![0.5, 0.25]);
        let index = ScriptedIndex::returning(vec![document("d1", "Surf camp, $1200")]);
        let completions =
            ScriptedCompletions::with_script(vec![Ok("The surf camp costs *$1200*.".to_owned())]);
        let chain = RetrievalChain::new(embedder.clone(), index.clone(), completions.clone(), 5);

        let answer = chain
            .answer("how much is the surf camp?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, "The surf camp costs *$1200*.");
        let prompts = completions.prompts.lock().await;
        assert_eq!(prompts.len(), 1, "no condensation call for a bare question");
        assert!(prompts[0].contains("=========\nhow much is the surf camp?\n========="));
        assert_eq!(
            embedder.inputs.lock().await.as_slice(),
            ["how much is the surf camp?"]
        );
    }

    #[tokio::test]
    async fn follow_up_is_condensed_before_retrieval() {
        let embedder = ScriptedEmbedder::returning(vec![1.0]);
        let index = ScriptedIndex::returning(vec![document("d1", "January is peak season")]);
        let completions = ScriptedCompletions::with_script(vec![
            Ok("What does the surf camp cost in January?".to_owned()),
            Ok("In January it costs *$1500*.".to_owned()),
        ]);
        let chain = RetrievalChain::new(embedder.clone(), index, completions.clone(), 5);

        let history = vec![
            ConversationTurn::user("how much is the surf camp?"),
            ConversationTurn::assistant("The surf camp costs *$1200*."),
        ];
        let answer = chain.answer("and in January?", &history).await.unwrap();

        assert_eq!(answer.text, "In January it costs *$1500*.");
        let prompts = completions.prompts.lock().await;
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Chat History:"));
        assert!(prompts[0].contains("USER MESSAGE:how much is the surf camp?"));
        assert!(prompts[0].contains("SYSTEM RESPONSE:The surf camp costs *$1200*."));
        assert!(prompts[0].contains("Follow Up Input: and in January?"));
        assert!(prompts[1].contains("What does the surf camp cost in January?"));
        assert_eq!(
            embedder.inputs.lock().await.as_slice(),
            ["What does the surf camp cost in January?"],
            "retrieval embeds the condensed question, not the raw follow-up"
        );
    }

    #[tokio::test]
    async fn question_is_sanitized_before_any_stage_sees_it() {
        let embedder = ScriptedEmbedder::returning(vec![1.0]);
        let index = ScriptedIndex::returning(Vec::new());
        let completions = ScriptedCompletions::with_script(vec![Ok("ok".to_owned())]);
        let chain = RetrievalChain::new(embedder.clone(), index, completions, 5);

        chain.answer("  first\nsecond  ", &[]).await.unwrap();

        assert_eq!(embedder.inputs.lock().await.as_slice(), ["first second"]);
    }

    #[tokio::test]
    async fn retriever_receives_the_query_vector_and_top_k() {
        let embedder = ScriptedEmbedder::returning(vec![0.5, -0.25]);
        let index = ScriptedIndex::returning(Vec::new());
        let completions = ScriptedCompletions::with_script(vec![Ok("ok".to_owned())]);
        let chain = RetrievalChain::new(embedder, index.clone(), completions, 7);

        chain.answer("question", &[]).await.unwrap();

        let queries = index.queries.lock().await;
        assert_eq!(queries.as_slice(), [(vec![0.5, -0.25], 7)]);
    }

    #[tokio::test]
    async fn sources_are_returned_in_retriever_order() {
        let first = document("d1", "closest");
        let second = document("d2", "runner-up");
        let embedder = ScriptedEmbedder::returning(vec![1.0]);
        let index = ScriptedIndex::returning(vec![first.clone(), second.clone()]);
        let completions = ScriptedCompletions::with_script(vec![Ok("ok".to_owned())]);
        let chain = RetrievalChain::new(embedder, index, completions.clone(), 5);

        let answer = chain.answer("question", &[]).await.unwrap();

        assert_eq!(answer.sources, vec![first, second]);
        let prompts = completions.prompts.lock().await;
        assert!(
            prompts[0].contains("closest\n\nrunner-up"),
            "document texts are joined with a blank line in retriever order"
        );
    }

    #[tokio::test]
    async fn index_failure_short_circuits_the_answer_call() {
        let embedder = ScriptedEmbedder::returning(vec![1.0]);
        let completions = ScriptedCompletions::with_script(Vec::new());
        let chain = RetrievalChain::new(embedder, Arc::new(FailingIndex), completions.clone(), 5);

        let error = chain.answer("question", &[]).await.unwrap_err();

        assert_eq!(
            error,
            PipelineError::Retrieval("connection refused".to_owned())
        );
        assert!(
            completions.prompts.lock().await.is_empty(),
            "no completion call after a failed retrieval"
        );
    }

    #[tokio::test]
    async fn completion_failure_is_surfaced_with_its_class() {
        let embedder = ScriptedEmbedder::returning(vec![1.0]);
        let index = ScriptedIndex::returning(Vec::new());
        let completions = ScriptedCompletions::with_script(vec![Err(PipelineError::Completion(
            "quota exhausted".to_owned(),
        ))]);
        let chain = RetrievalChain::new(embedder, index, completions, 5);

        let error = chain.answer("question", &[]).await.unwrap_err();

        assert_eq!(
            error,
            PipelineError::Completion("quota exhausted".to_owned())
        );
    }
}

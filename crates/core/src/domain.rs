//! Request-scoped data produced by the retrieval pipeline. Nothing here is
//! persisted; an `Answer` lives exactly as long as the message it responds to.

/// A retrieved context fragment with its similarity score, in retriever order.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    pub score: f32,
    pub text: String,
}

/// The pipeline's final output for one question.
#[derive(Clone, Debug, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceDocument>,
}

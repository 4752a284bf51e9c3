//! Retrieval-augmented answering pipeline.
//!
//! The pipeline is assembled from three seams ([`Embedder`],
//! [`VectorIndex`], and [`CompletionClient`]), each with a production
//! implementation backed by a REST API. [`RetrievalChain`] wires them
//! together: condense a follow-up question against chat history, embed it,
//! fetch the closest documents, and compose a grounded answer.

pub mod chain;
pub mod completion;
pub mod embedding;
mod http;
pub mod index;

pub use chain::RetrievalChain;
pub use completion::{CompletionClient, OpenAiChat};
pub use embedding::{Embedder, OpenAiEmbedder};
pub use index::{PineconeIndex, VectorIndex};

//! # Embedding Provider
//!
//! Turns text into fixed-length vectors through a managed embedding API.
//!
//! ## Key Components
//!
//! - `EmbeddingProvider`: the provider trait the pipeline is written against
//! - `GeminiEmbedder`: client for the Gemini `batchEmbedContents` endpoint
//! - `MockEmbedder`: deterministic provider that records calls, used in tests
//! - `Embedding`: a shared, immutable vector
//!
//! ## Features
//!
//! - Output order always matches input order
//! - Callers may pass any number of texts; providers split them by their own limit
//! - Client-side rate limiting and single model fallback in the Gemini client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod error;
pub mod gemini;
pub mod mock;

pub use error::EmbeddingError;
pub use gemini::GeminiEmbedder;
pub use mock::MockEmbedder;

/// An embedding vector, shared between every record with the same text
pub type Embedding = Arc<[f32]>;

/// What the embedding will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    RetrievalDocument,
    RetrievalQuery,
    SemanticSimilarity,
    Classification,
    Clustering,
}

/// A service that embeds text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `texts`, returning one vector per text in the same order.
    /// An empty input returns an empty output without calling the service.
    async fn embed(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Maximum number of texts per service call
    fn max_batch_size(&self) -> usize;

    /// Model currently in use
    fn model(&self) -> &str;
}

/// Check that every vector is non-empty and shares one dimensionality
pub(crate) fn check_dimensions(embeddings: &[Embedding]) -> Result<(), EmbeddingError> {
    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    let expected = first.len();
    for (index, embedding) in embeddings.iter().enumerate() {
        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector(index));
        }
        if embedding.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                index,
                expected,
                actual: embedding.len(),
            });
        }
    }
    Ok(())
}

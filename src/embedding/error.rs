//! Error types for the embedding provider

use crate::error::Error as CrateError;
use crate::http::HttpError;
use thiserror::Error;

/// Error type for embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport or API error
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The requested model does not exist for this key
    #[error("Embedding model not found: {model}")]
    ModelNotFound { model: String },

    /// The provider returned a different number of vectors than texts
    #[error("Expected {expected} embeddings but received {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// A vector has a different dimensionality than its siblings
    #[error("Embedding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// The provider returned an empty vector
    #[error("Embedding {0} is empty")]
    EmptyVector(usize),

    /// Other provider errors
    #[error("{0}")]
    Provider(String),
}

impl EmbeddingError {
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, EmbeddingError::ModelNotFound { .. })
    }
}

impl From<EmbeddingError> for CrateError {
    fn from(err: EmbeddingError) -> Self {
        CrateError::Embedding(err.to_string())
    }
}

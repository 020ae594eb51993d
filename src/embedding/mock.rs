//! # Mock Embedding Provider for Testing
//!
//! Provides a `MockEmbedder` that implements the `EmbeddingProvider` trait
//! without network access. Vectors are derived from the text bytes, so equal
//! texts always get equal vectors, and every call is recorded so tests can
//! assert on exactly what was sent.

use crate::embedding::{Embedding, EmbeddingError, EmbeddingProvider, TaskType};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Vec<String>>,
    failure: Option<String>,
    drop_last: bool,
}

/// A deterministic embedding provider
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    max_batch_size: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockEmbedder {
    /// Creates a mock producing 8-dimensional vectors, 100 texts per call
    pub fn new() -> Self {
        Self {
            dimensions: 8,
            max_batch_size: 100,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions.max(1);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Make every following call fail with `message`
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().await.failure = Some(message.into());
    }

    /// Make every following call return one vector too few
    pub async fn drop_last_vector(&self) {
        self.state.lock().await.drop_last = true;
    }

    /// Texts of every call so far, in order
    pub async fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().await.calls.clone()
    }

    /// The vector this mock produces for `text`
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        // FNV-1a seeded per dimension
        (0..self.dimensions)
            .map(|dim| {
                let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ dim as u64;
                for byte in text.bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(0x0100_0000_01b3);
                }
                (hash % 2000) as f32 / 1000.0 - 1.0
            })
            .collect()
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        _task_type: TaskType,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;
        state.calls.push(texts.to_vec());

        if let Some(message) = &state.failure {
            return Err(EmbeddingError::Provider(message.clone()));
        }

        let mut vectors: Vec<Embedding> = texts
            .iter()
            .map(|text| Embedding::from(self.vector_for(text)))
            .collect();
        if state.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }
}

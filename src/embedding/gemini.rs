//! Gemini embedding client
//!
//! Calls `models/{model}:batchEmbedContents` with the API key as a query
//! parameter. The primary model is `gemini-embedding-001`; if the API reports
//! it as not found the client switches to `text-embedding-004` once and keeps
//! using it for the rest of the run.

use crate::embedding::{
    Embedding, EmbeddingError, EmbeddingProvider, TaskType, check_dimensions,
};
use crate::http::{HttpClient, RetryPolicy};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Instrument, debug, debug_span, instrument, warn};

/// Primary embedding model
pub const PRIMARY_MODEL: &str = "gemini-embedding-001";

/// Model used when the primary one is not available
pub const FALLBACK_MODEL: &str = "text-embedding-004";

/// Items accepted per `batchEmbedContents` call
pub const MAX_BATCH_SIZE: usize = 100;

/// Client-side request budget
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

/// Embedding provider backed by the Gemini API
pub struct GeminiEmbedder {
    http: HttpClient,
    base_url: String,
    api_key: String,
    primary_model: String,
    fallback_model: Option<String>,
    using_fallback: AtomicBool,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for GeminiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl GeminiEmbedder {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

impl GeminiEmbedder {
    /// Create a client with the default models and request budget
    pub fn new(api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
        let http = HttpClient::new(RetryPolicy::default())?;
        Ok(Self::with_client(http, api_key, DEFAULT_REQUESTS_PER_MINUTE))
    }

    /// Create a client on an existing transport with a custom request budget
    pub fn with_client(
        http: HttpClient,
        api_key: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            primary_model: PRIMARY_MODEL.to_string(),
            fallback_model: Some(FALLBACK_MODEL.to_string()),
            using_fallback: AtomicBool::new(false),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Replace the primary and fallback models
    pub fn with_models(mut self, primary: impl Into<String>, fallback: Option<String>) -> Self {
        self.primary_model = primary.into();
        self.fallback_model = fallback;
        self.using_fallback = AtomicBool::new(false);
        self
    }

    async fn embed_batch(
        &self,
        model: &str,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;

        let qualified = format!("models/{}", model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: qualified.clone(),
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let url = format!("{}/v1beta/{}:batchEmbedContents", self.base_url, qualified);
        let request = self
            .http
            .inner()
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&body);

        let response: BatchEmbedResponse = self.http.execute_json(request).await.map_err(|e| {
            if e.is_not_found() {
                EmbeddingError::ModelNotFound {
                    model: model.to_string(),
                }
            } else {
                EmbeddingError::Http(e)
            }
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: response.embeddings.len(),
            });
        }

        debug!(model, count = texts.len(), "embedded batch");
        Ok(response
            .embeddings
            .into_iter()
            .map(|e| Embedding::from(e.values))
            .collect())
    }

    /// Embed one batch, switching to the fallback model on the first not-found
    async fn embed_batch_with_fallback(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        let model = self.model().to_string();
        match self.embed_batch(&model, texts, task_type).await {
            Err(e) if e.is_model_not_found() && !self.using_fallback.load(Ordering::SeqCst) => {
                let Some(fallback) = self.fallback_model.as_deref() else {
                    return Err(e);
                };
                warn!(
                    "Embedding model {} not found, falling back to {}",
                    model, fallback
                );
                self.using_fallback.store(true, Ordering::SeqCst);
                self.embed_batch(fallback, texts, task_type).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed(
        &self,
        texts: &[String],
        task_type: TaskType,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            embeddings.extend(self.embed_batch_with_fallback(chunk, task_type).await?);
        }
        check_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    fn model(&self) -> &str {
        match (&self.fallback_model, self.using_fallback.load(Ordering::SeqCst)) {
            (Some(fallback), true) => fallback,
            _ => &self.primary_model,
        }
    }
}

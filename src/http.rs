//! Shared HTTP transport for the warehouse and embedding clients
//!
//! Both REST clients go through [`HttpClient`], which owns the underlying
//! `reqwest` client, classifies error responses and retries transient
//! failures (429 and 5xx gateway errors, timeouts, refused connections) with
//! exponential backoff and jitter.

use rand::{Rng, thread_rng};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Error type for HTTP transport operations
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level error from reqwest
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Response body, verbatim
        message: String,
    },

    /// Authentication or authorization error
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded and retries exhausted
    #[error("Rate limit exceeded. Please retry after {retry_after_secs} seconds")]
    RateLimit {
        /// Seconds to wait before retrying
        retry_after_secs: u64,
    },

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// The request body could not be cloned for a retry
    #[error("Request cannot be retried: {0}")]
    NotRetryable(String),
}

impl HttpError {
    /// Whether the server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::Api { status_code, .. } if *status_code == 404)
    }
}

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff for the given 1-based attempt: `base * 2^(attempt-1)` with ±20% jitter, capped
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = hint.unwrap_or(self.base_delay);
        let exp_factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = base.saturating_mul(exp_factor);

        if delay > Duration::from_millis(1) {
            let jitter_factor = thread_rng().gen_range(0.8..1.2);
            delay = delay.mul_f64(jitter_factor);
        }

        std::cmp::min(delay, self.max_delay)
    }
}

/// HTTP client with error classification and retries
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Retry policy for transient failures
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a new HTTP client with the default timeout and the given retry policy
    pub fn new(retry: RetryPolicy) -> Result<Self, HttpError> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(format!("gigpulse/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, retry })
    }

    /// Access the underlying reqwest client to build requests
    pub fn inner(&self) -> &ReqwestClient {
        &self.client
    }

    /// The configured retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request and deserialize a successful JSON response
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, HttpError> {
        let response_text = self.execute_text(request).await?;
        serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse response: {}", e);
            HttpError::UnexpectedResponse(format!("Failed to parse response: {}", e))
        })
    }

    /// Send a request and return the body of a successful response
    pub async fn execute_text(&self, request: RequestBuilder) -> Result<String, HttpError> {
        let response = self.send_with_retry(request).await?;
        let status = response.status();
        let response_text = response.text().await?;

        if status.is_success() {
            Ok(response_text)
        } else {
            error!("API error: {} - {}", status, response_text);
            Err(classify_status(status, response_text))
        }
    }

    /// Send a request, retrying transient failures. Non-transient error
    /// responses are returned as-is for the caller to classify.
    async fn send_with_retry(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let mut attempts = 0;

        loop {
            let request_clone = request.try_clone().ok_or_else(|| {
                HttpError::NotRetryable("streaming request bodies cannot be cloned".to_string())
            })?;

            match request_clone.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_transient(status) {
                        return Ok(response);
                    }

                    attempts += 1;
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    let body = response.text().await.unwrap_or_default();
                    error!("API error: {} - {}", status, body);

                    if attempts > self.retry.max_retries {
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            HttpError::RateLimit {
                                retry_after_secs: retry_after
                                    .unwrap_or(self.retry.base_delay.as_secs()),
                            }
                        } else {
                            HttpError::Api {
                                status_code: status.as_u16(),
                                message: body,
                            }
                        });
                    }

                    let delay = self
                        .retry
                        .delay_for(attempts, retry_after.map(Duration::from_secs));
                    debug!(
                        "Transient status {}. Retrying after {} ms (attempt {}/{})",
                        status,
                        delay.as_millis(),
                        attempts,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempts < self.retry.max_retries => {
                    attempts += 1;
                    let delay = self.retry.delay_for(attempts, None);
                    warn!(
                        "Request failed ({}). Retrying after {} ms (attempt {}/{})",
                        e,
                        delay.as_millis(),
                        attempts,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(HttpError::Transport(e)),
            }
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn classify_status(status: StatusCode, body: String) -> HttpError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        HttpError::Auth(format!("{} - {}", status, body))
    } else {
        HttpError::Api {
            status_code: status.as_u16(),
            message: body,
        }
    }
}

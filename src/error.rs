//! Error types for the gigpulse crate

use thiserror::Error;

/// Result type for gigpulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gigpulse operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error, raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Warehouse query, load or table error
    #[error("Warehouse error: {0}")]
    Warehouse(String),

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// News ingestion error
    #[error("News error: {0}")]
    News(String),

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// A pipeline invariant did not hold. Always an implementation defect.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

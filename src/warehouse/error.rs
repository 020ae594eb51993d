//! Error types for the warehouse module

use crate::error::Error as CrateError;
use crate::http::HttpError;
use thiserror::Error;

/// Error type for warehouse operations
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Transport or API error
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The table or view does not exist
    #[error("Table not found: {0}")]
    NotFound(String),

    /// The query was rejected or failed
    #[error("Query failed: {0}")]
    Query(String),

    /// A load or query job finished with an error
    #[error("Job {job_id} failed: {message}")]
    Job {
        /// Warehouse job id
        job_id: String,
        /// Error result reported by the job
        message: String,
    },

    /// A returned row did not match its schema
    #[error("Row decoding error: {0}")]
    Decode(String),

    /// A table identifier could not be parsed
    #[error("Invalid table id: {0}")]
    InvalidTableId(String),

    /// File system error while reading a load source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation not supported by this warehouse implementation
    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl From<WarehouseError> for CrateError {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::Io(e) => CrateError::Io(e),
            _ => CrateError::Warehouse(err.to_string()),
        }
    }
}

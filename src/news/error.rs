//! Error types for news ingestion

use crate::error::Error as CrateError;
use crate::http::HttpError;
use thiserror::Error;

/// Error type for news ingestion
#[derive(Debug, Error)]
pub enum NewsError {
    /// Feed or page download failed
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The feed is not valid RSS
    #[error("Feed parse error: {0}")]
    Feed(#[from] quick_xml::errors::serialize::DeError),

    /// A page could not be turned into article text
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Invalid URL
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<NewsError> for CrateError {
    fn from(err: NewsError) -> Self {
        match err {
            NewsError::Io(e) => CrateError::Io(e),
            NewsError::Json(e) => CrateError::Json(e),
            other => CrateError::News(other.to_string()),
        }
    }
}

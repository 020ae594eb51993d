//! # gigpulse - Warehouse Jobs for the Rideshare Driver Stress Study
//!
//! This crate contains the batch jobs behind a study of rideshare driver
//! stress: loading raw data into a cloud data warehouse, collecting news
//! coverage, creating generative AI views over the data, embedding the
//! free-text stress reasons and exploring the resulting embedding space.
//!
//! ## Features
//!
//! - Typed warehouse gateway with a REST implementation and an in-memory fake
//! - Rate-limited embedding provider with batch chunking and model fallback
//! - Embedding materialization with deduplication and idempotent replace
//! - News ingestion:
//!   - RSS feeds streamed into a staging table
//!   - Article scraping with polite random delays
//!   - Curated article files
//! - CSV loaders and AI SQL views
//! - Embedding space analysis: similarity histogram, t-SNE and similarity graph
//! - Async API with Tokio, bounded retries with jittered backoff
//!
//! ## Example
//!
//! ```rust,no_run
//! use gigpulse::catalog::Tables;
//! use gigpulse::config::Config;
//! use gigpulse::embedding::GeminiEmbedder;
//! use gigpulse::pipeline::{MaterializationJob, materialize};
//! use gigpulse::warehouse::BigQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let warehouse = BigQuery::from_config(&config)?;
//!     let embedder = GeminiEmbedder::new(config.genai_api_key()?.to_string())?;
//!
//!     let job = MaterializationJob::driver_reasons(&Tables::new(&config));
//!     let report = materialize(&warehouse, &embedder, &job).await?;
//!
//!     println!("wrote {} rows", report.written_rows);
//!     Ok(())
//! }
//! ```

mod error;

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod http;
pub mod loader;
pub mod news;
pub mod pipeline;
pub mod queries;
pub mod views;
pub mod warehouse;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}

//! # News Ingestion
//!
//! Brings news about rideshare and delivery work into the warehouse.
//!
//! ## Key Components
//!
//! - `rss`: fetches an RSS 2.0 feed and normalizes its entries
//! - `article`: downloads the pages a feed links to and extracts their text
//! - `curated`: reads a hand-curated JSON file of articles
//! - `stream_rows`: appends rows one at a time, reporting rejected rows
//!
//! ## Features
//!
//! - Publication dates normalized to RFC 3339
//! - Polite scraping with a random 1-2 second pause between pages
//! - Per-row error reporting that never aborts the run

use crate::error::Result;
use crate::warehouse::{Row, TableId, Warehouse};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub mod article;
pub mod curated;
pub mod error;
pub mod rss;

pub use article::{ScrapedArticle, ScraperOptions};
pub use curated::CuratedArticle;
pub use error::NewsError;
pub use rss::FeedEntry;

/// Outcome of a streaming ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    /// Label and reasons of every rejected row
    pub failed: Vec<(String, Vec<String>)>,
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .map(|style| style.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Append `rows` to `table` one row per request. `labels[i]` names row `i`
/// in progress and failure messages.
pub async fn stream_rows(
    warehouse: &dyn Warehouse,
    table: &TableId,
    rows: &[Row],
    labels: &[String],
) -> Result<IngestReport> {
    let bar = progress_bar(rows.len() as u64);
    let mut report = IngestReport::default();

    for (i, row) in rows.iter().enumerate() {
        let label = labels.get(i).cloned().unwrap_or_else(|| format!("row {}", i));
        let errors = warehouse
            .insert_rows_streaming(table, std::slice::from_ref(row))
            .await?;

        if errors.is_empty() {
            report.added += 1;
            bar.println(format!("Added row {}: {}", report.added, label));
        } else {
            let reasons: Vec<String> = errors.into_iter().flat_map(|e| e.messages).collect();
            warn!(row = %label, "row rejected: {}", reasons.join("; "));
            bar.println(format!("Failed to add row for '{}': {:?}", label, reasons));
            report.failed.push((label, reasons));
        }
        bar.inc(1);
    }

    bar.finish_and_clear();
    info!(table = %table, added = report.added, failed = report.failed.len(), "streaming ingestion done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{FieldSchema, FieldType, MemoryWarehouse, TableSchema};
    use serde_json::json;

    #[tokio::test]
    async fn test_rejected_rows_do_not_stop_ingestion() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "STAGING_DATA", "news");
        warehouse
            .insert_table(
                table.clone(),
                TableSchema::new(vec![FieldSchema::required("title", FieldType::String)]),
                Vec::new(),
            )
            .await;

        let rows: Vec<Row> = vec![
            json!({"title": "first"}),
            json!({"headline": "wrong column"}),
            json!({"title": "third"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        let labels = vec!["first".to_string(), "second".to_string(), "third".to_string()];

        let report = stream_rows(&warehouse, &table, &rows, &labels).await.unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "second");
        assert_eq!(warehouse.rows(&table).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "STAGING_DATA", "absent");
        let rows = vec![json!({"title": "x"}).as_object().cloned().unwrap()];

        let result = stream_rows(&warehouse, &table, &rows, &[]).await;
        assert!(result.is_err());
    }
}

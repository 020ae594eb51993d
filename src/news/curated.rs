//! Hand-curated news articles loaded from a JSON file

use crate::catalog::news_content_schema;
use crate::error::Result;
use crate::news::{IngestReport, NewsError, stream_rows};
use crate::warehouse::{Row, TableId, Warehouse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One curated article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedArticle {
    pub article_name: String,
    pub city: Option<String>,
    /// `YYYY-MM-DD`
    pub published: Option<NaiveDate>,
    pub content: String,
}

impl CuratedArticle {
    pub fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(row)) => row,
            _ => Row::new(),
        }
    }
}

/// Read a JSON array of articles
pub async fn read_articles(path: &Path) -> std::result::Result<Vec<CuratedArticle>, NewsError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Stream the articles of `path` into `table`, creating it if needed
pub async fn ingest_articles(
    warehouse: &dyn Warehouse,
    path: &Path,
    table: &TableId,
) -> Result<IngestReport> {
    let articles = read_articles(path).await?;
    warehouse.ensure_table(table, &news_content_schema()).await?;

    let rows: Vec<Row> = articles.iter().map(CuratedArticle::to_row).collect();
    let labels: Vec<String> = articles.iter().map(|a| a.article_name.clone()).collect();
    stream_rows(warehouse, table, &rows, &labels).await
}

//! RSS 2.0 feed download and normalization

use crate::catalog::rss_news_schema;
use crate::error::Result;
use crate::http::HttpClient;
use crate::news::article::collapse_whitespace;
use crate::news::{IngestReport, NewsError, stream_rows};
use crate::warehouse::{Row, TableId, Warehouse};
use chrono::DateTime;
use quick_xml::de::from_str;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename = "rss")]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// A normalized feed entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    /// Description as published, possibly HTML
    pub description: String,
    pub link: String,
    /// RFC 3339 timestamp, when the feed date could be parsed
    pub published: Option<String>,
    /// Plain text of the description
    pub summary: String,
}

impl FeedEntry {
    pub fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(row)) => row,
            _ => Row::new(),
        }
    }
}

/// Normalize an RSS date (RFC 2822, or already RFC 3339) to RFC 3339
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.to_rfc3339())
}

fn html_to_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_whitespace(&parsed.root_element().text().collect::<String>())
}

/// Parse an RSS 2.0 document into entries, in feed order
pub fn parse_feed(xml: &str) -> std::result::Result<Vec<FeedEntry>, NewsError> {
    let rss: Rss = from_str(xml)?;

    Ok(rss
        .channel
        .items
        .into_iter()
        .map(|item| {
            let published = item.pub_date.as_deref().and_then(|raw| {
                let normalized = normalize_date(raw);
                if normalized.is_none() {
                    warn!("Unparseable publication date: {}", raw);
                }
                normalized
            });
            let description = item.description.unwrap_or_default();
            FeedEntry {
                title: item.title.map(|t| t.trim().to_string()).unwrap_or_default(),
                summary: html_to_text(&description),
                description,
                link: item.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                published,
            }
        })
        .collect())
}

/// Download and parse a feed
#[instrument(skip(http))]
pub async fn fetch_feed(
    http: &HttpClient,
    feed_url: &str,
) -> std::result::Result<Vec<FeedEntry>, NewsError> {
    let url = Url::parse(feed_url)?;
    let body = http.execute_text(http.inner().get(url)).await?;
    let entries = parse_feed(&body)?;
    info!(entries = entries.len(), "feed parsed");
    Ok(entries)
}

/// Stream every entry of a feed into `table`, creating it if needed
pub async fn ingest_feed(
    warehouse: &dyn Warehouse,
    http: &HttpClient,
    feed_url: &str,
    table: &TableId,
) -> Result<IngestReport> {
    let entries = fetch_feed(http, feed_url).await?;
    warehouse.ensure_table(table, &rss_news_schema()).await?;

    let rows: Vec<Row> = entries.iter().map(FeedEntry::to_row).collect();
    let labels: Vec<String> = entries.iter().map(|e| e.title.clone()).collect();
    stream_rows(warehouse, table, &rows, &labels).await
}

//! Article page download and text extraction

use crate::http::HttpClient;
use crate::news::{FeedEntry, NewsError};
use rand::{Rng, thread_rng};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Selectors tried in order; the first one that yields text wins
const PARAGRAPH_SELECTORS: &[&str] = &["article p", "main p", "p"];

/// Options for scraping the pages of a feed
#[derive(Debug, Clone)]
pub struct ScraperOptions {
    /// Number of feed entries to visit
    pub max_articles: usize,

    /// Shortest pause between page requests
    pub min_delay: Duration,

    /// Longest pause between page requests
    pub max_delay: Duration,

    /// Paragraphs matching any of these patterns are dropped
    pub skip_patterns: Vec<String>,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            max_articles: 5,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
            skip_patterns: vec![
                r"(?i)^advertisement$".to_string(),
                r"(?i)^(sign up|subscribe)\b".to_string(),
                r"(?i)^(read more|related):".to_string(),
            ],
        }
    }
}

/// A downloaded article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    pub published: Option<String>,
    pub url: String,
    pub text: String,
}

/// Collapse every run of whitespace to a single space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, NewsError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| NewsError::Extraction(format!("Invalid skip pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Extract the readable paragraphs of a page, separated by blank lines
pub fn extract_article_text(html: &str, skip: &[Regex]) -> Result<String, NewsError> {
    let document = Html::parse_document(html);

    for selector_str in PARAGRAPH_SELECTORS {
        let selector = Selector::parse(selector_str).map_err(|e| {
            NewsError::Extraction(format!("Failed to parse selector '{}': {}", selector_str, e))
        })?;

        let paragraphs: Vec<String> = document
            .select(&selector)
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .filter(|p| !skip.iter().any(|re| re.is_match(p)))
            .collect();

        if !paragraphs.is_empty() {
            return Ok(paragraphs.join("\n\n"));
        }
    }

    Err(NewsError::Extraction("no paragraph text found".to_string()))
}

fn pause(options: &ScraperOptions) -> Duration {
    if options.max_delay <= options.min_delay {
        return options.min_delay;
    }
    let millis = thread_rng()
        .gen_range(options.min_delay.as_millis() as u64..=options.max_delay.as_millis() as u64);
    Duration::from_millis(millis)
}

async fn fetch_article(
    http: &HttpClient,
    entry: &FeedEntry,
    skip: &[Regex],
) -> Result<ScrapedArticle, NewsError> {
    let html = http.execute_text(http.inner().get(&entry.link)).await?;
    let text = extract_article_text(&html, skip)?;
    Ok(ScrapedArticle {
        title: entry.title.clone(),
        published: entry.published.clone(),
        url: entry.link.clone(),
        text,
    })
}

/// Download the first `max_articles` entries. Pages that fail are logged
/// and skipped.
#[instrument(skip_all, fields(entries = entries.len(), max = options.max_articles))]
pub async fn scrape_articles(
    http: &HttpClient,
    entries: &[FeedEntry],
    options: &ScraperOptions,
) -> Result<Vec<ScrapedArticle>, NewsError> {
    let skip = compile_patterns(&options.skip_patterns)?;
    let mut articles = Vec::new();

    for entry in entries.iter().take(options.max_articles) {
        info!("Fetching {}", entry.link);
        match fetch_article(http, entry, &skip).await {
            Ok(article) => articles.push(article),
            Err(e) => error!("Failed to fetch {}: {}", entry.link, e),
        }
        tokio::time::sleep(pause(options)).await;
    }

    Ok(articles)
}

/// Write articles as newline-delimited JSON
pub async fn write_ndjson(path: &Path, articles: &[ScrapedArticle]) -> Result<(), NewsError> {
    let mut out = Vec::new();
    for article in articles {
        serde_json::to_writer(&mut out, article)?;
        out.push(b'\n');
    }
    tokio::fs::write(path, out).await?;
    info!("Saved {} articles to {}", articles.len(), path.display());
    Ok(())
}

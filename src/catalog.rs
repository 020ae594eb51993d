//! Table names and schemas of the driver study datasets

use crate::config::Config;
use crate::warehouse::{FieldSchema, FieldType, TableId, TableSchema};

/// Curated news articles (staging)
pub const NEWS_CONTENT: &str = "news_content_usa";
/// Driver roster loaded from CSV (staging)
pub const DRIVERS_DATA: &str = "drivers_data";
/// Ride history loaded from CSV (staging)
pub const RIDES_DATA: &str = "rides_data";
/// RSS feed entries (staging)
pub const RSS_NEWS: &str = "gig_workers_news";

/// Per-article pressure flags (marts view)
pub const ARTICLES_METRICS: &str = "articles_metrics";
/// Per-driver metrics with stress score and reason (marts view)
pub const DRIVERS_METRICS: &str = "drivers_metrics";
/// Materialized copy of `drivers_metrics` (marts table)
pub const DRIVERS_METRICS_TABLE: &str = "tbl_drivers_metrics";
/// Per-driver stress keywords (marts view)
pub const DRIVERS_REASON_TAGS: &str = "drivers_reason_tags";
/// Stress reason embeddings (marts table)
pub const DRIVER_REASON_EMBEDDINGS: &str = "driver_reason_embeddings";

/// Column holding the vector in embedding tables
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Fully qualified ids of every table the jobs touch
#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    pub news_content: TableId,
    pub drivers_data: TableId,
    pub rides_data: TableId,
    pub rss_news: TableId,
    pub articles_metrics: TableId,
    pub drivers_metrics: TableId,
    pub drivers_metrics_table: TableId,
    pub drivers_reason_tags: TableId,
    pub driver_reason_embeddings: TableId,
}

impl Tables {
    pub fn new(config: &Config) -> Self {
        Self {
            news_content: config.staging_table(NEWS_CONTENT),
            drivers_data: config.staging_table(DRIVERS_DATA),
            rides_data: config.staging_table(RIDES_DATA),
            rss_news: config.staging_table(RSS_NEWS),
            articles_metrics: config.marts_table(ARTICLES_METRICS),
            drivers_metrics: config.marts_table(DRIVERS_METRICS),
            drivers_metrics_table: config.marts_table(DRIVERS_METRICS_TABLE),
            drivers_reason_tags: config.marts_table(DRIVERS_REASON_TAGS),
            driver_reason_embeddings: config.marts_table(DRIVER_REASON_EMBEDDINGS),
        }
    }
}

pub fn news_content_schema() -> TableSchema {
    TableSchema::new(vec![
        FieldSchema::required("article_name", FieldType::String),
        FieldSchema::nullable("city", FieldType::String),
        FieldSchema::nullable("published", FieldType::Date),
        FieldSchema::required("content", FieldType::String),
    ])
}

pub fn drivers_data_schema() -> TableSchema {
    TableSchema::new(vec![
        FieldSchema::required("Driver_ID", FieldType::Integer),
        FieldSchema::nullable("Name", FieldType::String),
        FieldSchema::nullable("Age", FieldType::Integer),
        FieldSchema::nullable("City", FieldType::String),
        FieldSchema::nullable("Experience_Years", FieldType::Integer),
        FieldSchema::nullable("Average_Rating", FieldType::Float),
        FieldSchema::nullable("Active_Status", FieldType::String),
    ])
}

pub fn rides_data_schema() -> TableSchema {
    TableSchema::new(vec![
        FieldSchema::required("Ride_ID", FieldType::Integer),
        FieldSchema::nullable("Driver_ID", FieldType::Integer),
        FieldSchema::nullable("City", FieldType::String),
        FieldSchema::nullable("Date", FieldType::Date),
        FieldSchema::nullable("Distance_km", FieldType::Float),
        FieldSchema::nullable("Duration_min", FieldType::Integer),
        FieldSchema::nullable("Fare", FieldType::Float),
        FieldSchema::nullable("Rating", FieldType::Float),
        FieldSchema::nullable("Promo_Code", FieldType::String),
    ])
}

/// RSS entries; `published` is an RFC 3339 timestamp
pub fn rss_news_schema() -> TableSchema {
    TableSchema::new(vec![
        FieldSchema::nullable("title", FieldType::String),
        FieldSchema::nullable("description", FieldType::String),
        FieldSchema::nullable("link", FieldType::String),
        FieldSchema::nullable("published", FieldType::Timestamp),
        FieldSchema::nullable("summary", FieldType::String),
    ])
}

/// Schema of an embedding table: the key, the embedded text and its vector
pub fn embedding_schema(id: FieldSchema, text_column: &str) -> TableSchema {
    TableSchema::new(vec![
        FieldSchema::nullable(id.name, id.field_type),
        FieldSchema::nullable(text_column, FieldType::String),
        FieldSchema::repeated(EMBEDDING_COLUMN, FieldType::Float),
    ])
}

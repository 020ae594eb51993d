//! # Embedding Materialization Pipeline
//!
//! Reads `(id, text)` records from a warehouse table, embeds every distinct
//! text exactly once and replaces a destination table with one row per
//! record carrying its vector.
//!
//! ## Key Components
//!
//! - `MaterializationJob`: source, columns and destination of one run
//! - `materialize`: runs the job end to end
//! - `MaterializeReport`: what the run read, embedded and wrote
//!
//! ## Features
//!
//! - Deduplication: records sharing a text share one vector (the same `Arc`)
//! - Null and empty texts are skipped; whitespace is a text like any other
//! - An empty source ends the run before any provider call or write
//! - The destination is replaced by a single load job, so reruns are idempotent
//!
//! Steps run strictly in sequence: read, embed, write. Nothing is written
//! unless reading and embedding both succeed.

use crate::catalog::{EMBEDDING_COLUMN, Tables, embedding_schema};
use crate::embedding::{
    Embedding, EmbeddingError, EmbeddingProvider, TaskType, check_dimensions,
};
use crate::error::{Error, Result};
use crate::queries::embedding_source_sql;
use crate::warehouse::{
    FieldSchema, FieldType, QueryResult, Row, TableId, TableSchema, Warehouse, WriteMode,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// One materialization run
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationJob {
    pub source_table: TableId,
    pub id_column: String,
    pub text_column: String,
    pub destination_table: TableId,
    pub task_type: TaskType,
}

impl MaterializationJob {
    /// Embed the stress reason of every driver
    pub fn driver_reasons(tables: &Tables) -> Self {
        Self {
            source_table: tables.drivers_metrics_table.clone(),
            id_column: "driver_ID".to_string(),
            text_column: "stress_reason".to_string(),
            destination_table: tables.driver_reason_embeddings.clone(),
            task_type: TaskType::RetrievalDocument,
        }
    }
}

/// A record read from the source table
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Opaque key, kept as the warehouse returned it
    pub entity_id: Value,
    pub text: Option<String>,
}

/// A record with its resolved vector
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub entity_id: Value,
    pub text: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The source had no text to embed; nothing was called or written
    SkippedEmpty,
    /// The destination was replaced
    Written,
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeReport {
    pub outcome: MaterializeOutcome,
    /// Rows returned by the source query
    pub source_rows: usize,
    /// Distinct non-empty texts among them
    pub distinct_texts: usize,
    pub provider_calls: usize,
    pub written_rows: u64,
    /// Model that produced the vectors, if any were produced
    pub model: Option<String>,
}

/// Unique texts in first-seen order; records without text are skipped
pub fn distinct_texts(records: &[SourceRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| r.text.as_deref())
        .filter(|text| seen.insert(*text))
        .map(str::to_string)
        .collect()
}

/// Embed `texts` in provider-sized batches, returning the vectors in input
/// order and the number of provider calls made. Every vector of the run must
/// share one dimensionality.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    task_type: TaskType,
) -> std::result::Result<(Vec<Embedding>, usize), EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    let mut calls = 0;

    for batch in texts.chunks(provider.max_batch_size().max(1)) {
        let embedded = provider.embed(batch, task_type).await?;
        calls += 1;
        if embedded.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: embedded.len(),
            });
        }
        debug!(batch = calls, size = batch.len(), "embedded batch");
        vectors.extend(embedded);
    }

    // Batches may come from different models after a fallback
    check_dimensions(&vectors)?;
    Ok((vectors, calls))
}

/// Pair each text with its vector by position
fn text_map(
    texts: Vec<String>,
    vectors: Vec<Embedding>,
) -> std::result::Result<HashMap<String, Embedding>, EmbeddingError> {
    if texts.len() != vectors.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(texts.into_iter().zip(vectors).collect())
}

/// Attach the vector of each record's text. Every text must be in the map.
pub fn rehydrate(
    records: Vec<SourceRecord>,
    map: &HashMap<String, Embedding>,
) -> Result<Vec<EnrichedRecord>> {
    records
        .into_iter()
        .filter_map(|r| r.text.map(|text| (r.entity_id, text)))
        .map(|(entity_id, text)| {
            let embedding = map.get(&text).cloned().ok_or_else(|| {
                Error::Invariant(format!("no embedding for text of record {}", entity_id))
            })?;
            Ok(EnrichedRecord {
                entity_id,
                text,
                embedding,
            })
        })
        .collect()
}

fn source_records(result: &QueryResult, job: &MaterializationJob) -> Vec<SourceRecord> {
    result
        .rows
        .iter()
        .map(|row| SourceRecord {
            entity_id: row.get(&job.id_column).cloned().unwrap_or(Value::Null),
            text: row
                .get(&job.text_column)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        })
        .collect()
}

fn destination_schema(result: &QueryResult, job: &MaterializationJob) -> TableSchema {
    let id = result
        .schema
        .field(&job.id_column)
        .map(|f| FieldSchema::nullable(job.id_column.clone(), f.field_type))
        .unwrap_or_else(|| FieldSchema::nullable(job.id_column.clone(), FieldType::String));
    embedding_schema(id, &job.text_column)
}

fn to_row(record: &EnrichedRecord, job: &MaterializationJob) -> Row {
    let mut row = Row::new();
    row.insert(job.id_column.clone(), record.entity_id.clone());
    row.insert(job.text_column.clone(), Value::String(record.text.clone()));
    row.insert(
        EMBEDDING_COLUMN.to_string(),
        Value::Array(
            record
                .embedding
                .iter()
                .map(|x| Value::from(f64::from(*x)))
                .collect(),
        ),
    );
    row
}

/// Run a materialization job end to end
#[instrument(skip(warehouse, provider, job), fields(source = %job.source_table, destination = %job.destination_table))]
pub async fn materialize(
    warehouse: &dyn Warehouse,
    provider: &dyn EmbeddingProvider,
    job: &MaterializationJob,
) -> Result<MaterializeReport> {
    let sql = embedding_source_sql(&job.source_table, &job.id_column, &job.text_column);
    let result = warehouse.run_query(&sql).await?;
    let records = source_records(&result, job);
    let texts = distinct_texts(&records);
    info!(
        rows = result.len(),
        distinct = texts.len(),
        "read source records"
    );

    if texts.is_empty() {
        info!("no text to embed, skipping");
        return Ok(MaterializeReport {
            outcome: MaterializeOutcome::SkippedEmpty,
            source_rows: result.len(),
            distinct_texts: 0,
            provider_calls: 0,
            written_rows: 0,
            model: None,
        });
    }

    let distinct = texts.len();
    let (vectors, provider_calls) = embed_in_batches(provider, &texts, job.task_type).await?;
    let map = text_map(texts, vectors)?;
    let enriched = rehydrate(records, &map)?;

    let schema = destination_schema(&result, job);
    let rows: Vec<Row> = enriched.iter().map(|r| to_row(r, job)).collect();

    warehouse.ensure_table(&job.destination_table, &schema).await?;
    let summary = warehouse
        .load_rows(&job.destination_table, &rows, &schema, WriteMode::Replace)
        .await?;
    info!(job_id = %summary.job_id, rows = rows.len(), "destination replaced");

    Ok(MaterializeReport {
        outcome: MaterializeOutcome::Written,
        source_rows: result.len(),
        distinct_texts: distinct,
        provider_calls,
        written_rows: rows.len() as u64,
        model: Some(provider.model().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::warehouse::memory::WarehouseCall;
    use crate::warehouse::MemoryWarehouse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job() -> MaterializationJob {
        MaterializationJob {
            source_table: TableId::new("p", "MARTS_DATA", "tbl_drivers_metrics"),
            id_column: "driver_ID".to_string(),
            text_column: "stress_reason".to_string(),
            destination_table: TableId::new("p", "MARTS_DATA", "driver_reason_embeddings"),
            task_type: TaskType::RetrievalDocument,
        }
    }

    fn source_schema() -> TableSchema {
        TableSchema::new(vec![
            FieldSchema::nullable("driver_ID", FieldType::Integer),
            FieldSchema::nullable("stress_reason", FieldType::String),
        ])
    }

    fn source(rows: Vec<Value>) -> QueryResult {
        QueryResult::new(
            source_schema(),
            rows.into_iter()
                .map(|v| v.as_object().cloned().unwrap())
                .collect(),
        )
    }

    async fn warehouse_with(rows: Vec<Value>) -> MemoryWarehouse {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .respond_to("FROM `p.MARTS_DATA.tbl_drivers_metrics`", source(rows))
            .await;
        warehouse
    }

    fn scenario() -> Vec<Value> {
        vec![
            json!({"driver_ID": 1, "stress_reason": "tired"}),
            json!({"driver_ID": 2, "stress_reason": "tired"}),
            json!({"driver_ID": 3, "stress_reason": "overworked"}),
            json!({"driver_ID": 4, "stress_reason": null}),
        ]
    }

    #[tokio::test]
    async fn test_duplicate_texts_are_embedded_once_and_share_a_vector() {
        let warehouse = warehouse_with(scenario()).await;
        let provider = MockEmbedder::new();

        let report = materialize(&warehouse, &provider, &job()).await.unwrap();

        assert_eq!(
            provider.calls().await,
            vec![vec!["tired".to_string(), "overworked".to_string()]]
        );
        assert_eq!(report.outcome, MaterializeOutcome::Written);
        assert_eq!(report.source_rows, 4);
        assert_eq!(report.distinct_texts, 2);
        assert_eq!(report.provider_calls, 1);
        assert_eq!(report.written_rows, 3);
        assert_eq!(report.model.as_deref(), Some("mock-embedding"));

        let rows = warehouse.rows(&job().destination_table).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r["driver_ID"].clone()).collect::<Vec<_>>(),
            vec![json!(1), json!(2), json!(3)]
        );
        assert_eq!(rows[0]["embedding"], rows[1]["embedding"]);
        assert_ne!(rows[0]["embedding"], rows[2]["embedding"]);
        assert_eq!(rows[2]["stress_reason"], json!("overworked"));
    }

    #[tokio::test]
    async fn test_destination_schema_follows_source_id_type() {
        let warehouse = warehouse_with(scenario()).await;
        materialize(&warehouse, &MockEmbedder::new(), &job())
            .await
            .unwrap();

        let schema = warehouse
            .table_schema(&job().destination_table)
            .await
            .unwrap();
        assert_eq!(schema.column_names(), vec!["driver_ID", "stress_reason", "embedding"]);
        assert_eq!(schema.fields[0].field_type, FieldType::Integer);
    }

    #[tokio::test]
    async fn test_empty_source_makes_no_calls_and_no_writes() {
        let warehouse = warehouse_with(vec![
            json!({"driver_ID": 4, "stress_reason": null}),
            json!({"driver_ID": 5, "stress_reason": ""}),
        ])
        .await;
        let provider = MockEmbedder::new();

        let report = materialize(&warehouse, &provider, &job()).await.unwrap();

        assert_eq!(report.outcome, MaterializeOutcome::SkippedEmpty);
        assert_eq!(report.provider_calls, 0);
        assert!(provider.calls().await.is_empty());
        assert_eq!(
            warehouse.calls().await.len(),
            1,
            "only the source query should have run"
        );
        assert!(warehouse.rows(&job().destination_table).await.is_none());
    }

    #[tokio::test]
    async fn test_rerun_replaces_destination() {
        let warehouse = warehouse_with(scenario()).await;
        let provider = MockEmbedder::new();

        materialize(&warehouse, &provider, &job()).await.unwrap();
        let first = warehouse.rows(&job().destination_table).await.unwrap();
        materialize(&warehouse, &provider, &job()).await.unwrap();
        let second = warehouse.rows(&job().destination_table).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(warehouse.load_count().await, 2);
        let creates = warehouse
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, WarehouseCall::Create(_)))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_large_sources_are_embedded_in_order_across_batches() {
        let rows: Vec<Value> = (0..250)
            .map(|i| json!({"driver_ID": i, "stress_reason": format!("reason {}", i)}))
            .collect();
        let warehouse = warehouse_with(rows).await;
        let provider = MockEmbedder::new().with_max_batch_size(100);

        let report = materialize(&warehouse, &provider, &job()).await.unwrap();

        let calls = provider.calls().await;
        assert_eq!(report.provider_calls, 3);
        assert_eq!(
            calls.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(calls[1][0], "reason 100");

        let written = warehouse.rows(&job().destination_table).await.unwrap();
        assert_eq!(written.len(), 250);
        let expected: Vec<Value> = provider
            .vector_for("reason 137")
            .into_iter()
            .map(|x| Value::from(f64::from(x)))
            .collect();
        assert_eq!(written[137]["embedding"], Value::Array(expected));
    }

    #[tokio::test]
    async fn test_provider_failure_writes_nothing() {
        let warehouse = warehouse_with(scenario()).await;
        let provider = MockEmbedder::new();
        provider.fail_with("quota exceeded").await;

        let result = materialize(&warehouse, &provider, &job()).await;

        assert!(matches!(result, Err(Error::Embedding(_))));
        let calls = warehouse.calls().await;
        assert!(
            calls
                .iter()
                .all(|c| matches!(c, WarehouseCall::Query(_))),
            "unexpected warehouse calls: {:?}",
            calls
        );
    }

    #[tokio::test]
    async fn test_short_provider_response_is_an_error() {
        let warehouse = warehouse_with(scenario()).await;
        let provider = MockEmbedder::new();
        provider.drop_last_vector().await;

        let result = materialize(&warehouse, &provider, &job()).await;

        assert!(matches!(result, Err(Error::Embedding(_))));
        assert_eq!(warehouse.load_count().await, 0);
    }

    #[tokio::test]
    async fn test_load_failure_aborts_the_run() {
        let warehouse = warehouse_with(scenario()).await;
        warehouse.fail_loads("quota exceeded for load jobs").await;

        let result = materialize(&warehouse, &MockEmbedder::new(), &job()).await;

        assert!(matches!(result, Err(Error::Warehouse(_))));
        assert_eq!(
            warehouse.rows(&job().destination_table).await,
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_whitespace_reason_is_kept() {
        let warehouse = warehouse_with(vec![
            json!({"driver_ID": 1, "stress_reason": " "}),
            json!({"driver_ID": 2, "stress_reason": ""}),
            json!({"driver_ID": 3, "stress_reason": "tired"}),
        ])
        .await;
        let provider = MockEmbedder::new();

        let report = materialize(&warehouse, &provider, &job()).await.unwrap();

        assert_eq!(
            provider.calls().await,
            vec![vec![" ".to_string(), "tired".to_string()]]
        );
        assert_eq!(report.written_rows, 2);
        let rows = warehouse.rows(&job().destination_table).await.unwrap();
        assert_eq!(rows[0]["driver_ID"], json!(1));
        assert_eq!(rows[0]["stress_reason"], json!(" "));
    }

    /// Returns shorter vectors on every call after the first, like a model
    /// fallback in the middle of a run
    struct ShrinkingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for ShrinkingEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _task_type: TaskType,
        ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
            let dims = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 { 3 } else { 2 };
            Ok(texts.iter().map(|_| Embedding::from(vec![0.5; dims])).collect())
        }

        fn max_batch_size(&self) -> usize {
            1
        }

        fn model(&self) -> &str {
            "shrinking"
        }
    }

    #[tokio::test]
    async fn test_dimension_change_between_batches_writes_nothing() {
        let warehouse = warehouse_with(vec![
            json!({"driver_ID": 1, "stress_reason": "a"}),
            json!({"driver_ID": 2, "stress_reason": "b"}),
        ])
        .await;
        let provider = ShrinkingEmbedder {
            calls: AtomicUsize::new(0),
        };

        let result = materialize(&warehouse, &provider, &job()).await;

        assert!(matches!(result, Err(Error::Embedding(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(warehouse.load_count().await, 0);
        assert!(warehouse.rows(&job().destination_table).await.is_none());
    }

    #[test]
    fn test_distinct_texts_keep_first_seen_order() {
        let records: Vec<SourceRecord> = ["b", "a", "b", "c", "a"]
            .iter()
            .enumerate()
            .map(|(i, t)| SourceRecord {
                entity_id: json!(i),
                text: Some(t.to_string()),
            })
            .collect();
        assert_eq!(distinct_texts(&records), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rehydrate_miss_is_an_invariant_violation() {
        let records = vec![SourceRecord {
            entity_id: json!(9),
            text: Some("unseen".to_string()),
        }];
        let result = rehydrate(records, &HashMap::new());
        assert!(matches!(result, Err(Error::Invariant(_))));
    }
}

//! # Warehouse Gateway
//!
//! A thin gateway over the cloud warehouse: table lookup and creation,
//! synchronous queries, load jobs and streaming inserts.
//!
//! ## Key Components
//!
//! - `Warehouse`: the gateway trait every job is written against
//! - `BigQuery`: REST implementation talking to the `bigquery/v2` API
//! - `MemoryWarehouse`: in-process implementation that records calls, used in tests
//! - `TableLookup`: typed answer to "does this table exist"
//!
//! Load jobs are atomic on the warehouse side: a `Replace` load discards the old
//! rows and writes the new ones as a single job, so readers never observe a mix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub mod bigquery;
pub mod error;
pub mod memory;
pub mod rows;
pub mod schema;
pub mod table;

pub use bigquery::BigQuery;
pub use error::WarehouseError;
pub use memory::MemoryWarehouse;
pub use rows::Row;
pub use schema::{FieldMode, FieldSchema, FieldType, TableSchema};
pub use table::TableId;

/// Metadata returned for an existing table
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub id: TableId,
    pub schema: Option<TableSchema>,
    pub num_rows: Option<u64>,
    /// `TABLE`, `VIEW`, ...
    pub kind: Option<String>,
}

/// Result of looking a table up
#[derive(Debug, Clone, PartialEq)]
pub enum TableLookup {
    Found(TableInfo),
    NotFound,
}

/// What `ensure_table` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyExists,
    Created,
}

/// Write disposition of a load job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Discard existing rows and write the new ones in one job
    #[serde(rename = "WRITE_TRUNCATE")]
    Replace,
    /// Keep existing rows
    #[serde(rename = "WRITE_APPEND")]
    Append,
}

/// Format of a file handed to a load job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "NEWLINE_DELIMITED_JSON")]
    NewlineDelimitedJson,
}

/// Configuration of a file-based load job
#[derive(Debug, Clone, PartialEq)]
pub struct LoadJobConfig {
    pub source_format: SourceFormat,
    pub write_mode: WriteMode,
    pub schema: Option<TableSchema>,
    /// Number of header rows to skip (CSV only)
    pub skip_leading_rows: u32,
    pub autodetect: bool,
}

impl LoadJobConfig {
    /// CSV with one header row, replacing the table contents
    pub fn csv_replace(schema: TableSchema) -> Self {
        Self {
            source_format: SourceFormat::Csv,
            write_mode: WriteMode::Replace,
            schema: Some(schema),
            skip_leading_rows: 1,
            autodetect: true,
        }
    }

    /// Newline-delimited JSON rows with an explicit schema
    pub fn json_rows(schema: TableSchema, write_mode: WriteMode) -> Self {
        Self {
            source_format: SourceFormat::NewlineDelimitedJson,
            write_mode,
            schema: Some(schema),
            skip_leading_rows: 0,
            autodetect: false,
        }
    }
}

/// Summary of a completed load job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub job_id: String,
    pub output_rows: u64,
}

/// A row rejected by a streaming insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowInsertError {
    /// Position of the row in the submitted batch
    pub index: usize,
    pub messages: Vec<String>,
}

/// Tabular query result with column names preserved
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(schema: TableSchema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Gateway to the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Look a table up. Only a genuine absence yields `NotFound`; any other
    /// failure is returned as an error.
    async fn lookup_table(&self, table: &TableId) -> Result<TableLookup, WarehouseError>;

    /// Create a table with the given schema
    async fn create_table(
        &self,
        table: &TableId,
        schema: &TableSchema,
    ) -> Result<(), WarehouseError>;

    /// Run a query to completion and return every result row
    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError>;

    /// Write rows with a single load job and wait for it to finish
    async fn load_rows(
        &self,
        table: &TableId,
        rows: &[Row],
        schema: &TableSchema,
        mode: WriteMode,
    ) -> Result<LoadSummary, WarehouseError>;

    /// Load a local file with a single load job and wait for it to finish
    async fn load_file(
        &self,
        table: &TableId,
        path: &Path,
        config: &LoadJobConfig,
    ) -> Result<LoadSummary, WarehouseError>;

    /// Append rows through the streaming API. Rejected rows are reported,
    /// not raised.
    async fn insert_rows_streaming(
        &self,
        table: &TableId,
        rows: &[Row],
    ) -> Result<Vec<RowInsertError>, WarehouseError>;

    /// Create the view, or replace its definition if it exists
    async fn create_or_replace_view(&self, view: &TableId, sql: &str) -> Result<(), WarehouseError> {
        let ddl = format!("CREATE OR REPLACE VIEW {} AS\n{}", view.quoted(), sql);
        self.run_query(&ddl).await?;
        Ok(())
    }

    /// Create the table unless it already exists
    async fn ensure_table(
        &self,
        table: &TableId,
        schema: &TableSchema,
    ) -> Result<EnsureOutcome, WarehouseError> {
        match self.lookup_table(table).await? {
            TableLookup::Found(_) => {
                println!("Table already exists: {}", table);
                Ok(EnsureOutcome::AlreadyExists)
            }
            TableLookup::NotFound => {
                println!("Table not found. Creating table: {}", table);
                self.create_table(table, schema).await?;
                info!(table = %table, "table created");
                println!("Table created: {}", table);
                Ok(EnsureOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(vec![FieldSchema::required("id", FieldType::String)])
    }

    #[tokio::test]
    async fn test_ensure_table_creates_missing_table_once() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "d", "t");

        let first = warehouse.ensure_table(&table, &schema()).await.unwrap();
        let second = warehouse.ensure_table(&table, &schema()).await.unwrap();

        assert_eq!(first, EnsureOutcome::Created);
        assert_eq!(second, EnsureOutcome::AlreadyExists);
        assert_eq!(warehouse.table_schema(&table).await, Some(schema()));
    }

    #[tokio::test]
    async fn test_ensure_table_propagates_lookup_failures() {
        let warehouse = MemoryWarehouse::new();
        warehouse.fail_lookups("permission denied").await;
        let table = TableId::new("p", "d", "t");

        let result = warehouse.ensure_table(&table, &schema()).await;

        assert!(matches!(
            result,
            Err(WarehouseError::Http(crate::http::HttpError::Auth(_)))
        ));
        assert_eq!(warehouse.table_schema(&table).await, None);
    }

    #[test]
    fn test_write_mode_wire_names() {
        assert_eq!(
            serde_json::to_value(WriteMode::Replace).unwrap(),
            serde_json::json!("WRITE_TRUNCATE")
        );
        assert_eq!(
            serde_json::to_value(SourceFormat::NewlineDelimitedJson).unwrap(),
            serde_json::json!("NEWLINE_DELIMITED_JSON")
        );
    }
}

//! # In-Memory Warehouse for Testing
//!
//! Provides a `MemoryWarehouse` that implements the `Warehouse` trait without
//! any network access. Tables live in memory, queries are answered from canned
//! results registered up front, and every call is recorded so tests can assert
//! on what a job did (or did not) write.

use crate::http::HttpError;
use crate::warehouse::{
    FieldMode, LoadJobConfig, LoadSummary, QueryResult, Row, RowInsertError,
    SourceFormat, TableId, TableInfo, TableLookup, TableSchema, Warehouse, WarehouseError,
    WriteMode,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A call made against the memory warehouse
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseCall {
    Lookup(TableId),
    Create(TableId),
    Query(String),
    Load {
        table: TableId,
        rows: usize,
        mode: WriteMode,
    },
    StreamingInsert {
        table: TableId,
        rows: usize,
    },
    View(TableId),
}

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<TableId, MemoryTable>,
    views: HashMap<TableId, String>,
    responses: Vec<(String, QueryResult)>,
    calls: Vec<WarehouseCall>,
    lookup_failure: Option<String>,
    load_failure: Option<String>,
}

/// An in-process warehouse
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<State>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with a schema and rows
    pub async fn insert_table(&self, table: TableId, schema: TableSchema, rows: Vec<Row>) {
        let mut state = self.state.lock().await;
        state.tables.insert(table, MemoryTable { schema, rows });
    }

    /// Answer every query containing `fragment` with `result`. The first
    /// registered match wins; unmatched queries return an empty result.
    pub async fn respond_to(&self, fragment: impl Into<String>, result: QueryResult) {
        let mut state = self.state.lock().await;
        state.responses.push((fragment.into(), result));
    }

    /// Make every table lookup fail with an authorization error
    pub async fn fail_lookups(&self, message: impl Into<String>) {
        self.state.lock().await.lookup_failure = Some(message.into());
    }

    /// Make every load job fail
    pub async fn fail_loads(&self, message: impl Into<String>) {
        self.state.lock().await.load_failure = Some(message.into());
    }

    /// Rows currently held by a table
    pub async fn rows(&self, table: &TableId) -> Option<Vec<Row>> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.rows.clone())
    }

    pub async fn table_schema(&self, table: &TableId) -> Option<TableSchema> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.schema.clone())
    }

    pub async fn view_sql(&self, view: &TableId) -> Option<String> {
        self.state.lock().await.views.get(view).cloned()
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<WarehouseCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of load jobs run so far
    pub async fn load_count(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, WarehouseCall::Load { .. }))
            .count()
    }
}

fn check_row(schema: &TableSchema, row: &Row) -> Vec<String> {
    let mut problems = Vec::new();
    for field in &schema.fields {
        let value = row.get(&field.name).unwrap_or(&Value::Null);
        match field.mode {
            FieldMode::Required if value.is_null() => {
                problems.push(format!("Missing required field: {}", field.name));
            }
            FieldMode::Repeated if !(value.is_array() || value.is_null()) => {
                problems.push(format!("Field {} is not an array", field.name));
            }
            _ => {}
        }
    }
    for key in row.keys() {
        if schema.field(key).is_none() {
            problems.push(format!("no such field: {}", key));
        }
    }
    problems
}

fn write_rows(
    state: &mut State,
    table: &TableId,
    rows: Vec<Row>,
    schema: &TableSchema,
    mode: WriteMode,
) -> Result<LoadSummary, WarehouseError> {
    let job_id = format!("memory_job_{}", state.calls.len());

    if let Some(message) = &state.load_failure {
        return Err(WarehouseError::Job {
            job_id,
            message: message.clone(),
        });
    }

    // A load job is all-or-nothing: validate before touching the table.
    if let Some((index, problems)) = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (i, check_row(schema, row)))
        .find(|(_, problems)| !problems.is_empty())
    {
        return Err(WarehouseError::Job {
            job_id,
            message: format!("row {}: {}", index, problems.join("; ")),
        });
    }

    let output_rows = rows.len() as u64;
    let entry = state
        .tables
        .entry(table.clone())
        .or_insert_with(|| MemoryTable {
            schema: schema.clone(),
            rows: Vec::new(),
        });
    match mode {
        WriteMode::Replace => {
            entry.schema = schema.clone();
            entry.rows = rows;
        }
        WriteMode::Append => entry.rows.extend(rows),
    }

    Ok(LoadSummary {
        job_id,
        output_rows,
    })
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn lookup_table(&self, table: &TableId) -> Result<TableLookup, WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::Lookup(table.clone()));

        if let Some(message) = &state.lookup_failure {
            return Err(WarehouseError::Http(HttpError::Auth(message.clone())));
        }

        if let Some(t) = state.tables.get(table) {
            return Ok(TableLookup::Found(TableInfo {
                id: table.clone(),
                schema: Some(t.schema.clone()),
                num_rows: Some(t.rows.len() as u64),
                kind: Some("TABLE".to_string()),
            }));
        }
        if state.views.contains_key(table) {
            return Ok(TableLookup::Found(TableInfo {
                id: table.clone(),
                schema: None,
                num_rows: None,
                kind: Some("VIEW".to_string()),
            }));
        }
        Ok(TableLookup::NotFound)
    }

    async fn create_table(
        &self,
        table: &TableId,
        schema: &TableSchema,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::Create(table.clone()));

        if state.tables.contains_key(table) {
            return Err(WarehouseError::Query(format!("Already Exists: Table {}", table)));
        }
        state.tables.insert(
            table.clone(),
            MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::Query(sql.to_string()));

        Ok(state
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }

    async fn load_rows(
        &self,
        table: &TableId,
        rows: &[Row],
        schema: &TableSchema,
        mode: WriteMode,
    ) -> Result<LoadSummary, WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::Load {
            table: table.clone(),
            rows: rows.len(),
            mode,
        });
        write_rows(&mut state, table, rows.to_vec(), schema, mode)
    }

    async fn load_file(
        &self,
        table: &TableId,
        path: &Path,
        config: &LoadJobConfig,
    ) -> Result<LoadSummary, WarehouseError> {
        if config.source_format != SourceFormat::NewlineDelimitedJson {
            return Err(WarehouseError::Unsupported(
                "the memory warehouse only loads newline-delimited JSON".to_string(),
            ));
        }
        let schema = config.schema.clone().ok_or_else(|| {
            WarehouseError::Unsupported("the memory warehouse cannot autodetect schemas".to_string())
        })?;

        let content = tokio::fs::read_to_string(path).await?;
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<Row>)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::Load {
            table: table.clone(),
            rows: rows.len(),
            mode: config.write_mode,
        });
        write_rows(&mut state, table, rows, &schema, config.write_mode)
    }

    async fn insert_rows_streaming(
        &self,
        table: &TableId,
        rows: &[Row],
    ) -> Result<Vec<RowInsertError>, WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::StreamingInsert {
            table: table.clone(),
            rows: rows.len(),
        });

        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))?;

        let mut errors = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let problems = check_row(&target.schema, row);
            if problems.is_empty() {
                target.rows.push(row.clone());
            } else {
                errors.push(RowInsertError {
                    index,
                    messages: problems,
                });
            }
        }
        Ok(errors)
    }

    async fn create_or_replace_view(&self, view: &TableId, sql: &str) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().await;
        state.calls.push(WarehouseCall::View(view.clone()));
        state.views.insert(view.clone(), sql.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{FieldSchema, FieldType};
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            FieldSchema::required("article_name", FieldType::String),
            FieldSchema::nullable("city", FieldType::String),
        ])
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_replace_discards_previous_rows() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "d", "t");

        warehouse
            .load_rows(&table, &[row(json!({"article_name": "a"}))], &schema(), WriteMode::Append)
            .await
            .unwrap();
        warehouse
            .load_rows(&table, &[row(json!({"article_name": "b"}))], &schema(), WriteMode::Replace)
            .await
            .unwrap();

        let rows = warehouse.rows(&table).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["article_name"], json!("b"));
    }

    #[tokio::test]
    async fn test_invalid_load_leaves_table_untouched() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "d", "t");
        warehouse
            .insert_table(table.clone(), schema(), vec![row(json!({"article_name": "kept"}))])
            .await;

        let result = warehouse
            .load_rows(
                &table,
                &[row(json!({"article_name": "x"})), row(json!({"city": "Miami"}))],
                &schema(),
                WriteMode::Replace,
            )
            .await;

        assert!(matches!(result, Err(WarehouseError::Job { .. })));
        let rows = warehouse.rows(&table).await.unwrap();
        assert_eq!(rows, vec![row(json!({"article_name": "kept"}))]);
    }

    #[tokio::test]
    async fn test_streaming_insert_reports_rejected_rows() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "d", "t");
        warehouse.insert_table(table.clone(), schema(), Vec::new()).await;

        let errors = warehouse
            .insert_rows_streaming(
                &table,
                &[
                    row(json!({"article_name": "ok"})),
                    row(json!({"city": "Chicago"})),
                    row(json!({"article_name": "also ok", "city": "Miami"})),
                ],
            )
            .await
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 1);
        assert_eq!(warehouse.rows(&table).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_queries_answer_from_registered_results() {
        let warehouse = MemoryWarehouse::new();
        let result = QueryResult::new(schema(), vec![row(json!({"article_name": "a", "city": null}))]);
        warehouse.respond_to("FROM `p.d.t`", result.clone()).await;

        assert_eq!(warehouse.run_query("SELECT * FROM `p.d.t`").await.unwrap(), result);
        assert!(warehouse.run_query("SELECT 1").await.unwrap().is_empty());
    }
}

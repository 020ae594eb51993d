//! BigQuery implementation of the warehouse gateway
//!
//! Talks to the `bigquery/v2` REST API with a bearer token. Queries go through
//! `jobs.query` and are followed with `getQueryResults` until the job is
//! complete and every page has been read. Loads are multipart uploads that
//! create a load job, which is then polled until it reaches `DONE`.

use crate::config::Config;
use crate::http::{HttpClient, HttpError, RetryPolicy};
use crate::warehouse::rows::decode_row;
use crate::warehouse::{
    LoadJobConfig, LoadSummary, QueryResult, Row, RowInsertError, SourceFormat, TableId,
    TableInfo, TableLookup, TableSchema, Warehouse, WarehouseError, WriteMode,
};
use async_trait::async_trait;
use rand::{Rng, thread_rng};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Server-side wait per `jobs.query` / `getQueryResults` call
const QUERY_TIMEOUT_MS: u64 = 10_000;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

impl From<&TableId> for TableReference {
    fn from(id: &TableId) -> Self {
        Self {
            project_id: id.project.clone(),
            dataset_id: id.dataset.clone(),
            table_id: id.table.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    schema: Option<TableSchema>,
    num_rows: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTableRequest<'a> {
    table_reference: TableReference,
    schema: &'a TableSchema,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    location: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<Value>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsertRequest<'a> {
    configuration: JobConfiguration<'a>,
    job_reference: NewJobReference<'a>,
}

/// Client-assigned job id, so a retried insert is recognized as the same job
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewJobReference<'a> {
    job_id: &'a str,
    location: &'a str,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    destination_table: TableReference,
    source_format: SourceFormat,
    write_disposition: WriteMode,
    create_disposition: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a TableSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_leading_rows: Option<u32>,
    autodetect: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    skip_invalid_rows: bool,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    json: &'a Row,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

/// BigQuery REST client
#[derive(Debug, Clone)]
pub struct BigQuery {
    http: HttpClient,
    base_url: String,
    project_id: String,
    location: String,
    access_token: String,
    poll_interval: Duration,
}

#[cfg(test)]
impl BigQuery {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

impl BigQuery {
    /// Create a client billing jobs to `project_id` in `location`
    pub fn new(
        http: HttpClient,
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.into(),
            location: location.into(),
            access_token: access_token.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create a client from the validated configuration
    pub fn from_config(config: &Config) -> Result<Self, WarehouseError> {
        let http = HttpClient::new(RetryPolicy::default())?;
        Ok(Self::new(
            http,
            config.project_id.clone(),
            config.bigquery_location.clone(),
            config.warehouse_access_token.clone(),
        ))
    }

    /// Change how often running jobs are polled
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/bigquery/v2/{}", self.base_url, path)
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.base_url, self.project_id
        )
    }

    fn table_path(table: &TableId) -> String {
        format!(
            "projects/{}/datasets/{}/tables/{}",
            table.project, table.dataset, table.table
        )
    }

    /// Fetch one page of a query job's results, waiting server-side for completion
    async fn query_results_page(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, WarehouseError> {
        let url = self.api_url(&format!("projects/{}/queries/{}", self.project_id, job.job_id));
        let location = job.location.as_deref().unwrap_or(&self.location);
        let timeout = QUERY_TIMEOUT_MS.to_string();

        let mut params: Vec<(&str, &str)> = vec![("location", location), ("timeoutMs", &timeout)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let request = self
            .http
            .inner()
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&params);
        self.http.execute_json(request).await.map_err(query_error)
    }

    /// Poll a job until it reaches `DONE`; a job error becomes `WarehouseError::Job`
    async fn wait_for_job(&self, job: &JobReference) -> Result<Job, WarehouseError> {
        let url = self.api_url(&format!("projects/{}/jobs/{}", self.project_id, job.job_id));
        let location = job.location.as_deref().unwrap_or(&self.location);

        loop {
            let request = self
                .http
                .inner()
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("location", location)]);
            let current: Job = self.http.execute_json(request).await?;

            if current.status.state == "DONE" {
                if let Some(error_result) = &current.status.error_result {
                    let mut messages = vec![error_result.describe()];
                    messages.extend(current.status.errors.iter().map(ErrorProto::describe));
                    messages.dedup();
                    return Err(WarehouseError::Job {
                        job_id: current.job_reference.job_id.clone(),
                        message: messages.join("; "),
                    });
                }
                return Ok(current);
            }

            debug!(job_id = %job.job_id, state = %current.status.state, "waiting for job");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Upload `data` as a load job and wait for it
    async fn run_load_job(
        &self,
        table: &TableId,
        data: Vec<u8>,
        config: &LoadJobConfig,
    ) -> Result<LoadSummary, WarehouseError> {
        let job_id = format!("gigpulse_load_{:016x}", thread_rng().r#gen::<u64>());
        let metadata = JobInsertRequest {
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    destination_table: table.into(),
                    source_format: config.source_format,
                    write_disposition: config.write_mode,
                    create_disposition: "CREATE_IF_NEEDED",
                    schema: config.schema.as_ref(),
                    skip_leading_rows: (config.source_format == SourceFormat::Csv)
                        .then_some(config.skip_leading_rows),
                    autodetect: config.autodetect,
                },
            },
            job_reference: NewJobReference {
                job_id: &job_id,
                location: &self.location,
            },
        };
        let metadata = serde_json::to_string(&metadata)?;

        let boundary = format!("gigpulse_{:016x}", thread_rng().r#gen::<u64>());
        let body = multipart_related(&boundary, &metadata, &data);

        let request = self
            .http
            .inner()
            .post(self.upload_url())
            .bearer_auth(&self.access_token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);
        let reference = match self.http.execute_json::<Job>(request).await {
            Ok(job) => job.job_reference,
            // A retried insert whose first attempt was accepted
            Err(HttpError::Api {
                status_code: 409, ..
            }) => {
                debug!(job_id = %job_id, "load job already exists");
                JobReference {
                    job_id,
                    location: Some(self.location.clone()),
                }
            }
            Err(e) => return Err(e.into()),
        };
        debug!(job_id = %reference.job_id, "load job submitted");

        let done = self.wait_for_job(&reference).await?;
        let output_rows = done
            .statistics
            .and_then(|s| s.load)
            .and_then(|l| l.output_rows)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        Ok(LoadSummary {
            job_id: done.job_reference.job_id,
            output_rows,
        })
    }
}

/// Query failures (HTTP 400) carry the warehouse's message verbatim
fn query_error(err: HttpError) -> WarehouseError {
    match err {
        HttpError::Api {
            status_code: 400,
            message,
        } => WarehouseError::Query(message),
        other => WarehouseError::Http(other),
    }
}

fn multipart_related(boundary: &str, metadata: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn to_ndjson(rows: &[Row]) -> Result<Vec<u8>, WarehouseError> {
    let mut data = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut data, row)?;
        data.push(b'\n');
    }
    Ok(data)
}

#[async_trait]
impl Warehouse for BigQuery {
    #[instrument(skip(self), fields(table = %table))]
    async fn lookup_table(&self, table: &TableId) -> Result<TableLookup, WarehouseError> {
        let request = self
            .http
            .inner()
            .get(self.api_url(&Self::table_path(table)))
            .bearer_auth(&self.access_token);

        match self.http.execute_json::<TableResource>(request).await {
            Ok(resource) => Ok(TableLookup::Found(TableInfo {
                id: table.clone(),
                schema: resource.schema,
                num_rows: resource.num_rows.and_then(|n| n.parse().ok()),
                kind: resource.kind,
            })),
            Err(e) if e.is_not_found() => Ok(TableLookup::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, schema), fields(table = %table))]
    async fn create_table(
        &self,
        table: &TableId,
        schema: &TableSchema,
    ) -> Result<(), WarehouseError> {
        let url = self.api_url(&format!(
            "projects/{}/datasets/{}/tables",
            table.project, table.dataset
        ));
        let body = CreateTableRequest {
            table_reference: table.into(),
            schema,
        };
        let request = self
            .http
            .inner()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body);
        let _: Value = self.http.execute_json(request).await?;
        Ok(())
    }

    #[instrument(skip(self, sql))]
    async fn run_query(&self, sql: &str) -> Result<QueryResult, WarehouseError> {
        debug!("Running query: {}", sql);
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            location: &self.location,
            timeout_ms: QUERY_TIMEOUT_MS,
        };
        let request = self
            .http
            .inner()
            .post(self.api_url(&format!("projects/{}/queries", self.project_id)))
            .bearer_auth(&self.access_token)
            .json(&body);
        let mut response: QueryResponse =
            self.http.execute_json(request).await.map_err(query_error)?;

        while !response.job_complete {
            let job = response.job_reference.clone().ok_or_else(|| {
                WarehouseError::Query("incomplete query response without a job reference".into())
            })?;
            debug!(job_id = %job.job_id, "query still running");
            response = self.query_results_page(&job, None).await?;
        }

        let schema = response.schema.take().unwrap_or_default();
        let mut rows = response
            .rows
            .iter()
            .map(|raw| decode_row(&schema, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut page_token = response.page_token.take();
        while let Some(token) = page_token {
            let job = response.job_reference.clone().ok_or_else(|| {
                WarehouseError::Query("paged query response without a job reference".into())
            })?;
            let page = self.query_results_page(&job, Some(&token)).await?;
            for raw in &page.rows {
                rows.push(decode_row(&schema, raw)?);
            }
            page_token = page.page_token;
        }

        info!(rows = rows.len(), "query complete");
        Ok(QueryResult::new(schema, rows))
    }

    #[instrument(skip(self, rows, schema), fields(table = %table, rows = rows.len()))]
    async fn load_rows(
        &self,
        table: &TableId,
        rows: &[Row],
        schema: &TableSchema,
        mode: WriteMode,
    ) -> Result<LoadSummary, WarehouseError> {
        let data = to_ndjson(rows)?;
        let config = LoadJobConfig::json_rows(schema.clone(), mode);
        self.run_load_job(table, data, &config).await
    }

    #[instrument(skip(self, config), fields(table = %table))]
    async fn load_file(
        &self,
        table: &TableId,
        path: &Path,
        config: &LoadJobConfig,
    ) -> Result<LoadSummary, WarehouseError> {
        let data = tokio::fs::read(path).await?;
        self.run_load_job(table, data, config).await
    }

    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    async fn insert_rows_streaming(
        &self,
        table: &TableId,
        rows: &[Row],
    ) -> Result<Vec<RowInsertError>, WarehouseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let body = InsertAllRequest {
            skip_invalid_rows: true,
            rows: rows.iter().map(|json| InsertRow { json }).collect(),
        };
        let request = self
            .http
            .inner()
            .post(self.api_url(&format!("{}/insertAll", Self::table_path(table))))
            .bearer_auth(&self.access_token)
            .json(&body);

        let response: InsertAllResponse = match self.http.execute_json(request).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Err(WarehouseError::NotFound(table.to_string())),
            Err(e) => return Err(e.into()),
        };

        Ok(response
            .insert_errors
            .into_iter()
            .map(|e| RowInsertError {
                index: e.index,
                messages: e.errors.iter().map(ErrorProto::describe).collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{FieldSchema, FieldType};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &mockito::Server) -> BigQuery {
        let http = HttpClient::new(RetryPolicy::none()).unwrap();
        let mut bq = BigQuery::new(http, "proj", "US", "token")
            .with_poll_interval(Duration::from_millis(1));
        bq.set_base_url(server.url());
        bq
    }

    fn table() -> TableId {
        TableId::new("proj", "MARTS_DATA", "driver_reason_embeddings")
    }

    #[tokio::test]
    async fn test_lookup_table_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/bigquery/v2/projects/proj/datasets/MARTS_DATA/tables/driver_reason_embeddings")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{
                "type": "TABLE",
                "numRows": "12",
                "schema": {"fields": [{"name": "driver_ID", "type": "INTEGER", "mode": "NULLABLE"}]}
            }"#)
            .create_async()
            .await;

        let lookup = client(&server).lookup_table(&table()).await.unwrap();
        match lookup {
            TableLookup::Found(info) => {
                assert_eq!(info.num_rows, Some(12));
                assert_eq!(info.kind.as_deref(), Some("TABLE"));
            }
            TableLookup::NotFound => panic!("expected table to be found"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_lookup_table_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/bigquery/v2/projects/proj/datasets/MARTS_DATA/tables/driver_reason_embeddings")
            .with_status(404)
            .with_body(r#"{"error": {"code": 404, "message": "Not found: Table proj:MARTS_DATA.driver_reason_embeddings"}}"#)
            .create_async()
            .await;

        let lookup = client(&server).lookup_table(&table()).await.unwrap();
        assert_eq!(lookup, TableLookup::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_table_permission_denied_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/bigquery/v2/projects/proj/datasets/MARTS_DATA/tables/driver_reason_embeddings")
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "Access Denied"}}"#)
            .create_async()
            .await;

        let result = client(&server).lookup_table(&table()).await;
        assert!(matches!(result, Err(WarehouseError::Http(HttpError::Auth(_)))));
    }

    #[tokio::test]
    async fn test_run_query_follows_incomplete_job_and_pages() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/bigquery/v2/projects/proj/queries")
            .match_body(Matcher::PartialJson(json!({"useLegacySql": false})))
            .with_status(200)
            .with_body(r#"{"jobReference": {"projectId": "proj", "jobId": "job_1", "location": "US"}, "jobComplete": false}"#)
            .create_async()
            .await;
        let second_page = server
            .mock("GET", "/bigquery/v2/projects/proj/queries/job_1")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_body(r#"{
                "jobReference": {"projectId": "proj", "jobId": "job_1", "location": "US"},
                "jobComplete": true,
                "schema": {"fields": [{"name": "driver_ID", "type": "INTEGER"}, {"name": "stress_reason", "type": "STRING"}]},
                "rows": [{"f": [{"v": "3"}, {"v": null}]}]
            }"#)
            .create_async()
            .await;
        let first_page = server
            .mock("GET", "/bigquery/v2/projects/proj/queries/job_1")
            .match_query(Matcher::Exact("location=US&timeoutMs=10000".into()))
            .with_status(200)
            .with_body(r#"{
                "jobReference": {"projectId": "proj", "jobId": "job_1", "location": "US"},
                "jobComplete": true,
                "schema": {"fields": [{"name": "driver_ID", "type": "INTEGER"}, {"name": "stress_reason", "type": "STRING"}]},
                "rows": [{"f": [{"v": "1"}, {"v": "tired"}]}, {"f": [{"v": "2"}, {"v": "tired"}]}],
                "pageToken": "p2"
            }"#)
            .create_async()
            .await;

        let result = client(&server)
            .run_query("SELECT driver_ID, stress_reason FROM t")
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.rows[0]["driver_ID"], json!(1));
        assert_eq!(result.rows[1]["stress_reason"], json!("tired"));
        assert_eq!(result.rows[2]["stress_reason"], Value::Null);
        assert_eq!(result.schema.column_names(), vec!["driver_ID", "stress_reason"]);
        first.assert_async().await;
        first_page.assert_async().await;
        second_page.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_query_surfaces_invalid_sql_verbatim() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/bigquery/v2/projects/proj/queries")
            .with_status(400)
            .with_body(r#"{"error": {"code": 400, "message": "Syntax error: Unexpected end of script"}}"#)
            .create_async()
            .await;

        let result = client(&server).run_query("SELECT").await;
        match result {
            Err(WarehouseError::Query(message)) => assert!(message.contains("Syntax error")),
            other => panic!("expected query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_rows_replaces_with_single_job() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/bigquery/v2/projects/proj/jobs")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
            .match_header("content-type", Matcher::Regex("^multipart/related; boundary=".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("\"writeDisposition\":\"WRITE_TRUNCATE\"".into()),
                Matcher::Regex("\"sourceFormat\":\"NEWLINE_DELIMITED_JSON\"".into()),
                Matcher::Regex(r#"\{"driver_ID":1,"stress_reason":"tired","embedding":\[0.5,0.25\]\}"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"{"jobReference": {"projectId": "proj", "jobId": "load_1", "location": "US"}, "status": {"state": "RUNNING"}}"#)
            .expect(1)
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/bigquery/v2/projects/proj/jobs/load_1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{
                "jobReference": {"projectId": "proj", "jobId": "load_1", "location": "US"},
                "status": {"state": "DONE"},
                "statistics": {"load": {"outputRows": "1"}}
            }"#)
            .create_async()
            .await;

        let schema = TableSchema::new(vec![
            FieldSchema::nullable("driver_ID", FieldType::Integer),
            FieldSchema::nullable("stress_reason", FieldType::String),
            FieldSchema::repeated("embedding", FieldType::Float),
        ]);
        let row = json!({"driver_ID": 1, "stress_reason": "tired", "embedding": [0.5, 0.25]})
            .as_object()
            .cloned()
            .unwrap();

        let summary = client(&server)
            .load_rows(&table(), &[row], &schema, WriteMode::Replace)
            .await
            .unwrap();

        assert_eq!(summary.output_rows, 1);
        assert_eq!(summary.job_id, "load_1");
        upload.assert_async().await;
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_load_job_is_an_error() {
        let mut server = Server::new_async().await;
        let _upload = server
            .mock("POST", "/upload/bigquery/v2/projects/proj/jobs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"jobReference": {"projectId": "proj", "jobId": "load_2"}, "status": {"state": "PENDING"}}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/bigquery/v2/projects/proj/jobs/load_2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{
                "jobReference": {"projectId": "proj", "jobId": "load_2"},
                "status": {"state": "DONE", "errorResult": {"reason": "invalid", "message": "CSV table encountered too many errors"}}
            }"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drivers.csv");
        std::fs::write(&path, "Driver_ID,Name\n1,Ana\n").unwrap();

        let config = LoadJobConfig::csv_replace(TableSchema::default());
        let result = client(&server).load_file(&table(), &path, &config).await;

        match result {
            Err(WarehouseError::Job { job_id, message }) => {
                assert_eq!(job_id, "load_2");
                assert!(message.contains("too many errors"));
            }
            other => panic!("expected job error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_job_id_is_assigned_by_the_client() {
        let mut server = Server::new_async().await;
        // The first attempt was accepted server-side; the retry sees the job already exists
        let upload = server
            .mock("POST", "/upload/bigquery/v2/projects/proj/jobs")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(
                r#""jobReference":\{"jobId":"gigpulse_load_[0-9a-f]{16}","location":"US"\}"#.into(),
            ))
            .with_status(409)
            .with_body(r#"{"error": {"code": 409, "message": "Already Exists: Job proj:US.gigpulse_load"}}"#)
            .expect(1)
            .create_async()
            .await;
        let poll = server
            .mock(
                "GET",
                Matcher::Regex(r"^/bigquery/v2/projects/proj/jobs/gigpulse_load_[0-9a-f]{16}".into()),
            )
            .match_query(Matcher::UrlEncoded("location".into(), "US".into()))
            .with_status(200)
            .with_body(r#"{
                "jobReference": {"projectId": "proj", "jobId": "gigpulse_load_0000000000000001", "location": "US"},
                "status": {"state": "DONE"},
                "statistics": {"load": {"outputRows": "2"}}
            }"#)
            .expect(1)
            .create_async()
            .await;

        let schema = TableSchema::new(vec![FieldSchema::nullable("driver_ID", FieldType::Integer)]);
        let rows: Vec<Row> = (1..=2)
            .map(|id| json!({"driver_ID": id}).as_object().cloned().unwrap())
            .collect();

        let summary = client(&server)
            .load_rows(&table(), &rows, &schema, WriteMode::Append)
            .await
            .unwrap();

        assert_eq!(summary.output_rows, 2);
        upload.assert_async().await;
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn test_streaming_insert_returns_row_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bigquery/v2/projects/proj/datasets/MARTS_DATA/tables/driver_reason_embeddings/insertAll")
            .match_body(Matcher::PartialJson(json!({"skipInvalidRows": true})))
            .with_status(200)
            .with_body(r#"{"kind": "bigquery#tableDataInsertAllResponse", "insertErrors": [
                {"index": 1, "errors": [{"reason": "invalid", "message": "no such field: titel"}]}
            ]}"#)
            .create_async()
            .await;

        let rows: Vec<Row> = vec![
            json!({"title": "a"}).as_object().cloned().unwrap(),
            json!({"titel": "b"}).as_object().cloned().unwrap(),
        ];
        let errors = client(&server)
            .insert_rows_streaming(&table(), &rows)
            .await
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].messages, vec!["invalid: no such field: titel".to_string()]);
        mock.assert_async().await;
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_related("b", "{}", b"x\n");
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n--b\r\nContent-Type: application/octet-stream\r\n\r\nx\n\r\n--b--\r\n"
        );
    }
}

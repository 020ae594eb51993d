//! CSV loaders for the driver roster and ride history
//!
//! Each load replaces the staging table with the file contents in one load
//! job: header row skipped, schema given explicitly, autodetect on.

use crate::catalog::{Tables, drivers_data_schema, rides_data_schema};
use crate::error::Result;
use crate::warehouse::{LoadJobConfig, LoadSummary, TableId, TableSchema, Warehouse};
use std::path::Path;
use tracing::{info, instrument};

/// Replace `table` with the rows of a CSV file
#[instrument(skip(warehouse, schema), fields(table = %table, path = %path.display()))]
pub async fn load_csv(
    warehouse: &dyn Warehouse,
    table: &TableId,
    path: &Path,
    schema: TableSchema,
) -> Result<LoadSummary> {
    // Fail before submitting a job if the file is not there
    tokio::fs::metadata(path).await?;

    let config = LoadJobConfig::csv_replace(schema);
    let summary = warehouse.load_file(table, path, &config).await?;
    info!(job_id = %summary.job_id, rows = summary.output_rows, "csv loaded");
    Ok(summary)
}

pub async fn load_drivers(
    warehouse: &dyn Warehouse,
    tables: &Tables,
    path: &Path,
) -> Result<LoadSummary> {
    load_csv(warehouse, &tables.drivers_data, path, drivers_data_schema()).await
}

pub async fn load_rides(
    warehouse: &dyn Warehouse,
    tables: &Tables,
    path: &Path,
) -> Result<LoadSummary> {
    load_csv(warehouse, &tables.rides_data, path, rides_data_schema()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::{HttpClient, RetryPolicy};
    use crate::warehouse::{BigQuery, MemoryWarehouse};
    use mockito::{Matcher, Server};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drivers_csv_replaces_staging_table() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/bigquery/v2/projects/p/jobs")
            .match_query(Matcher::Any)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""tableId":"drivers_data""#.into()),
                Matcher::Regex(r#""sourceFormat":"CSV""#.into()),
                Matcher::Regex(r#""writeDisposition":"WRITE_TRUNCATE""#.into()),
                Matcher::Regex(r#""skipLeadingRows":1"#.into()),
                Matcher::Regex(r#""autodetect":true"#.into()),
                Matcher::Regex(r#""name":"Driver_ID","type":"INTEGER","mode":"REQUIRED""#.into()),
                Matcher::Regex("1,Ana,34,Chicago".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"jobReference": {"projectId": "p", "jobId": "load_drivers"}, "status": {"state": "DONE"}, "statistics": {}}"#)
            .expect(1)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/bigquery/v2/projects/p/jobs/load_drivers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"jobReference": {"projectId": "p", "jobId": "load_drivers"}, "status": {"state": "DONE"}, "statistics": {"load": {"outputRows": "2"}}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drivers_data.csv");
        std::fs::write(
            &path,
            "Driver_ID,Name,Age,City,Experience_Years,Average_Rating,Active_Status\n1,Ana,34,Chicago,5,4.8,Active\n2,Bo,51,Miami,12,4.6,Inactive\n",
        )
        .unwrap();

        let mut bigquery = BigQuery::new(HttpClient::new(RetryPolicy::none()).unwrap(), "p", "US", "t")
            .with_poll_interval(Duration::from_millis(1));
        bigquery.set_base_url(server.url());
        let table = TableId::new("p", "STAGING_DATA", "drivers_data");

        let summary = load_csv(&bigquery, &table, &path, drivers_data_schema())
            .await
            .unwrap();

        assert_eq!(summary.output_rows, 2);
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_file_submits_no_job() {
        let warehouse = MemoryWarehouse::new();
        let table = TableId::new("p", "STAGING_DATA", "rides_data");

        let result = load_csv(
            &warehouse,
            &table,
            Path::new("/nonexistent/rides_data.csv"),
            rides_data_schema(),
        )
        .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(warehouse.calls().await.is_empty());
    }
}

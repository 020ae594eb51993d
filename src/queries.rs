//! # SQL Catalog
//!
//! Builders for the warehouse-side SQL the jobs run: the generative AI views
//! over the staging data and the source query of the embedding pipeline.
//!
//! ## Key Components
//!
//! - `articles_metrics_sql`: four yes/no pressure flags per news article
//! - `drivers_metrics_sql`: aggregated ride metrics plus an AI stress score and reason
//! - `driver_reason_tags_sql`: two or three keywords per stress reason
//! - `embedding_source_sql`: id and text of every row with a non-null text
//!
//! The AI functions run through a warehouse connection and the
//! `gemini-2.0-flash` endpoint.

use crate::catalog::Tables;
use crate::warehouse::TableId;

/// Generative model the AI SQL functions call
pub const AI_ENDPOINT: &str = "gemini-2.0-flash";

/// Named arguments shared by every AI function call
fn ai_options(connection_path: &str) -> String {
    format!(
        "connection_id => '{}',\n    endpoint => '{}'",
        connection_path, AI_ENDPOINT
    )
}

fn bool_flag(question: &str, alias: &str, connection_path: &str) -> String {
    format!(
        r#"  AI.GENERATE_BOOL(
    FORMAT("""
{question}

Article name: %s
Content: %s
""", article_name, content),
    {options}
  ) AS {alias}"#,
        question = question,
        options = ai_options(connection_path),
        alias = alias,
    )
}

/// Per-article pressure flags over the curated news table
pub fn articles_metrics_sql(tables: &Tables, connection_path: &str) -> String {
    let flags = [
        (
            "Does this article suggest that drivers are experiencing financial pressure or debt due to work-related expenses?",
            "financial_pressure",
        ),
        (
            "Does this article describe unsafe or dangerous working conditions for drivers?",
            "unsafe_conditions",
        ),
        (
            "Does this article mention lack of support, unfair treatment, or neglect from the platform toward gig workers?",
            "lack_of_support",
        ),
        (
            "Does this article suggest that drivers are overworked or at risk of burnout?",
            "overwork_burnout",
        ),
    ]
    .iter()
    .map(|(question, alias)| bool_flag(question, alias, connection_path))
    .collect::<Vec<_>>()
    .join(",\n\n");

    format!(
        "SELECT\n  article_name,\n  city,\n  published,\n\n{flags}\n\nFROM {source}\nWHERE content IS NOT NULL AND content != ''",
        flags = flags,
        source = tables.news_content.quoted(),
    )
}

/// Per-driver ride metrics with a stress score in [0, 1] and a two-sentence reason
pub fn drivers_metrics_sql(tables: &Tables, connection_path: &str) -> String {
    format!(
        r#"WITH summary_drivers AS (
  SELECT drivers.Driver_ID,
         drivers.Age,
         drivers.City,
         drivers.Experience_Years,
         drivers.Average_Rating,
         rides.Date,
         COUNT(rides.Ride_ID) AS total_rides,
         ROUND(SUM(rides.Fare), 2) AS total_fare,
         SUM(rides.Duration_min) AS total_duration_min
  FROM {drivers} drivers
  LEFT JOIN {rides} rides
  ON drivers.Driver_ID = rides.Driver_ID
  GROUP BY drivers.Driver_ID,
           drivers.Age,
           drivers.City,
           drivers.Experience_Years,
           drivers.Average_Rating,
           rides.Date
),

drivers_metrics AS (
  SELECT Driver_ID AS driver_ID,
         Age,
         City,
         Experience_Years,
         ANY_VALUE(Average_Rating) AS Average_Rating,
         COUNT(DISTINCT Date) AS active_days,
         SUM(total_rides) AS total_rides_all_days,
         MAX(total_rides) AS max_rides,
         AVG(total_rides) AS avg_rides,
         MIN(total_fare) AS min_fare,
         MAX(total_fare) AS max_fare,
         STDDEV(total_fare) AS stddev_fare,
         SUM(total_duration_min) AS total_duration_min_all_days
  FROM summary_drivers
  GROUP BY Driver_ID, Age, City, Experience_Years
)

SELECT driver_ID,
       City,
       Age,
  AI.GENERATE_DOUBLE(
    prompt => FORMAT("""
Example:
A 44-year-old driver from Los Angeles with 11 years of experience, a 4.9 average rating, 7 rides in 5 active days, worked a total of 402 minutes. The minimum fare was $20.45 and the maximum was $215.37, with a fare standard deviation of $75. This driver has a stress level of 0.2.

Now assess the following driver:
A %d-year-old driver from %s with %d years of experience, a %.1f rating, %d rides in %d active days, worked a total of %d minutes. The minimum fare was $%.2f and the maximum was $%.2f, with a fare standard deviation of $%.2f. What is the estimated stress level (from 0 to 1)?
""",
      Age,
      City,
      Experience_Years,
      Average_Rating,
      total_rides_all_days,
      active_days,
      total_duration_min_all_days,
      min_fare,
      max_fare,
      stddev_fare
    ),
    {options}
  ).result AS stress_score,

  AI.GENERATE(
    prompt => FORMAT("""
Given the following metrics, write a short 2-sentence explanation describing this driver's work routine and stress rationale.

Driver Profile:
- Age: %d
- City: %s
- Experience: %d years
- Average rating: %.1f
- Active days: %d
- Total rides: %d
- Total minutes worked: %d
- Fare range: $%.2f to $%.2f
- Fare standard deviation: $%.2f

Your response should mention the workload and variability in earnings, and whether the stress level is likely high or low.
""",
      Age,
      City,
      Experience_Years,
      Average_Rating,
      active_days,
      total_rides_all_days,
      total_duration_min_all_days,
      min_fare,
      max_fare,
      stddev_fare
    ),
    {options}
  ).result AS stress_reason
FROM drivers_metrics"#,
        drivers = tables.drivers_data.quoted(),
        rides = tables.rides_data.quoted(),
        options = ai_options(connection_path),
    )
}

/// Keywords describing each driver's stress reason
pub fn driver_reason_tags_sql(tables: &Tables, connection_path: &str) -> String {
    format!(
        r#"SELECT driver_ID,
  AI.GENERATE(
    prompt => FORMAT("""
Given the stress reason described by the driver, return 2 to 3 keywords that reflect the health state of the driver.
Return them like the example below, with at most 2 words per keyword.

Keyword1, Keyword2, Keyword3

Stress text:
%s
""",
      stress_reason
    ),
    {options}
  ).result AS stress_report_tags
FROM {source}"#,
        options = ai_options(connection_path),
        source = tables.drivers_metrics.quoted(),
    )
}

/// Snapshot a view into a table so downstream jobs do not re-run the AI functions
pub fn materialize_view_sql(view: &TableId, table: &TableId) -> String {
    format!(
        "CREATE OR REPLACE TABLE {} AS\nSELECT * FROM {}",
        table.quoted(),
        view.quoted()
    )
}

/// Read id and text of every row whose text is not null
pub fn embedding_source_sql(source: &TableId, id_column: &str, text_column: &str) -> String {
    format!(
        "SELECT `{id}`, `{text}`\nFROM {source}\nWHERE `{text}` IS NOT NULL",
        id = id_column,
        text = text_column,
        source = source.quoted(),
    )
}

/// Column of [`embedding_rows_sql`] counting the rows that share a text
pub const ROW_COUNT_COLUMN: &str = "row_count";

/// Read one row per distinct text of a materialized embedding table, with the
/// number of rows sharing it. Rows with equal text carry the same vector.
pub fn embedding_rows_sql(table: &TableId, id_column: &str, text_column: &str) -> String {
    format!(
        "SELECT ANY_VALUE(`{id}`) AS `{id}`, `{text}`, ANY_VALUE(`{embedding}`) AS `{embedding}`, COUNT(*) AS `{count}`\nFROM {table}\nWHERE `{text}` IS NOT NULL\nGROUP BY `{text}`\nORDER BY `{text}`",
        id = id_column,
        text = text_column,
        embedding = crate::catalog::EMBEDDING_COLUMN,
        count = ROW_COUNT_COLUMN,
        table = table.quoted(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn tables() -> Tables {
        let vars: std::collections::HashMap<&str, &str> = [
            ("project_id", "gig"),
            ("staging_dataset_id", "STAGING_DATA"),
            ("marts_dataset_id", "MARTS_DATA"),
            ("connection_id", "conn"),
            ("genai_api_key", "k"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN", "t"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|n| vars.get(n).map(|v| v.to_string())).unwrap();
        Tables::new(&config)
    }

    const CONNECTION: &str = "projects/gig/locations/us/connections/conn";

    #[test]
    fn test_articles_metrics_has_four_flags() {
        let sql = articles_metrics_sql(&tables(), CONNECTION);
        assert_eq!(sql.matches("AI.GENERATE_BOOL(").count(), 4);
        for alias in [
            "financial_pressure",
            "unsafe_conditions",
            "lack_of_support",
            "overwork_burnout",
        ] {
            assert!(sql.contains(&format!("AS {}", alias)), "missing {}", alias);
        }
        assert!(sql.contains("FROM `gig.STAGING_DATA.news_content_usa`"));
        assert!(sql.contains("WHERE content IS NOT NULL AND content != ''"));
        assert_eq!(sql.matches(CONNECTION).count(), 4);
    }

    #[test]
    fn test_drivers_metrics_reads_staging_tables() {
        let sql = drivers_metrics_sql(&tables(), CONNECTION);
        assert!(sql.contains("FROM `gig.STAGING_DATA.drivers_data` drivers"));
        assert!(sql.contains("LEFT JOIN `gig.STAGING_DATA.rides_data` rides"));
        assert!(sql.contains(").result AS stress_score"));
        assert!(sql.contains(").result AS stress_reason"));
        assert!(sql.contains("endpoint => 'gemini-2.0-flash'"));
    }

    #[test]
    fn test_reason_tags_read_the_metrics_view() {
        let sql = driver_reason_tags_sql(&tables(), CONNECTION);
        assert!(sql.contains("FROM `gig.MARTS_DATA.drivers_metrics`"));
        assert!(sql.contains("AS stress_report_tags"));
    }

    #[test]
    fn test_embedding_rows_are_grouped_by_text() {
        let table = TableId::new("gig", "MARTS_DATA", "driver_reason_embeddings");
        let sql = embedding_rows_sql(&table, "driver_ID", "stress_reason");
        assert!(sql.contains("COUNT(*) AS `row_count`"));
        assert!(sql.contains("ANY_VALUE(`embedding`) AS `embedding`"));
        assert!(sql.contains("FROM `gig.MARTS_DATA.driver_reason_embeddings`"));
        assert!(sql.contains("GROUP BY `stress_reason`"));
    }

    #[test]
    fn test_embedding_source_excludes_null_text() {
        let source = TableId::new("gig", "MARTS_DATA", "tbl_drivers_metrics");
        assert_eq!(
            embedding_source_sql(&source, "driver_ID", "stress_reason"),
            "SELECT `driver_ID`, `stress_reason`\nFROM `gig.MARTS_DATA.tbl_drivers_metrics`\nWHERE `stress_reason` IS NOT NULL"
        );
    }
}

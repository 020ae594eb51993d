//! Creation of the generative AI views over the staging data

use crate::catalog::Tables;
use crate::error::Result;
use crate::queries::{
    articles_metrics_sql, driver_reason_tags_sql, drivers_metrics_sql, materialize_view_sql,
};
use crate::warehouse::{TableId, Warehouse};
use tracing::{info, instrument};

/// Create (or replace) every view, in dependency order. With `materialize`,
/// the driver metrics view is also snapshotted into its table so the
/// embedding job reads stable reasons. Returns what was written.
#[instrument(skip(warehouse, tables))]
pub async fn create_views(
    warehouse: &dyn Warehouse,
    tables: &Tables,
    connection_path: &str,
    materialize: bool,
) -> Result<Vec<TableId>> {
    let mut written = Vec::new();

    let views = [
        (&tables.articles_metrics, articles_metrics_sql(tables, connection_path)),
        (&tables.drivers_metrics, drivers_metrics_sql(tables, connection_path)),
        (&tables.drivers_reason_tags, driver_reason_tags_sql(tables, connection_path)),
    ];
    for (view, sql) in views {
        warehouse.create_or_replace_view(view, &sql).await?;
        info!(view = %view, "view created");
        println!("Created view {}", view);
        written.push(view.clone());
    }

    if materialize {
        let sql = materialize_view_sql(&tables.drivers_metrics, &tables.drivers_metrics_table);
        warehouse.run_query(&sql).await?;
        info!(table = %tables.drivers_metrics_table, "view materialized");
        println!("Materialized {} into {}", tables.drivers_metrics, tables.drivers_metrics_table);
        written.push(tables.drivers_metrics_table.clone());
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::warehouse::MemoryWarehouse;
    use crate::warehouse::memory::WarehouseCall;

    fn config() -> Config {
        Config::from_lookup(|name| match name {
            "project_id" => Some("gig".into()),
            "staging_dataset_id" => Some("STAGING_DATA".into()),
            "marts_dataset_id" => Some("MARTS_DATA".into()),
            "connection_id" => Some("conn".into()),
            "genai_api_key" => Some("k".into()),
            "GOOGLE_OAUTH_ACCESS_TOKEN" => Some("t".into()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_views_are_created_in_order() {
        let config = config();
        let tables = Tables::new(&config);
        let warehouse = MemoryWarehouse::new();

        let written = create_views(&warehouse, &tables, &config.connection_path(), false)
            .await
            .unwrap();

        assert_eq!(
            written,
            vec![
                tables.articles_metrics.clone(),
                tables.drivers_metrics.clone(),
                tables.drivers_reason_tags.clone(),
            ]
        );
        assert_eq!(
            warehouse.calls().await,
            written.iter().cloned().map(WarehouseCall::View).collect::<Vec<_>>()
        );
        let tags = warehouse.view_sql(&tables.drivers_reason_tags).await.unwrap();
        assert!(tags.contains("projects/gig/locations/us/connections/conn"));
    }

    #[tokio::test]
    async fn test_materialize_snapshots_driver_metrics() {
        let config = config();
        let tables = Tables::new(&config);
        let warehouse = MemoryWarehouse::new();

        let written = create_views(&warehouse, &tables, &config.connection_path(), true)
            .await
            .unwrap();

        assert_eq!(written.last(), Some(&tables.drivers_metrics_table));
        assert!(warehouse.calls().await.contains(&WarehouseCall::Query(
            "CREATE OR REPLACE TABLE `gig.MARTS_DATA.tbl_drivers_metrics` AS\nSELECT * FROM `gig.MARTS_DATA.drivers_metrics`".into()
        )));
    }
}

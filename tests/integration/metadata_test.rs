//! Catalog metadata tests through the query service.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlgate::config::Config;
use sqlgate::engine::{sql_types, CatalogColumn, CatalogTable, MockEngine};
use sqlgate::error::GatewayError;
use sqlgate::metadata::{ConfiguredExposure, DEFAULT_CATALOG, DEFAULT_SCHEMA};
use sqlgate::query::QueryService;

fn catalog() -> MockEngine {
    let mut malformed = CatalogColumn::new(None, "CUSTOMERS", "NAME", sql_types::VARCHAR, "VARCHAR");
    malformed.buffer_length = Some("n/a".to_string());
    malformed.sql_data_type = Some("12".to_string());

    MockEngine::new().with_catalog(
        vec![
            CatalogTable::new(Some("RETAIL"), "ORDERS"),
            CatalogTable::new(Some("RETAIL"), "SALARIES"),
            CatalogTable::new(None, "CUSTOMERS"),
        ],
        vec![
            CatalogColumn::new(Some("RETAIL"), "SALARIES", "AMOUNT", sql_types::DECIMAL, "DECIMAL"),
            CatalogColumn::new(Some("RETAIL"), "ORDERS", "ID", sql_types::BIGINT, "BIGINT"),
            CatalogColumn::new(Some("RETAIL"), "ORDERS", "TOTAL", sql_types::DOUBLE, "DOUBLE"),
            malformed,
            CatalogColumn::new(Some("RETAIL"), "GHOST", "X", sql_types::INTEGER, "INTEGER"),
        ],
    )
}

fn config() -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[projects.retail]
host = "localhost"
database = "retail"
exposed_tables = ["orders", "Customers"]
"#,
    )
    .unwrap();
    Config::load_from_file(&path).unwrap()
}

#[tokio::test]
async fn test_hidden_tables_and_their_columns_are_filtered() {
    let engine = catalog();
    let service = QueryService::new(Arc::new(engine.clone()))
        .with_exposure(Arc::new(ConfiguredExposure::from_config(&config())));

    let tables = service.list_tables("retail").await.unwrap();

    let names: Vec<_> = tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(names, vec!["ORDERS", "CUSTOMERS"]);
    let order_columns: Vec<_> = tables[0]
        .columns
        .iter()
        .map(|c| c.column_name.as_str())
        .collect();
    assert_eq!(order_columns, vec!["ID", "TOTAL"]);
    assert!(tables
        .iter()
        .flat_map(|t| &t.columns)
        .all(|c| c.table_name != "SALARIES"));
    assert_eq!(engine.connections_closed(), engine.connections_opened());
}

#[tokio::test]
async fn test_missing_schema_uses_sentinels_and_lenient_numbers() {
    let service = QueryService::new(Arc::new(catalog()));

    let tables = service.list_tables("retail").await.unwrap();
    let customers = tables
        .iter()
        .find(|t| t.table_name == "CUSTOMERS")
        .unwrap();

    assert_eq!(customers.table_cat, DEFAULT_CATALOG);
    assert_eq!(customers.table_schem, DEFAULT_SCHEMA);
    assert_eq!(customers.columns.len(), 1);
    let column = &customers.columns[0];
    assert_eq!(column.table_schem, DEFAULT_SCHEMA);
    assert_eq!(column.buffer_length, -1);
    assert_eq!(column.sql_data_type, 12);
    assert_eq!(column.sql_datetime_sub, -1);
    assert_eq!(column.source_data_type, -1);
}

#[tokio::test]
async fn test_list_columns_flattens_in_discovery_order() {
    let service = QueryService::new(Arc::new(catalog()))
        .with_exposure(Arc::new(ConfiguredExposure::from_config(&config())));

    let columns = service.list_columns("retail").await.unwrap();

    let qualified: Vec<_> = columns
        .iter()
        .map(|c| format!("{}.{}", c.table_name, c.column_name))
        .collect();
    assert_eq!(qualified, vec!["ORDERS.ID", "ORDERS.TOTAL", "CUSTOMERS.NAME"]);
}

#[tokio::test]
async fn test_catalog_failure_surfaces_as_metadata_error() {
    let engine = catalog().failing_metadata("catalog offline");
    let service = QueryService::new(Arc::new(engine.clone()));

    let err = service.list_tables("retail").await.unwrap_err();

    assert!(matches!(err, GatewayError::Metadata(_)));
    assert_eq!(engine.connections_closed(), 1);
}

#[tokio::test]
async fn test_connection_failure_surfaces_as_metadata_error() {
    let engine = catalog().failing_connect("source unreachable");
    let service = QueryService::new(Arc::new(engine.clone()));

    let err = service.list_columns("retail").await.unwrap_err();

    assert!(matches!(err, GatewayError::Metadata(_)), "{err:?}");
    assert!(err.to_string().contains("source unreachable"), "{err}");
    assert_eq!(engine.connections_opened(), 0);
}

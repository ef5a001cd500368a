//! Query service tests against a live PostgreSQL database.
//!
//! Skipped unless DATABASE_URL is set.

use std::sync::Arc;
use std::time::Duration;

use sqlgate::engine::PostgresPool;
use sqlgate::query::{QueryService, SqlRequest, TypedParam};
use sqlx::postgres::PgPoolOptions;

async fn get_test_service() -> Option<QueryService> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .ok()?;
    let pool = PostgresPool::from_pool("test", pool, Duration::from_secs(30));
    Some(QueryService::new(Arc::new(pool)))
}

#[tokio::test]
async fn test_plain_query_with_limit() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let request =
        SqlRequest::new("test", "SELECT g AS n FROM generate_series(1, 10) AS g;").with_limit(3);
    let response = service.query(&request).await;

    assert!(!response.is_exception, "{:?}", response.exception_message);
    assert_eq!(response.column_metas[0].name, "n");
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.results[0], vec![Some("1".to_string())]);
    assert_eq!(response.total_scan_count, 0);
    assert_eq!(response.cube, "");
}

#[tokio::test]
async fn test_prepared_query_binds_typed_params() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let request = SqlRequest::new("test", "SELECT ?::int4 + 1 AS next, ?::text AS label")
        .with_params(vec![
            TypedParam::new("java.lang.Integer", "41"),
            TypedParam::null("java.lang.String"),
        ]);
    let response = service.query(&request).await;

    assert!(!response.is_exception, "{:?}", response.exception_message);
    assert_eq!(response.results, vec![vec![Some("42".to_string()), None]]);
}

#[tokio::test]
async fn test_numeric_uuid_json_and_temporal_cells_are_stringified() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let request = SqlRequest::new(
        "test",
        "SELECT SUM(g::int8), 1.5::numeric, \
         '7d3f6a52-1c4e-4f0b-9a8e-2b5c6d7e8f90'::uuid, \
         '{\"a\": 1}'::jsonb, '12.50'::money, \
         '1 day 02:03:04'::interval, '10:11:12+02'::timetz, \
         NULL::numeric \
         FROM generate_series(1, 3) AS g",
    );
    let response = service.query(&request).await;

    assert!(!response.is_exception, "{:?}", response.exception_message);
    assert_eq!(
        response.results,
        vec![vec![
            Some("6".to_string()),
            Some("1.5".to_string()),
            Some("7d3f6a52-1c4e-4f0b-9a8e-2b5c6d7e8f90".to_string()),
            Some("{\"a\":1}".to_string()),
            Some("12.50".to_string()),
            Some("1 day 02:03:04".to_string()),
            Some("10:11:12+02:00".to_string()),
            None,
        ]]
    );
}

#[tokio::test]
async fn test_undecodable_cell_is_an_exception_response() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let response = service
        .query(&SqlRequest::new("test", "SELECT ARRAY[1, 2]::int4[] AS ids"))
        .await;

    assert!(response.is_exception);
    assert!(response.results.is_empty());
    assert!(response
        .exception_message
        .unwrap_or_default()
        .contains("INT4[]"));
}

#[tokio::test]
async fn test_empty_result_still_describes_columns() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let response = service
        .query(&SqlRequest::new("test", "SELECT 1 AS a, 'x' AS b WHERE false"))
        .await;

    assert!(!response.is_exception, "{:?}", response.exception_message);
    assert_eq!(response.column_metas.len(), 2);
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_unknown_project_is_an_exception_response() {
    let Some(service) = get_test_service().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let response = service
        .query(&SqlRequest::new("missing", "SELECT 1"))
        .await;

    assert!(response.is_exception);
    assert!(response
        .exception_message
        .unwrap_or_default()
        .contains("missing"));
}

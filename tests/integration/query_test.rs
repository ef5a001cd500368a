//! End-to-end query tests against the mock engine.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sqlgate::engine::{
    sql_types, ColumnDescriptor, ExecutionContext, MockEngine, MockTable, ParamValue, Statement,
    Value, PARAM_ACCEPT_PARTIAL_RESULT,
};
use sqlgate::query::{
    QueryService, SqlRequest, SqlResponse, SqlRewriter, StaticInterceptor, TypedParam,
};
use tokio_util::sync::CancellationToken;

use super::RecordingSink;

fn orders() -> MockTable {
    MockTable::new(
        "ORDERS",
        vec![
            ColumnDescriptor::new("ID", sql_types::INTEGER, "INTEGER"),
            ColumnDescriptor::new("CUSTOMER", sql_types::VARCHAR, "VARCHAR"),
            ColumnDescriptor::new("AMOUNT", sql_types::DOUBLE, "DOUBLE"),
        ],
    )
    .row(vec![Value::Int(1), Value::from("acme"), Value::Float(9.5)])
    .row(vec![Value::Int(2), Value::from("globex"), Value::Null])
    .row(vec![Value::Int(3), Value::from("initech"), Value::Float(1.25)])
}

fn service(engine: &MockEngine, sink: &Arc<RecordingSink>) -> QueryService {
    QueryService::new(Arc::new(engine.clone())).with_stats_sink(sink.clone())
}

#[tokio::test]
async fn test_statistics_aggregate_across_contexts() {
    let engine = MockEngine::new().with_table(orders()).with_contexts(vec![
        ExecutionContext::new("sales", Some(7), 5),
        ExecutionContext::new("sales", Some(3), 7).partial(),
        ExecutionContext::new("inventory", None, 2),
    ]);
    let sink = Arc::new(RecordingSink::default());

    let response = service(&engine, &sink)
        .query(&SqlRequest::new("retail", "SELECT * FROM orders").with_limit(10))
        .await;

    assert!(!response.is_exception, "{:?}", response.exception_message);
    assert_eq!(response.column_metas.len(), 3);
    assert_eq!(response.results.len(), 3);
    assert_eq!(
        response.results[1],
        vec![Some("2".to_string()), Some("globex".to_string()), None]
    );
    assert_eq!(response.total_scan_count, 14);
    assert!(response.is_partial_result);
    assert_eq!(response.cube, "sales");
    assert!(!response.hit_cache);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.success);
    assert_eq!(record.result_row_count, 3);
    assert_eq!(record.stats.total_scan_count, 14);
    assert_eq!(
        record.stats.cube_names_touched.iter().collect::<Vec<_>>(),
        vec!["inventory", "sales"]
    );
    assert_eq!(
        record.stats.cuboid_ids_touched.iter().copied().collect::<Vec<_>>(),
        vec![3, 7]
    );
    assert_eq!(engine.connections_closed(), engine.connections_opened());
}

#[tokio::test]
async fn test_limit_offset_and_partial_flag_reach_engine() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());

    let request = SqlRequest::new("retail", "  SELECT * FROM orders;  ")
        .with_limit(10)
        .with_offset(20)
        .with_accept_partial(false);
    let response = service(&engine, &sink).query(&request).await;

    assert!(!response.is_exception);
    assert_eq!(
        engine.last_statement(),
        Some(Statement::Plain(
            "SELECT * FROM orders LIMIT 10 OFFSET 20".to_string()
        ))
    );
    assert_eq!(
        engine
            .last_parameters()
            .get(PARAM_ACCEPT_PARTIAL_RESULT)
            .map(String::as_str),
        Some("false")
    );
    assert!(!sink.records()[0].accept_partial);
}

#[tokio::test]
async fn test_existing_limit_is_left_alone() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());

    let request = SqlRequest::new("retail", "SELECT * FROM orders limit 1").with_limit(50);
    service(&engine, &sink).query(&request).await;

    assert_eq!(
        engine.last_statement().map(|s| s.sql().to_string()),
        Some("SELECT * FROM orders limit 1".to_string())
    );
}

#[tokio::test]
async fn test_parameters_bind_in_order() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());

    let request = SqlRequest::new(
        "retail",
        "SELECT * FROM orders WHERE ID = ? AND CUSTOMER = ? AND AMOUNT > ?",
    )
    .with_params(vec![
        TypedParam::new("java.lang.Integer", "2"),
        TypedParam::null("java.lang.String"),
        TypedParam::new("com.example.Money", "1.5"),
    ]);
    let response = service(&engine, &sink).query(&request).await;
    assert!(!response.is_exception, "{:?}", response.exception_message);

    let Some(Statement::Prepared(prepared)) = engine.last_statement() else {
        panic!("Expected a prepared statement");
    };
    assert_eq!(prepared.get(1), Some(&ParamValue::Integer(Some(2))));
    assert_eq!(prepared.get(2), Some(&ParamValue::String(None)));
    assert_eq!(
        prepared.get(3),
        Some(&ParamValue::Object(Some("1.5".to_string())))
    );
}

#[tokio::test]
async fn test_bad_parameter_fails_before_execution() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());

    let request = SqlRequest::new("retail", "SELECT * FROM orders WHERE ID = ?")
        .with_params(vec![TypedParam::new("int", "two")]);
    let response = service(&engine, &sink).query(&request).await;

    assert!(response.is_exception);
    let message = response.exception_message.unwrap_or_default();
    assert!(message.contains("parameter 1"), "{message}");
    assert!(message.contains("'two'"), "{message}");
    assert!(response.results.is_empty());
    assert_eq!(engine.connections_opened(), 0);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].result_row_count, 0);
}

#[tokio::test]
async fn test_engine_failure_releases_connection() {
    let engine = MockEngine::new()
        .with_table(orders())
        .failing_execute("Encountered \"FORM\" at line 1");
    let sink = Arc::new(RecordingSink::default());

    let response = service(&engine, &sink)
        .query(&SqlRequest::new("retail", "SELECT * FORM orders"))
        .await;

    assert!(response.is_exception);
    assert!(response
        .exception_message
        .as_deref()
        .unwrap_or_default()
        .contains("FORM"));
    assert_eq!(response.total_scan_count, 0);
    assert_eq!(engine.connections_opened(), 1);
    assert_eq!(engine.connections_closed(), 1);
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn test_unknown_table_is_an_exception_response() {
    let engine = MockEngine::new();
    let sink = Arc::new(RecordingSink::default());

    let response = service(&engine, &sink)
        .query(&SqlRequest::new("retail", "SELECT * FROM missing"))
        .await;

    assert!(response.is_exception);
    assert!(response
        .exception_message
        .unwrap_or_default()
        .contains("Table 'missing' not found"));
    assert_eq!(engine.connections_closed(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_materialization() {
    let engine = MockEngine::new()
        .with_table(orders())
        .with_row_delay(Duration::from_millis(200));
    let sink = Arc::new(RecordingSink::default());
    let service = service(&engine, &sink);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let response = service
        .query_with_cancel(&SqlRequest::new("retail", "SELECT * FROM orders"), &cancel)
        .await;

    assert!(response.is_exception);
    assert_eq!(response.exception_message.as_deref(), Some("Query cancelled"));
    assert!(response.results.is_empty());
    assert_eq!(engine.connections_opened(), 1);
    assert_eq!(engine.connections_closed(), 1);
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test]
async fn test_interceptor_short_circuits() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());
    let canned = SqlResponse::new(
        vec![ColumnDescriptor::new("1", sql_types::INTEGER, "INTEGER")],
        vec![vec![Some("1".to_string())]],
    );
    let service = service(&engine, &sink)
        .with_interceptor(Arc::new(StaticInterceptor::new().with_response("SELECT 1", canned.clone())));

    let response = service.query(&SqlRequest::new("retail", "select 1;")).await;

    assert_eq!(response, canned);
    assert_eq!(engine.connections_opened(), 0);
    assert!(engine.last_statement().is_none());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].result_row_count, 1);
}

#[tokio::test]
async fn test_cached_interception_carries_no_statistics() {
    let engine = MockEngine::new().with_contexts(vec![ExecutionContext::new("sales", Some(1), 9)]);
    let sink = Arc::new(RecordingSink::default());
    let service = service(&engine, &sink).with_interceptor(Arc::new(
        StaticInterceptor::new().with_response("SELECT 1", SqlResponse::default().cached()),
    ));

    let response = service.query(&SqlRequest::new("retail", "SELECT 1")).await;

    assert!(response.hit_cache);
    let record = &sink.records()[0];
    assert!(record.hit_cache);
    assert_eq!(record.stats.total_scan_count, 0);
    assert!(record.stats.cube_names_touched.is_empty());
}

struct UpperCaseKeywords;

impl SqlRewriter for UpperCaseKeywords {
    fn rewrite(&self, sql: &str) -> String {
        sql.replace("select", "SELECT").replace("from", "FROM")
    }
}

#[tokio::test]
async fn test_rewriter_runs_before_normalization() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());
    let service = service(&engine, &sink).with_rewriter(Arc::new(UpperCaseKeywords));

    let request = SqlRequest::new("retail", "select * from orders").with_limit(5);
    let response = service.query(&request).await;

    assert!(!response.is_exception);
    assert_eq!(
        engine.last_statement().map(|s| s.sql().to_string()),
        Some("SELECT * FROM orders LIMIT 5".to_string())
    );
    assert_eq!(sink.records()[0].sql, "select * from orders");
}

#[tokio::test]
async fn test_response_serializes_camel_case() {
    let engine = MockEngine::new().with_table(orders());
    let sink = Arc::new(RecordingSink::default());

    let response = service(&engine, &sink)
        .query(&SqlRequest::new("retail", "SELECT * FROM orders"))
        .await;
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["totalScanCount"], 0);
    assert_eq!(json["isException"], false);
    assert_eq!(json["columnMetas"][0]["name"], "ID");
    assert_eq!(json["results"][1][2], serde_json::Value::Null);
}

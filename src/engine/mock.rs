//! Mock engine for testing.
//!
//! Provides an in-memory, scriptable engine: tables with fixed rows, a
//! canned catalog, execution contexts to emit, and failure injection.
//! Connection open/close counts are tracked so tests can assert that every
//! acquired connection is released.

use super::{
    CatalogColumn, CatalogTable, ColumnDescriptor, Connection, ConnectionPool, ExecutionContext,
    QueryScope, ResultCursor, Row, Statement, Value,
};
use crate::engine::sql_types;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A table served by the mock engine.
#[derive(Debug, Clone)]
pub struct MockTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl MockTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }
}

#[derive(Debug, Default)]
struct Observed {
    opened: AtomicUsize,
    closed: AtomicUsize,
    last_statement: Mutex<Option<Statement>>,
    last_parameters: Mutex<HashMap<String, String>>,
}

/// A mock engine that serves predefined tables and statistics.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    tables: HashMap<String, MockTable>,
    catalog_tables: Vec<CatalogTable>,
    catalog_columns: Vec<CatalogColumn>,
    contexts: Vec<ExecutionContext>,
    execute_failure: Option<String>,
    connect_failure: Option<String>,
    metadata_failure: Option<String>,
    row_delay: Option<Duration>,
    observed: Arc<Observed>,
}

impl MockEngine {
    /// Creates an engine with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a queryable table.
    pub fn with_table(mut self, table: MockTable) -> Self {
        self.tables.insert(table.name.to_uppercase(), table);
        self
    }

    /// Sets the catalog returned by metadata calls.
    pub fn with_catalog(mut self, tables: Vec<CatalogTable>, columns: Vec<CatalogColumn>) -> Self {
        self.catalog_tables = tables;
        self.catalog_columns = columns;
        self
    }

    /// Sets the execution contexts recorded on every execute.
    pub fn with_contexts(mut self, contexts: Vec<ExecutionContext>) -> Self {
        self.contexts = contexts;
        self
    }

    /// Makes every execute fail with the given message.
    pub fn failing_execute(mut self, message: impl Into<String>) -> Self {
        self.execute_failure = Some(message.into());
        self
    }

    /// Makes connection acquisition fail with the given message.
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_failure = Some(message.into());
        self
    }

    /// Makes catalog calls fail with the given message.
    pub fn failing_metadata(mut self, message: impl Into<String>) -> Self {
        self.metadata_failure = Some(message.into());
        self
    }

    /// Delays every row read, for cancellation tests.
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = Some(delay);
        self
    }

    /// Number of connections handed out.
    pub fn connections_opened(&self) -> usize {
        self.observed.opened.load(Ordering::SeqCst)
    }

    /// Number of connections released.
    pub fn connections_closed(&self) -> usize {
        self.observed.closed.load(Ordering::SeqCst)
    }

    /// The last statement executed.
    pub fn last_statement(&self) -> Option<Statement> {
        self.observed
            .last_statement
            .lock()
            .ok()
            .and_then(|stmt| stmt.clone())
    }

    /// Engine-side parameters seen by the last execute.
    pub fn last_parameters(&self) -> HashMap<String, String> {
        self.observed
            .last_parameters
            .lock()
            .map(|params| params.clone())
            .unwrap_or_default()
    }

    fn find_table(&self, sql: &str) -> Option<std::result::Result<&MockTable, String>> {
        let mut words = sql.split_whitespace();
        while let Some(word) = words.next() {
            if word.eq_ignore_ascii_case("from") {
                let name = words.next()?.trim_matches(|c: char| c == '"' || c == '`');
                let key = name.to_uppercase();
                return Some(self.tables.get(&key).ok_or_else(|| name.to_string()));
            }
        }
        None
    }
}

#[async_trait]
impl ConnectionPool for MockEngine {
    async fn get_connection(&self, _project: &str) -> Result<Box<dyn Connection>> {
        if let Some(message) = &self.connect_failure {
            return Err(GatewayError::connection(message.clone()));
        }
        self.observed.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            engine: self.clone(),
            closed: false,
        }))
    }
}

struct MockConnection {
    engine: MockEngine,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(
        &mut self,
        statement: &Statement,
        scope: &QueryScope,
    ) -> Result<Box<dyn ResultCursor>> {
        let observed = &self.engine.observed;
        if let Ok(mut last) = observed.last_statement.lock() {
            *last = Some(statement.clone());
        }
        if let Ok(mut params) = observed.last_parameters.lock() {
            *params = scope.parameters().clone();
        }

        if let Some(message) = &self.engine.execute_failure {
            return Err(GatewayError::query(message.clone()));
        }

        for context in &self.engine.contexts {
            scope.contexts().record(context.clone());
        }

        let (columns, rows) = match self.engine.find_table(statement.sql()) {
            Some(Ok(table)) => (table.columns.clone(), table.rows.clone()),
            Some(Err(name)) => {
                return Err(GatewayError::query(format!("Table '{name}' not found")));
            }
            None => (
                vec![ColumnDescriptor::new("result", sql_types::VARCHAR, "VARCHAR")],
                vec![vec![Value::String(format!(
                    "Mock result for: {}",
                    statement.sql()
                ))]],
            ),
        };

        Ok(Box::new(MockCursor {
            columns,
            rows: rows.into_iter(),
            delay: self.engine.row_delay,
        }))
    }

    async fn tables(&mut self) -> Result<Vec<CatalogTable>> {
        match &self.engine.metadata_failure {
            Some(message) => Err(GatewayError::metadata(message.clone())),
            None => Ok(self.engine.catalog_tables.clone()),
        }
    }

    async fn columns(&mut self) -> Result<Vec<CatalogColumn>> {
        match &self.engine.metadata_failure {
            Some(message) => Err(GatewayError::metadata(message.clone())),
            None => Ok(self.engine.catalog_columns.clone()),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.engine.observed.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct MockCursor {
    columns: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<Row>,
    delay: Option<Duration>,
}

#[async_trait]
impl ResultCursor for MockCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MockEngine {
        MockEngine::new().with_table(
            MockTable::new(
                "T",
                vec![ColumnDescriptor::new("ID", sql_types::INTEGER, "INTEGER")],
            )
            .row(vec![Value::Int(1)])
            .row(vec![Value::Int(2)]),
        )
    }

    #[tokio::test]
    async fn test_mock_select_from_table() {
        let engine = engine();
        let mut conn = engine.get_connection("p").await.unwrap();
        let mut cursor = conn
            .execute(&Statement::Plain("select * from t".into()), &QueryScope::new())
            .await
            .unwrap();

        assert_eq!(cursor.columns().len(), 1);
        assert_eq!(cursor.next_row().await.unwrap(), Some(vec![Value::Int(1)]));
        assert_eq!(cursor.next_row().await.unwrap(), Some(vec![Value::Int(2)]));
        assert_eq!(cursor.next_row().await.unwrap(), None);

        conn.close();
        conn.close();
        assert_eq!(engine.connections_opened(), 1);
        assert_eq!(engine.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_mock_unknown_table() {
        let engine = engine();
        let mut conn = engine.get_connection("p").await.unwrap();
        let result = conn
            .execute(&Statement::Plain("SELECT * FROM missing".into()), &QueryScope::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_contexts() {
        let engine = engine().with_contexts(vec![ExecutionContext::new("c", Some(1), 4)]);
        let scope = QueryScope::new();
        let mut conn = engine.get_connection("p").await.unwrap();
        conn.execute(&Statement::Plain("SELECT 1".into()), &scope)
            .await
            .unwrap();
        assert_eq!(scope.contexts().snapshot().len(), 1);
        assert!(engine.last_statement().is_some());
    }
}

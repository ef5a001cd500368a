//! Engine abstraction layer for sqlgate.
//!
//! The OLAP engine that actually answers SQL is an external collaborator.
//! This module defines the trait-based interface the gateway consumes:
//! a per-project connection pool, connections that execute statements and
//! expose catalog metadata, and cursors over result rows.

pub mod mock;
mod postgres;
mod statement;
mod types;

pub use mock::{MockEngine, MockTable};
pub use postgres::PostgresPool;
pub use statement::{ParamValue, PreparedStatement, Statement};
pub use types::{sql_types, ColumnDescriptor, Nullability, Row, Value};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Engine-side parameter telling the planner whether partial results are acceptable.
pub const PARAM_ACCEPT_PARTIAL_RESULT: &str = "AcceptPartialResult";

/// One physical scan the engine performed while answering a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Cube the scan ran against.
    pub cube_name: String,
    /// Cuboid that was scanned; lookup-only scans have none.
    pub cuboid_id: Option<i64>,
    /// Rows scanned.
    pub scan_count: i64,
    /// Whether the scan stopped early and returned partial data.
    pub is_partial: bool,
}

impl ExecutionContext {
    pub fn new(cube_name: impl Into<String>, cuboid_id: Option<i64>, scan_count: i64) -> Self {
        Self {
            cube_name: cube_name.into(),
            cuboid_id,
            scan_count,
            is_partial: false,
        }
    }

    /// Marks the context as having returned partial data.
    pub fn partial(self) -> Self {
        Self {
            is_partial: true,
            ..self
        }
    }
}

/// Collects the execution contexts an engine attaches to one request.
///
/// The engine appends while executing; the gateway reads once afterwards.
#[derive(Debug, Clone, Default)]
pub struct ContextCollector {
    contexts: Arc<Mutex<Vec<ExecutionContext>>>,
}

impl ContextCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a context. Called by engines only.
    pub fn record(&self, context: ExecutionContext) {
        self.lock().push(context);
    }

    /// Returns a copy of every context recorded so far.
    pub fn snapshot(&self) -> Vec<ExecutionContext> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExecutionContext>> {
        // Pushes are atomic, so a poisoned list is still consistent.
        self.contexts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-request state shared with the engine for the duration of one query.
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    parameters: HashMap<String, String>,
    contexts: ContextCollector,
}

impl QueryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an engine-side parameter consulted during planning.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Returns the collector engines append execution contexts to.
    pub fn contexts(&self) -> &ContextCollector {
        &self.contexts
    }
}

/// A table as reported by the engine catalog, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogTable {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub table_type: Option<String>,
    pub remarks: Option<String>,
}

impl CatalogTable {
    pub fn new(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: schema.map(String::from),
            name: name.into(),
            table_type: Some("TABLE".to_string()),
            remarks: None,
        }
    }
}

/// A column as reported by the engine catalog, before normalization.
///
/// Some providers report a few numeric attributes as free text; those
/// stay as strings here and are parsed leniently during discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogColumn {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub data_type: i32,
    pub type_name: String,
    pub column_size: i32,
    pub buffer_length: Option<String>,
    pub decimal_digits: i32,
    pub num_prec_radix: i32,
    pub nullable: i32,
    pub remarks: Option<String>,
    pub column_def: Option<String>,
    pub sql_data_type: Option<String>,
    pub sql_datetime_sub: Option<String>,
    pub char_octet_length: i32,
    pub ordinal_position: i32,
    pub is_nullable: Option<String>,
    pub scope_catalog: Option<String>,
    pub scope_schema: Option<String>,
    pub scope_table: Option<String>,
    pub source_data_type: Option<String>,
    pub is_autoincrement: Option<String>,
}

impl CatalogColumn {
    pub fn new(
        schema: Option<&str>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type: i32,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.map(String::from),
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type,
            type_name: type_name.into(),
            nullable: 1,
            is_nullable: Some("YES".to_string()),
            is_autoincrement: Some("NO".to_string()),
            ..Self::default()
        }
    }
}

/// Hands out connections scoped to a named project.
///
/// Acquisition may block waiting for a free connection; any timeout is
/// the pool's responsibility.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Acquires a connection for the given project.
    async fn get_connection(&self, project: &str) -> Result<Box<dyn Connection>>;
}

/// A live engine connection.
#[async_trait]
pub trait Connection: Send {
    /// Executes a statement, recording execution contexts into `scope`.
    async fn execute(
        &mut self,
        statement: &Statement,
        scope: &QueryScope,
    ) -> Result<Box<dyn ResultCursor>>;

    /// Lists every table in the catalog.
    async fn tables(&mut self) -> Result<Vec<CatalogTable>>;

    /// Lists every column in the catalog.
    async fn columns(&mut self) -> Result<Vec<CatalogColumn>>;

    /// Releases the connection back to its pool.
    ///
    /// Must be idempotent and must not block: it runs from `Drop`.
    fn close(&mut self);
}

/// A forward-only cursor over result rows.
#[async_trait]
pub trait ResultCursor: Send {
    /// Column descriptors, available before any row is read.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Reads the next row, or `None` when exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

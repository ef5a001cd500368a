//! Statement execution against pooled, project-scoped connections.
//!
//! A connection is held from acquisition until its result has been
//! materialized and is released on every exit path, including errors and
//! cancellation (dropping the in-flight future drops the guard).

use std::ops::{Deref, DerefMut};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::engine::{
    ColumnDescriptor, Connection, ConnectionPool, QueryScope, ResultCursor, Statement,
};
use crate::error::{GatewayError, Result};
use crate::query::materializer::{self, ResultMatrix};
use crate::query::params::{self, TypedParam};

/// A connection that is closed when dropped.
pub struct ScopedConnection {
    inner: Box<dyn Connection>,
}

impl ScopedConnection {
    pub fn new(inner: Box<dyn Connection>) -> Self {
        Self { inner }
    }
}

impl Deref for ScopedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Acquires a scoped connection for `project`, giving up if cancelled.
pub async fn acquire(
    pool: &dyn ConnectionPool,
    project: &str,
    cancel: &CancellationToken,
) -> Result<ScopedConnection> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        conn = pool.get_connection(project) => conn.map(ScopedConnection::new),
    }
}

/// Builds a plain statement, or a prepared one when parameters are given.
pub fn build_statement(sql: &str, params: &[TypedParam]) -> Result<Statement> {
    if params.is_empty() {
        Ok(Statement::Plain(sql.to_string()))
    } else {
        params::prepare(sql, params).map(Statement::Prepared)
    }
}

/// An executed statement whose rows have not been read yet.
///
/// Field order matters: the cursor is dropped before its connection.
pub struct Execution {
    cursor: Box<dyn ResultCursor>,
    columns: Vec<ColumnDescriptor>,
    connection: ScopedConnection,
}

impl Execution {
    /// Column descriptors, read once from the cursor before any row.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Reads every row, then releases the cursor and the connection.
    pub async fn materialize(
        self,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ColumnDescriptor>, ResultMatrix)> {
        let Execution {
            mut cursor,
            columns,
            connection,
        } = self;

        let result = materializer::materialize(cursor.as_mut(), &columns, cancel).await;
        drop(cursor);
        drop(connection);

        result.map(|matrix| (columns, matrix))
    }
}

/// Executes statements on connections drawn from a pool.
pub struct StatementExecutor<'a> {
    pool: &'a dyn ConnectionPool,
}

impl<'a> StatementExecutor<'a> {
    /// Creates a new statement executor.
    pub fn new(pool: &'a dyn ConnectionPool) -> Self {
        Self { pool }
    }

    /// Executes `sql` for `project`, binding `params` in order when present.
    ///
    /// Engine failures surface as a single query execution error; parameter
    /// conversion failures and cancellation keep their own variants. No
    /// retry happens here.
    pub async fn execute(
        &self,
        project: &str,
        sql: &str,
        params: &[TypedParam],
        scope: &QueryScope,
        cancel: &CancellationToken,
    ) -> Result<Execution> {
        let statement = build_statement(sql, params)?;

        let result = self.run(project, &statement, scope, cancel).await;
        if let Err(e) = &result {
            if !e.is_cancelled() {
                error!("Query failed for project {}: {}", project, e);
            }
        }
        result
    }

    async fn run(
        &self,
        project: &str,
        statement: &Statement,
        scope: &QueryScope,
        cancel: &CancellationToken,
    ) -> Result<Execution> {
        let mut connection = acquire(self.pool, project, cancel)
            .await
            .map_err(GatewayError::into_execution_error)?;

        debug!("Executing on project {}: {}", project, statement.sql());
        let cursor = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            cursor = connection.execute(statement, scope) => {
                cursor.map_err(GatewayError::into_execution_error)?
            }
        };
        let columns = cursor.columns().to_vec();

        Ok(Execution {
            cursor,
            columns,
            connection,
        })
    }
}

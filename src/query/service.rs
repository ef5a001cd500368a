//! Query façade.
//!
//! Orchestrates one request through interception, rewriting,
//! normalization, execution, materialization and statistics, and turns
//! every failure into an exception-flagged response.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::audit::{LogStatsSink, QueryRecord, StatsSink};
use crate::engine::{
    ColumnDescriptor, ConnectionPool, ExecutionContext, QueryScope, PARAM_ACCEPT_PARTIAL_RESULT,
};
use crate::error::Result;
use crate::metadata::{self, ColumnMeta, ExposeAll, ExposurePolicy, TableMeta};
use crate::query::executor::{self, StatementExecutor};
use crate::query::hooks::{NoInterception, PassThrough, SqlInterceptor, SqlRewriter};
use crate::query::materializer::ResultMatrix;
use crate::query::normalizer::normalize;
use crate::query::params::TypedParam;
use crate::query::stats::{primary_cube_name, QueryStats};

fn default_accept_partial() -> bool {
    true
}

/// A SQL request from the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlRequest {
    #[serde(alias = "sql")]
    pub sql_text: String,
    /// Positional parameters; empty for a plain statement.
    #[serde(default, alias = "parameters")]
    pub params: Vec<TypedParam>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    pub project: String,
    #[serde(default = "default_accept_partial")]
    pub accept_partial: bool,
}

impl SqlRequest {
    /// Creates a plain request with no limit or offset.
    pub fn new(project: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            sql_text: sql.into(),
            params: Vec::new(),
            limit: 0,
            offset: 0,
            project: project.into(),
            accept_partial: default_accept_partial(),
        }
    }

    pub fn with_params(self, params: Vec<TypedParam>) -> Self {
        Self { params, ..self }
    }

    pub fn with_limit(self, limit: u32) -> Self {
        Self { limit, ..self }
    }

    pub fn with_offset(self, offset: u32) -> Self {
        Self { offset, ..self }
    }

    pub fn with_accept_partial(self, accept_partial: bool) -> Self {
        Self {
            accept_partial,
            ..self
        }
    }
}

/// The response returned for every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlResponse {
    pub column_metas: Vec<ColumnDescriptor>,
    pub results: ResultMatrix,
    /// Cube of the first execution context, or empty.
    pub cube: String,
    pub is_exception: bool,
    pub exception_message: Option<String>,
    pub is_partial_result: bool,
    pub total_scan_count: i64,
    pub hit_cache: bool,
}

impl SqlResponse {
    /// Builds a successful response.
    pub fn new(columns: Vec<ColumnDescriptor>, results: ResultMatrix) -> Self {
        Self {
            column_metas: columns,
            results,
            ..Self::default()
        }
    }

    /// Builds an exception response carrying `message`.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            is_exception: true,
            exception_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Marks the response as served from cache.
    pub fn cached(self) -> Self {
        Self {
            hit_cache: true,
            ..self
        }
    }

    /// Attaches cube, scan count and partial flag from engine contexts.
    fn with_statistics(self, contexts: &[ExecutionContext]) -> Self {
        let stats = QueryStats::aggregate(contexts);
        Self {
            cube: primary_cube_name(contexts),
            is_partial_result: stats.is_partial_result,
            total_scan_count: stats.total_scan_count,
            ..self
        }
    }
}

/// Lifecycle of one request through the façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Normalized,
    Executing,
    Materializing,
    Aggregating,
    Completed,
    Failed,
}

impl QueryState {
    /// Returns true if `next` directly follows `self`.
    pub fn can_advance_to(self, next: QueryState) -> bool {
        use QueryState::*;
        matches!(
            (self, next),
            (Received, Normalized)
                | (Received, Completed)
                | (Normalized, Executing)
                | (Executing, Materializing)
                | (Materializing, Aggregating)
                | (Aggregating, Completed)
                | (Executing, Failed)
                | (Materializing, Failed)
        )
    }
}

/// Tracks the state of one request and logs each transition.
#[derive(Debug)]
struct QueryRun {
    state: QueryState,
}

impl QueryRun {
    fn new() -> Self {
        Self {
            state: QueryState::Received,
        }
    }

    fn advance(&mut self, next: QueryState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid query transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Query state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Entry point for SQL execution and catalog metadata.
pub struct QueryService {
    pool: Arc<dyn ConnectionPool>,
    exposure: Arc<dyn ExposurePolicy>,
    interceptor: Arc<dyn SqlInterceptor>,
    rewriter: Arc<dyn SqlRewriter>,
    sink: Arc<dyn StatsSink>,
}

impl QueryService {
    /// Creates a service over `pool` that exposes everything, intercepts
    /// nothing and logs statistics.
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            exposure: Arc::new(ExposeAll),
            interceptor: Arc::new(NoInterception),
            rewriter: Arc::new(PassThrough),
            sink: Arc::new(LogStatsSink::new()),
        }
    }

    pub fn with_exposure(self, exposure: Arc<dyn ExposurePolicy>) -> Self {
        Self { exposure, ..self }
    }

    pub fn with_interceptor(self, interceptor: Arc<dyn SqlInterceptor>) -> Self {
        Self {
            interceptor,
            ..self
        }
    }

    pub fn with_rewriter(self, rewriter: Arc<dyn SqlRewriter>) -> Self {
        Self { rewriter, ..self }
    }

    pub fn with_stats_sink(self, sink: Arc<dyn StatsSink>) -> Self {
        Self { sink, ..self }
    }

    /// Answers `request`. Failures come back as exception responses.
    pub async fn query(&self, request: &SqlRequest) -> SqlResponse {
        self.query_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Answers `request`, aborting with a `Cancelled` failure when `cancel`
    /// fires before the result is complete.
    pub async fn query_with_cancel(
        &self,
        request: &SqlRequest,
        cancel: &CancellationToken,
    ) -> SqlResponse {
        let started = Instant::now();
        let mut run = QueryRun::new();

        if let Some(response) = self.interceptor.intercept(&request.sql_text) {
            debug!(
                "Returning intercepted response, is exception? {}",
                response.is_exception
            );
            run.advance(QueryState::Completed);
            self.record(request, &response, &[], started);
            return response;
        }

        let corrected = self.rewriter.rewrite(&request.sql_text);
        if corrected != request.sql_text {
            debug!("The corrected query: {}", corrected);
        }

        let sql = normalize(&corrected, request.limit, request.offset);
        let mut scope = QueryScope::new();
        scope.set_parameter(
            PARAM_ACCEPT_PARTIAL_RESULT,
            request.accept_partial.to_string(),
        );
        run.advance(QueryState::Normalized);

        let response = match self.execute(&mut run, request, &sql, &scope, cancel).await {
            Ok(response) => {
                run.advance(QueryState::Aggregating);
                let response = response.with_statistics(&scope.contexts().snapshot());
                run.advance(QueryState::Completed);
                response
            }
            Err(e) => {
                run.advance(QueryState::Failed);
                debug!("{} for project {}: {}", e.category(), request.project, e);
                SqlResponse::from_message(e.to_string())
            }
        };

        self.record(request, &response, &scope.contexts().snapshot(), started);
        response
    }

    async fn execute(
        &self,
        run: &mut QueryRun,
        request: &SqlRequest,
        sql: &str,
        scope: &QueryScope,
        cancel: &CancellationToken,
    ) -> Result<SqlResponse> {
        run.advance(QueryState::Executing);
        let execution = StatementExecutor::new(self.pool.as_ref())
            .execute(&request.project, sql, &request.params, scope, cancel)
            .await?;

        run.advance(QueryState::Materializing);
        let (columns, results) = execution.materialize(cancel).await?;
        Ok(SqlResponse::new(columns, results))
    }

    fn record(
        &self,
        request: &SqlRequest,
        response: &SqlResponse,
        contexts: &[ExecutionContext],
        started: Instant,
    ) {
        // Cached answers never carry engine statistics.
        let stats = if response.hit_cache {
            QueryStats::default()
        } else {
            QueryStats::aggregate(contexts)
        };
        let result_row_count = if response.is_exception {
            0
        } else {
            response.results.len()
        };

        self.sink.record(&QueryRecord {
            sql: request.sql_text.clone(),
            project: request.project.clone(),
            success: response.exception_message.is_none(),
            duration: started.elapsed(),
            stats,
            result_row_count,
            accept_partial: request.accept_partial,
            hit_cache: response.hit_cache,
            message: response.exception_message.clone(),
        });
    }

    /// Lists the exposed tables of `project`, each with its exposed columns.
    pub async fn list_tables(&self, project: &str) -> Result<Vec<TableMeta>> {
        let mut connection =
            executor::acquire(self.pool.as_ref(), project, &CancellationToken::new())
                .await
                .map_err(metadata::into_metadata_error)?;
        metadata::discover(&mut *connection, self.exposure.as_ref(), project).await
    }

    /// Lists the exposed columns of `project` across all exposed tables.
    pub async fn list_columns(&self, project: &str) -> Result<Vec<ColumnMeta>> {
        let tables = self.list_tables(project).await?;
        Ok(tables.into_iter().flat_map(|table| table.columns).collect())
    }
}

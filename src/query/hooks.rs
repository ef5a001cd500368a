//! Pre-execution hooks: short-circuit interception and SQL rewriting.

use std::collections::HashMap;

use crate::query::service::SqlResponse;

/// Answers some statements without touching the engine.
pub trait SqlInterceptor: Send + Sync {
    /// Returns a ready response if `sql` needs no live execution.
    fn intercept(&self, sql: &str) -> Option<SqlResponse>;
}

/// Rewrites SQL for client-compatibility quirks before normalization.
pub trait SqlRewriter: Send + Sync {
    fn rewrite(&self, sql: &str) -> String;
}

/// Intercepts nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterception;

impl SqlInterceptor for NoInterception {
    fn intercept(&self, _sql: &str) -> Option<SqlResponse> {
        None
    }
}

/// Leaves SQL untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SqlRewriter for PassThrough {
    fn rewrite(&self, sql: &str) -> String {
        sql.to_string()
    }
}

/// Answers a fixed set of health-check statements with canned responses.
///
/// Statements match case-insensitively after whitespace is collapsed and
/// trailing semicolons dropped.
#[derive(Debug, Clone, Default)]
pub struct StaticInterceptor {
    responses: HashMap<String, SqlResponse>,
}

impl StaticInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a canned response for `sql`.
    pub fn with_response(mut self, sql: &str, response: SqlResponse) -> Self {
        self.responses.insert(canonical(sql), response);
        self
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl SqlInterceptor for StaticInterceptor {
    fn intercept(&self, sql: &str) -> Option<SqlResponse> {
        self.responses.get(&canonical(sql)).cloned()
    }
}

fn canonical(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

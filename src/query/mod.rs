//! Query pipeline for sqlgate.
//!
//! A request flows through hooks, normalization, parameter binding,
//! execution and materialization; the engine's execution contexts are
//! folded into statistics at the end.

pub mod executor;
pub mod hooks;
pub mod materializer;
pub mod normalizer;
pub mod params;
pub mod service;
pub mod stats;

pub use executor::{Execution, ScopedConnection, StatementExecutor};
pub use hooks::{NoInterception, PassThrough, SqlInterceptor, SqlRewriter, StaticInterceptor};
pub use materializer::{ResultMatrix, ResultRow};
pub use params::{ParamType, TypedParam};
pub use service::{QueryService, QueryState, SqlRequest, SqlResponse};
pub use stats::QueryStats;

//! sqlgate - a request-scoped SQL execution gateway.
//!
//! This library exposes the core modules for use by the binary and
//! integration tests.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod query;

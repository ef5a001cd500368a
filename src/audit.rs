//! Query statistics sink.
//!
//! After every request the gateway hands a flat [`QueryRecord`] to a
//! [`StatsSink`]. The default sink logs one structured event per query and
//! keeps running counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::query::stats::QueryStats;

/// Everything known about one finished query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub sql: String,
    pub project: String,
    pub success: bool,
    pub duration: Duration,
    pub stats: QueryStats,
    pub result_row_count: usize,
    pub accept_partial: bool,
    pub hit_cache: bool,
    pub message: Option<String>,
}

impl QueryRecord {
    /// Renders the multi-line human-readable query block.
    pub fn summary(&self) -> String {
        let separator = "==========================[QUERY]===============================";
        let join = |items: Vec<String>| format!("[{}]", items.join(", "));

        [
            separator.to_string(),
            format!("SQL: {}", self.sql),
            format!("Success: {}", self.success),
            format!("Duration: {:.3}", self.duration.as_secs_f64()),
            format!("Project: {}", self.project),
            format!(
                "Cube Names: {}",
                join(self.stats.cube_names_touched.iter().cloned().collect())
            ),
            format!(
                "Cuboid Ids: {}",
                join(
                    self.stats
                        .cuboid_ids_touched
                        .iter()
                        .map(i64::to_string)
                        .collect()
                )
            ),
            format!("Total scan count: {}", self.stats.total_scan_count),
            format!("Result row count: {}", self.result_row_count),
            format!("Accept Partial: {}", self.accept_partial),
            format!("Hit Cache: {}", self.hit_cache),
            format!("Message: {}", self.message.as_deref().unwrap_or("")),
            separator.to_string(),
        ]
        .join("\n")
    }
}

/// Receives one record per finished query.
pub trait StatsSink: Send + Sync {
    fn record(&self, record: &QueryRecord);
}

/// Running totals across all recorded queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub duration_ms: u64,
    pub total_scan_count: u64,
}

#[derive(Debug, Default)]
struct QueryMetrics {
    count: AtomicU64,
    duration_ms: AtomicU64,
    total_scan_count: AtomicU64,
}

/// Logs each query through `tracing` and accumulates counters.
#[derive(Debug, Default)]
pub struct LogStatsSink {
    metrics: QueryMetrics,
}

impl LogStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            count: self.metrics.count.load(Ordering::Relaxed),
            duration_ms: self.metrics.duration_ms.load(Ordering::Relaxed),
            total_scan_count: self.metrics.total_scan_count.load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for LogStatsSink {
    fn record(&self, record: &QueryRecord) {
        let duration_ms = u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX);
        let scan_count = u64::try_from(record.stats.total_scan_count).unwrap_or(0);

        self.metrics.count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.metrics
            .total_scan_count
            .fetch_add(scan_count, Ordering::Relaxed);

        info!(
            project = %record.project,
            success = record.success,
            duration_ms,
            total_scan_count = record.stats.total_scan_count,
            result_row_count = record.result_row_count,
            partial = record.stats.is_partial_result,
            hit_cache = record.hit_cache,
            "\n{}",
            record.summary()
        );
    }
}

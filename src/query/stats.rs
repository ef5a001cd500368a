//! Aggregation of engine execution contexts into per-query statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::engine::ExecutionContext;

/// Statistics folded from every execution context of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub cube_names_touched: BTreeSet<String>,
    pub cuboid_ids_touched: BTreeSet<i64>,
    pub total_scan_count: i64,
    pub is_partial_result: bool,
}

impl QueryStats {
    /// Folds contexts: union of cube names and non-null cuboid ids, sum of
    /// scan counts, OR of partial flags.
    pub fn aggregate(contexts: &[ExecutionContext]) -> Self {
        contexts.iter().fold(Self::default(), |mut stats, ctx| {
            stats.cube_names_touched.insert(ctx.cube_name.clone());
            if let Some(cuboid_id) = ctx.cuboid_id {
                stats.cuboid_ids_touched.insert(cuboid_id);
            }
            stats.total_scan_count = stats.total_scan_count.saturating_add(ctx.scan_count);
            stats.is_partial_result |= ctx.is_partial;
            stats
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cube_names_touched.is_empty() && self.total_scan_count == 0
    }
}

/// Cube name reported on the response: the first context's, or empty.
pub fn primary_cube_name(contexts: &[ExecutionContext]) -> String {
    contexts
        .first()
        .map(|ctx| ctx.cube_name.clone())
        .unwrap_or_default()
}

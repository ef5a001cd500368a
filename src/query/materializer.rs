//! Materialization of result cursors into textual row matrices.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{ColumnDescriptor, ResultCursor};
use crate::error::{GatewayError, Result};

/// One result row of textual cells; `None` is SQL NULL.
pub type ResultRow = Vec<Option<String>>;

/// Row-major result cells, one entry per column descriptor in every row.
pub type ResultMatrix = Vec<ResultRow>;

/// Drains `cursor` into a matrix of string cells.
///
/// Every native value is rendered as text; type information travels
/// separately in `columns`. Cancellation discards the rows read so far.
pub async fn materialize(
    cursor: &mut dyn ResultCursor,
    columns: &[ColumnDescriptor],
    cancel: &CancellationToken,
) -> Result<ResultMatrix> {
    let mut matrix = ResultMatrix::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            next = cursor.next_row() => next?,
        };
        let Some(row) = next else {
            break;
        };

        if row.len() != columns.len() {
            return Err(GatewayError::query(format!(
                "Row {} has {} values but the result has {} columns",
                matrix.len() + 1,
                row.len(),
                columns.len()
            )));
        }
        matrix.push(row.iter().map(|value| value.to_cell()).collect());
    }

    debug!("Materialized {} rows", matrix.len());
    Ok(matrix)
}

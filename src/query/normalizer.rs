//! Textual SQL normalization.
//!
//! This is a heuristic, not a parser: clause detection is a
//! case-insensitive substring search, so an identifier or literal
//! containing `limit` (e.g. `limit_date`) suppresses LIMIT injection.

/// Cleans `sql` and appends LIMIT/OFFSET clauses when requested.
///
/// Leading and trailing whitespace is stripped and every `;` removed. A
/// positive `limit` appends ` LIMIT <limit>` unless the text already
/// contains `limit`; a positive `offset` likewise appends
/// ` OFFSET <offset>`. Apply once per request: a second pass with the
/// same arguments is not a no-op when the first pass injected nothing.
pub fn normalize(sql: &str, limit: u32, offset: u32) -> String {
    let mut sql = sql.trim().replace(';', "");
    let lowered = sql.to_lowercase();

    if limit > 0 && !lowered.contains("limit") {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    if offset > 0 && !lowered.contains("offset") {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    sql
}

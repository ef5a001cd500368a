//! Saved query persistence.

use crate::error::{GatewayError, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

const CREATED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A saved query as returned to clients.
///
/// Missing project, creator and description surface as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub id: String,
    pub name: String,
    pub project: String,
    pub sql: String,
    pub description: String,
    pub creator: String,
    pub created_date: String,
}

#[derive(Debug, Clone, FromRow)]
struct SavedQueryRow {
    id: i64,
    name: String,
    project: Option<String>,
    sql_string: String,
    creator: Option<String>,
    description: Option<String>,
    created_date: String,
}

impl From<SavedQueryRow> for SavedQuery {
    fn from(row: SavedQueryRow) -> Self {
        Self {
            id: row.id.to_string(),
            name: row.name,
            project: row.project.unwrap_or_default(),
            sql: row.sql_string,
            description: row.description.unwrap_or_default(),
            creator: row.creator.unwrap_or_default(),
            created_date: row.created_date,
        }
    }
}

/// Inserts a saved query stamped with the current local time.
pub async fn save_query(
    pool: &SqlitePool,
    name: &str,
    project: Option<&str>,
    sql: &str,
    creator: Option<&str>,
    description: Option<&str>,
) -> Result<i64> {
    let created_date = Local::now().format(CREATED_DATE_FORMAT).to_string();

    let result = sqlx::query(
        r#"
        INSERT INTO queries (name, project, sql_string, creator, description, created_date)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(project)
    .bind(sql)
    .bind(creator)
    .bind(description)
    .bind(created_date)
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to save query: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Deletes a saved query by id.
pub async fn remove_query(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM queries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to remove saved query: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Lists every query saved by `creator`.
pub async fn list_queries(pool: &SqlitePool, creator: &str) -> Result<Vec<SavedQuery>> {
    let rows: Vec<SavedQueryRow> = sqlx::query_as(
        r#"
        SELECT id, name, project, sql_string, creator, description, created_date
        FROM queries
        WHERE creator = ?
        ORDER BY id
        "#,
    )
    .bind(creator)
    .fetch_all(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to list saved queries: {e}")))?;

    Ok(rows.into_iter().map(SavedQuery::from).collect())
}

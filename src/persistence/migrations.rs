//! Schema versioning and migrations for the state database.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::error::{GatewayError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(GatewayError::persistence(format!(
            "Database schema version ({}) is newer than supported version ({}). \
             Please upgrade sqlgate to the latest version.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating state database from version {} to {}",
            current, CURRENT_VERSION
        );
        for version in (current + 1)..=CURRENT_VERSION {
            run_migration(pool, version).await?;
            record_version(pool, version).await?;
            info!("Applied migration v{}", version);
        }
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        GatewayError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(GatewayError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: saved queries.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            project TEXT,
            sql_string TEXT NOT NULL,
            creator TEXT,
            description TEXT,
            created_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GatewayError::persistence(format!("Failed to create queries table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queries_creator ON queries(creator)")
        .execute(pool)
        .await
        .map_err(|e| GatewayError::persistence(format!("Failed to create queries index: {e}")))?;

    Ok(())
}

//! Persistence layer for sqlgate.
//!
//! Manages the local SQLite state database holding saved queries.

mod migrations;
mod saved_queries;

pub use saved_queries::SavedQuery;

use crate::error::{GatewayError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Saved-query storage backed by the state database.
pub struct SavedQueryStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SavedQueryStore {
    /// Opens or creates the state database at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        match Self::try_open(path).await {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("Failed to open state database: {e}. Attempting recovery...");
                Self::attempt_recovery(path).await
            }
        }
    }

    /// Attempts to open the database with retries for lock contention.
    async fn try_open(path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("State database opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: path.to_path_buf(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::persistence("Failed to open database after retries")))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| GatewayError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                GatewayError::persistence(format!("Failed to connect to state database: {e}"))
            })
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::persistence(format!(
                    "Failed to create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Backs up a corrupted database and recreates it.
    async fn attempt_recovery(path: &Path) -> Result<Self> {
        let backup_path = path.with_extension("db.bak");

        if path.exists() {
            std::fs::rename(path, &backup_path).map_err(|e| {
                GatewayError::persistence(format!(
                    "Failed to backup corrupted database to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up corrupted database to {}", backup_path.display());
        }

        Self::try_open(path).await.map_err(|e| {
            GatewayError::persistence(format!("Failed to recreate database after backup: {e}"))
        })
    }

    /// Saves a query on behalf of `creator` and returns its id.
    pub async fn save_query(
        &self,
        name: &str,
        project: Option<&str>,
        sql: &str,
        creator: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64> {
        saved_queries::save_query(&self.pool, name, project, sql, creator, description).await
    }

    /// Removes a saved query. Returns false when no query had that id.
    pub async fn remove_query(&self, id: i64) -> Result<bool> {
        saved_queries::remove_query(&self.pool, id).await
    }

    /// Lists the queries saved by `creator`, oldest first.
    pub async fn list_queries(&self, creator: &str) -> Result<Vec<SavedQuery>> {
        saved_queries::list_queries(&self.pool, creator).await
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

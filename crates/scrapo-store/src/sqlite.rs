//! `SQLite`-backed key-value store.
//!
//! Values are stored as JSON text in the `kv_store` table, so a dataset
//! survives process restarts. Leases live in the `leases` table with an
//! expiry in unix milliseconds; a single upsert decides each claim, so two
//! processes on one file cannot both win.

use crate::error::{Result, StoreError};
use crate::kv::KeyValueStore;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Key-value store persisted in a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns `StoreError` if the file cannot be opened or a migration fails.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("cannot create {}: {e}", parent.display())))?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::Open("invalid database path: not valid UTF-8".to_string()))?;

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| StoreError::Open(format!("invalid connection string: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        Self::from_pool(pool).await
    }

    /// In-memory database, kept on a single connection so every query sees
    /// the same data.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(|e| StoreError::Open(format!("invalid connection string: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        tracing::debug!("Running store migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(format!("migration execution failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as(
            r"
            SELECT value
            FROM kv_store
            WHERE key = ?
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((value_str,)) => Ok(Some(serde_json::from_str(&value_str)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let value_str = serde_json::to_string(value)?;

        sqlx::query(
            r"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            ",
        )
        .bind(key)
        .bind(value_str)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM kv_store
            WHERE key = ?
            ",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = unix_millis(SystemTime::now());
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let result = sqlx::query(
            r"
            INSERT INTO leases (name, holder, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
            WHERE leases.holder = excluded.holder OR leases.expires_at <= ?4
            ",
        )
        .bind(name)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM leases
            WHERE name = ? AND holder = ?
            ",
        )
        .bind(name)
        .bind(holder)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

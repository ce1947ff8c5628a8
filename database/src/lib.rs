//! Persistent record of item ids already delivered downstream.
//!
//! One row per id with the time it was last marked. Rows older than the
//! retention window are pruned at the start of every run, so the table stays
//! bounded by what a few days of digests can hold.

use chrono::{DateTime, Duration, TimeZone, Utc};
use scout_core::{CoreError, DatabaseError, DedupRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

// SQLite's default host parameter limit is 999.
const LOOKUP_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub total_count: u64,
}

#[derive(Debug, Clone)]
pub struct DedupStore {
    pool: SqlitePool,
}

fn sql_error(e: sqlx::Error) -> CoreError {
    DatabaseError::Sql(e).into()
}

impl DedupStore {
    /// Opens (creating if needed) the store file at `path`, including any
    /// missing parent directories, and applies the schema.
    pub async fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DatabaseError::ConnectionFailed {
                    reason: format!("cannot create {}: {}", parent.display(), e),
                }
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options).await
    }

    /// Connects through a `sqlite://` URL.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: format!("{url}: {e}"),
            })?
            .create_if_missing(true);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pushed_items (
                item_id TEXT PRIMARY KEY,
                last_seen_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed {
            migration: format!("create pushed_items: {e}"),
        })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pushed_items_last_seen ON pushed_items(last_seen_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed {
            migration: format!("create last_seen index: {e}"),
        })?;

        Ok(())
    }

    /// Returns the subset of `ids` already in the store.
    pub async fn contains_any(&self, ids: &[String]) -> Result<HashSet<String>, CoreError> {
        let mut seen = HashSet::new();

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT item_id FROM pushed_items WHERE item_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let found: Vec<String> = builder
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await
                .map_err(sql_error)?;
            seen.extend(found);
        }

        debug!("{} of {} ids already seen", seen.len(), ids.len());
        Ok(seen)
    }

    /// Upserts every id with timestamp `at`. Re-marking an id refreshes it.
    pub async fn mark_seen(&self, ids: &[String], at: DateTime<Utc>) -> Result<(), CoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(sql_error)?;
        for id in ids {
            sqlx::query(
                "INSERT OR REPLACE INTO pushed_items (item_id, last_seen_at) VALUES (?, ?)",
            )
            .bind(id)
            .bind(at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(sql_error)?;
        }
        tx.commit().await.map_err(sql_error)?;

        info!("Marked {} items as seen", ids.len());
        Ok(())
    }

    /// Deletes every record last marked more than `older_than` before `now`.
    pub async fn prune(&self, older_than: Duration, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let cutoff = (now - older_than).timestamp();

        let removed = sqlx::query("DELETE FROM pushed_items WHERE last_seen_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?
            .rows_affected();

        if removed > 0 {
            sqlx::query("VACUUM")
                .execute(&self.pool)
                .await
                .map_err(sql_error)?;
            info!("Pruned {} expired records", removed);
        }

        Ok(removed)
    }

    pub async fn get_record(&self, item_id: &str) -> Result<Option<DedupRecord>, CoreError> {
        let row = sqlx::query("SELECT item_id, last_seen_at FROM pushed_items WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seconds: i64 = row.get("last_seen_at");
        let first_seen_at = Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
            DatabaseError::QueryFailed {
                query: format!("stored timestamp {seconds} for {item_id} is out of range"),
            }
        })?;

        Ok(Some(DedupRecord {
            item_id: row.get("item_id"),
            first_seen_at,
        }))
    }

    pub async fn stats(&self) -> Result<DedupStats, CoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pushed_items")
            .fetch_one(&self.pool)
            .await
            .map_err(sql_error)?;

        Ok(DedupStats {
            total_count: total.max(0) as u64,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

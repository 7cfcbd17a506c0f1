//! # Sync Metadata Operations
//!
//! Key/value state owned by the sync service: the pull cursor and the time of
//! the last completed cycle.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_db::LocalDatabase;
//!
//! # async fn example(db: LocalDatabase) -> Result<(), tripsync::shared::StoreError> {
//! db.set_sync_metadata("device_name", "van-7").await?;
//! let cursor = db.last_pulled_at().await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::{LocalDatabase, Result};
use crate::shared::protocol::Millis;
use sqlx::{Row, SqliteConnection};

const LAST_PULLED_AT: &str = "last_pulled_at";
const LAST_SYNC_TIME: &str = "last_sync_time";

impl LocalDatabase {
    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_metadata(&mut conn, key, value).await
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Pull cursor: the server timestamp of the last applied pull.
    ///
    /// `None` before the first pull, or if the stored value is unreadable.
    pub async fn last_pulled_at(&self) -> Result<Option<Millis>> {
        let value = self.get_sync_metadata(LAST_PULLED_AT).await?;
        Ok(value.and_then(|v| match v.parse::<Millis>() {
            Ok(cursor) => Some(cursor),
            Err(_) => {
                tracing::warn!(value = %v, "ignoring unreadable pull cursor");
                None
            }
        }))
    }

    /// Overwrite the pull cursor outside a pull
    pub async fn set_last_pulled_at(&self, cursor: Millis) -> Result<()> {
        self.set_sync_metadata(LAST_PULLED_AT, &cursor.to_string()).await
    }

    /// Get last sync timestamp (RFC 3339)
    pub async fn get_last_sync_time(&self) -> Result<Option<String>> {
        self.get_sync_metadata(LAST_SYNC_TIME).await
    }

    /// Set last sync timestamp to now
    pub async fn set_last_sync_time(&self) -> Result<String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.set_sync_metadata(LAST_SYNC_TIME, &now).await?;
        Ok(now)
    }

    /// Cursor write used inside the pull transaction
    pub(crate) async fn write_cursor(conn: &mut SqliteConnection, cursor: Millis) -> Result<()> {
        Self::upsert_metadata(conn, LAST_PULLED_AT, &cursor.to_string()).await
    }

    async fn upsert_metadata(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(conn)
        .await?;
        Ok(())
    }
}

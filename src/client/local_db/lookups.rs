//! Lookup cache: small reference tables kept for offline forms.

use crate::client::local_db::codec;
use crate::client::local_db::{now_millis, LocalDatabase, Result};
use crate::client::types::LookupEntry;

/// Lookup table holding trip status enumerations
pub const TRIP_STATUSES: &str = "trip_statuses";

impl LocalDatabase {
    /// Replace the cached contents of one lookup table
    pub async fn replace_lookups(&self, kind: &str, entries: &[LookupEntry]) -> Result<()> {
        let fetched_at = now_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM lookup_cache WHERE kind = ?")
            .bind(kind)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO lookup_cache (kind, status_id, payload, fetched_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(kind)
            .bind(&entry.id)
            .bind(codec::encode(entry)?)
            .bind(fetched_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(kind, count = entries.len(), "refreshed lookup cache");
        Ok(())
    }

    /// Cached entries of one lookup table
    pub async fn lookups(&self, kind: &str) -> Result<Vec<LookupEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT status_id, payload FROM lookup_cache WHERE kind = ? ORDER BY status_id ASC",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, payload)| match codec::decode::<LookupEntry>(&payload) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(kind, %id, %error, "skipping corrupt lookup entry");
                    None
                }
            })
            .collect())
    }
}

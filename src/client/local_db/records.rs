//! # Generic Record Operations
//!
//! CRUD for the `records` table, which backs every entity table exchanged
//! through pull/push. Also holds the two write paths used by the sync engine:
//! acknowledging pushed records and applying a pulled changeset.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_db::{LocalDatabase, Predicate};
//! use serde_json::{json, Value};
//!
//! # async fn example(db: LocalDatabase) -> Result<(), tripsync::shared::StoreError> {
//! let handle = db.create("vehicles", json!({ "plate": "AB-123" })).await?;
//! db.update::<Value, _>(&handle, |v| v["plate"] = json!("AB-124")).await?;
//! db.mark_deleted(&handle).await?;
//! let pending = db.query::<Value>("vehicles", &Predicate::needs_push()).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::codec::{self, Entity, LocalRecord, RecordHandle, RecordRow};
use crate::client::local_db::query::Predicate;
use crate::client::local_db::{next_timestamp, LocalDatabase, Result};
use crate::client::sync::sync_state::{AckOutcome, SyncState};
use crate::shared::error::StoreError;
use crate::shared::protocol::{PullResponse, WireRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

const RECORD_COLUMNS: &str =
    "local_id, table_name, server_id, payload, updated_at, revision, sync_state";

/// Result of applying one push acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckApplied {
    /// Record flipped to `Synced`
    Synced,
    /// Tombstone removed
    Purged,
    /// Record changed while the push was in flight; it stays pending
    Superseded,
    /// Row no longer exists
    Missing,
}

/// Counters for one applied pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Remote change ignored because the local row carries newer edits
    pub conflicts_kept_local: usize,
    /// Wire records without an id or with a non-object payload
    pub skipped: usize,
    /// Remote records identical to the synced local row
    pub unchanged: usize,
}

impl LocalDatabase {
    /// Create a pending record from raw JSON fields
    pub async fn create(&self, table: &str, fields: Value) -> Result<RecordHandle> {
        self.insert_record(table, &fields).await
    }

    /// Create a pending record from a typed entity
    pub async fn create_entity<T: Entity>(&self, value: &T) -> Result<RecordHandle> {
        self.insert_record(T::TABLE, value).await
    }

    async fn insert_record<T: Serialize + ?Sized>(&self, table: &str, fields: &T) -> Result<RecordHandle> {
        let payload = codec::encode(fields)?;
        let local_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO records (local_id, table_name, server_id, payload, updated_at, revision, sync_state)
             VALUES (?, ?, NULL, ?, ?, 1, ?)",
        )
        .bind(local_id.to_string())
        .bind(table)
        .bind(payload)
        .bind(next_timestamp(None))
        .bind(SyncState::Pending.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(table, %local_id, "created pending record");
        Ok(RecordHandle {
            table: table.to_string(),
            local_id,
        })
    }

    /// Fetch one record
    pub async fn get<T: DeserializeOwned>(&self, handle: &RecordHandle) -> Result<Option<LocalRecord<T>>> {
        let row = self.fetch_row(handle).await?;
        match row {
            Some(row) => row.decode::<T>().map(Some).map_err(corrupt_row),
            None => Ok(None),
        }
    }

    async fn fetch_row(&self, handle: &RecordHandle) -> Result<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE table_name = ? AND local_id = ?"
        ))
        .bind(&handle.table)
        .bind(handle.local_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Apply a local mutation. The record becomes `Pending`.
    ///
    /// Tombstones cannot be edited.
    pub async fn update<T, F>(&self, handle: &RecordHandle, mutator: F) -> Result<LocalRecord<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let mut record = self
            .get::<T>(handle)
            .await?
            .ok_or_else(|| StoreError::not_found(&handle.table, handle.local_id))?;

        let next_state = record.sync_state.mark_pending()?;
        mutator(&mut record.payload);
        let payload = codec::encode(&record.payload)?;
        let updated_at = next_timestamp(Some(record.updated_at));

        let result = sqlx::query(
            "UPDATE records SET payload = ?, updated_at = ?, revision = revision + 1, sync_state = ?
             WHERE local_id = ? AND revision = ?",
        )
        .bind(payload)
        .bind(updated_at)
        .bind(next_state.as_str())
        .bind(handle.local_id.to_string())
        .bind(record.revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Row vanished or was rewritten by a pull between read and write
            return Err(StoreError::not_found(&handle.table, handle.local_id));
        }

        record.sync_state = next_state;
        record.updated_at = updated_at;
        record.revision += 1;
        Ok(record)
    }

    /// Turn a record into a tombstone. The row stays until the delete is acknowledged.
    pub async fn mark_deleted(&self, handle: &RecordHandle) -> Result<()> {
        let row = self
            .fetch_row(handle)
            .await?
            .ok_or_else(|| StoreError::not_found(&handle.table, handle.local_id))?;

        sqlx::query(
            "UPDATE records SET sync_state = ?, updated_at = ?, revision = revision + 1
             WHERE local_id = ?",
        )
        .bind(SyncState::Deleted.as_str())
        .bind(next_timestamp(Some(row.updated_at)))
        .bind(handle.local_id.to_string())
        .execute(&self.pool)
        .await?;

        tracing::debug!(table = %handle.table, local_id = %handle.local_id, "record marked deleted");
        Ok(())
    }

    /// Query one table. Rows that fail to decode are skipped with a warning.
    pub async fn query<T: DeserializeOwned>(&self, table: &str, predicate: &Predicate) -> Result<Vec<LocalRecord<T>>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE table_name = "
        ));
        qb.push_bind(table.to_string());
        qb.push(" AND ");
        predicate.push_sql(&mut qb);
        qb.push(" ORDER BY updated_at ASC, local_id ASC");

        let rows: Vec<RecordRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(decode_rows(rows))
    }

    /// Query a typed entity table
    pub async fn query_entities<T: Entity>(&self, predicate: &Predicate) -> Result<Vec<LocalRecord<T>>> {
        self.query::<T>(T::TABLE, predicate).await
    }

    /// Count rows matching a predicate
    pub async fn count(&self, table: &str, predicate: &Predicate) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM records WHERE table_name = ");
        qb.push_bind(table.to_string());
        qb.push(" AND ");
        predicate.push_sql(&mut qb);

        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Every pending or deleted record across all tables, oldest first
    pub async fn pending_changes(&self) -> Result<Vec<LocalRecord<Map<String, Value>>>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE sync_state IN ('pending', 'deleted')
             ORDER BY table_name ASC, updated_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows))
    }

    /// Remove a tombstone that never reached the server
    pub(crate) async fn purge_unsynced_tombstone(&self, local_id: &Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM records WHERE local_id = ? AND sync_state = 'deleted' AND server_id IS NULL",
        )
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a push acknowledgment for a record pushed at `pushed_revision`.
    ///
    /// Only flips the state if no local mutation happened since the push was
    /// built; otherwise the server id is kept and the record stays pending.
    pub async fn acknowledge_record(
        &self,
        local_id: &Uuid,
        server_id: Option<&str>,
        pushed_revision: i64,
    ) -> Result<AckApplied> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, String, i64)> =
            sqlx::query_as("SELECT table_name, sync_state, revision FROM records WHERE local_id = ?")
                .bind(local_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

        let Some((table, state, revision)) = current else {
            return Ok(AckApplied::Missing);
        };
        let state = state.parse::<SyncState>().map_err(corrupt_row)?;

        if let Some(server_id) = server_id {
            if state != SyncState::Deleted {
                drop_pulled_duplicate(&mut *tx, &table, local_id, server_id).await?;
            }
        }

        let applied = if state == SyncState::Synced {
            // Duplicate ack
            AckApplied::Synced
        } else if revision != pushed_revision {
            if let Some(server_id) = server_id {
                sqlx::query("UPDATE records SET server_id = ? WHERE local_id = ?")
                    .bind(server_id)
                    .bind(local_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
            AckApplied::Superseded
        } else {
            match state.mark_synced()? {
                AckOutcome::Synced => {
                    sqlx::query(
                        "UPDATE records SET sync_state = 'synced', server_id = COALESCE(?, server_id)
                         WHERE local_id = ?",
                    )
                    .bind(server_id)
                    .bind(local_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                    AckApplied::Synced
                }
                AckOutcome::Purge => {
                    sqlx::query("DELETE FROM records WHERE local_id = ?")
                        .bind(local_id.to_string())
                        .execute(&mut *tx)
                        .await?;
                    AckApplied::Purged
                }
            }
        };

        tx.commit().await?;
        Ok(applied)
    }

    /// Apply a pulled changeset and advance the cursor in one transaction.
    ///
    /// Record-level last-writer-wins: a local row with unpushed edits newer
    /// than the remote version is kept as is.
    pub async fn apply_remote_changes(&self, response: &PullResponse) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        let mut tx = self.pool.begin().await?;

        for (table, changes) in &response.changes {
            for wire in changes.created.iter().chain(changes.updated.iter()) {
                let Some(server_id) = wire.id.as_deref() else {
                    tracing::warn!(table = %table, "skipping pulled record without id");
                    report.skipped += 1;
                    continue;
                };
                let payload = match codec::encode(&wire.fields) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(table = %table, server_id, error = %e, "skipping pulled record");
                        report.skipped += 1;
                        continue;
                    }
                };
                let remote_updated_at = wire.updated_at.unwrap_or(response.timestamp);

                let existing: Option<(String, String, i64, String)> = sqlx::query_as(
                    "SELECT local_id, sync_state, updated_at, payload FROM records
                     WHERE table_name = ? AND server_id = ?",
                )
                .bind(table)
                .bind(server_id)
                .fetch_optional(&mut *tx)
                .await?;

                match existing {
                    None => {
                        sqlx::query(
                            "INSERT INTO records (local_id, table_name, server_id, payload, updated_at, revision, sync_state)
                             VALUES (?, ?, ?, ?, ?, 0, 'synced')",
                        )
                        .bind(Uuid::new_v4().to_string())
                        .bind(table)
                        .bind(server_id)
                        .bind(payload)
                        .bind(remote_updated_at)
                        .execute(&mut *tx)
                        .await?;
                        report.inserted += 1;
                    }
                    Some((local_id, state, local_updated_at, local_payload)) => {
                        let has_local_edits = state != SyncState::Synced.as_str();
                        if has_local_edits && local_updated_at > remote_updated_at {
                            tracing::debug!(table = %table, server_id, "keeping newer local edit");
                            report.conflicts_kept_local += 1;
                            continue;
                        }
                        if !has_local_edits && local_updated_at == remote_updated_at && local_payload == payload {
                            report.unchanged += 1;
                            continue;
                        }
                        sqlx::query(
                            "UPDATE records SET payload = ?, updated_at = ?, revision = revision + 1, sync_state = 'synced'
                             WHERE local_id = ?",
                        )
                        .bind(payload)
                        .bind(remote_updated_at.max(local_updated_at))
                        .bind(local_id)
                        .execute(&mut *tx)
                        .await?;
                        report.updated += 1;
                    }
                }
            }

            for server_id in &changes.deleted {
                let existing: Option<(String, String, i64)> = sqlx::query_as(
                    "SELECT local_id, sync_state, updated_at FROM records
                     WHERE table_name = ? AND server_id = ?",
                )
                .bind(table)
                .bind(server_id)
                .fetch_optional(&mut *tx)
                .await?;

                let Some((local_id, state, local_updated_at)) = existing else {
                    continue;
                };
                // A local edit made after the delete is re-pushed instead
                if state == SyncState::Pending.as_str() && local_updated_at > response.timestamp {
                    tracing::debug!(table = %table, server_id = %server_id, "keeping local edit newer than remote delete");
                    report.conflicts_kept_local += 1;
                    continue;
                }
                sqlx::query("DELETE FROM records WHERE local_id = ?")
                    .bind(local_id)
                    .execute(&mut *tx)
                    .await?;
                report.deleted += 1;
            }
        }

        Self::write_cursor(&mut *tx, response.timestamp).await?;
        tx.commit().await?;

        tracing::info!(
            cursor = response.timestamp,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            conflicts = report.conflicts_kept_local,
            "applied pulled changes"
        );
        Ok(report)
    }
}

/// Remove a row that arrived through a pull under `server_id` before the ack
/// for the locally created copy did. The acknowledged row keeps the id.
async fn drop_pulled_duplicate(
    conn: &mut SqliteConnection,
    table: &str,
    local_id: &Uuid,
    server_id: &str,
) -> Result<()> {
    let duplicate: Option<(String, String)> = sqlx::query_as(
        "SELECT local_id, sync_state FROM records
         WHERE table_name = ? AND server_id = ? AND local_id != ?",
    )
    .bind(table)
    .bind(server_id)
    .bind(local_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some((duplicate_id, state)) = duplicate else {
        return Ok(());
    };
    sqlx::query("DELETE FROM records WHERE local_id = ?")
        .bind(&duplicate_id)
        .execute(&mut *conn)
        .await?;
    tracing::warn!(
        table,
        server_id,
        %local_id,
        duplicate = %duplicate_id,
        duplicate_state = %state,
        "merged pulled duplicate into acknowledged record"
    );
    Ok(())
}

/// Build the wire form of a local record for a push
pub(crate) fn to_wire(record: &LocalRecord<Map<String, Value>>) -> WireRecord {
    WireRecord {
        id: record.server_id.clone(),
        local_id: Some(record.local_id.to_string()),
        updated_at: Some(record.updated_at),
        fields: record.payload.clone(),
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<RecordRow>) -> Vec<LocalRecord<T>> {
    rows.into_iter()
        .filter_map(|row| {
            let local_id = row.local_id.clone();
            let table = row.table_name.clone();
            match row.decode::<T>() {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(%table, %local_id, %error, "skipping corrupt local record");
                    None
                }
            }
        })
        .collect()
}

pub(crate) fn corrupt_row(message: String) -> StoreError {
    StoreError::Codec(<serde_json::Error as serde::de::Error>::custom(message))
}

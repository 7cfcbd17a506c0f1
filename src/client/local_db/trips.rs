//! # Trip Log Storage
//!
//! Rows of `trip_logs` and their binary attachments. Trips follow the same
//! lifecycle as generic records but are replayed through the multipart trip
//! endpoints instead of the batch push.

use crate::client::local_db::codec;
use crate::client::local_db::records::{corrupt_row, AckApplied};
use crate::client::local_db::{next_timestamp, now_millis, LocalDatabase, Result};
use crate::client::sync::sync_state::{AckOutcome, SyncState};
use crate::shared::error::StoreError;
use crate::shared::protocol::Millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User-entered trip fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripPayload {
    /// Trip date, `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub odometer_start: Option<f64>,
    #[serde(default)]
    pub odometer_end: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub status_id: Option<String>,
}

/// Kind of file attached to a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    BeforePhoto,
    AfterPhoto,
    Document,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::BeforePhoto => "before_photo",
            AttachmentKind::AfterPhoto => "after_photo",
            AttachmentKind::Document => "document",
        }
    }

    /// Multipart part name used on upload
    pub fn part_name(self) -> &'static str {
        match self {
            AttachmentKind::BeforePhoto | AttachmentKind::AfterPhoto => "photos",
            AttachmentKind::Document => "attachments",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "before_photo" => Ok(AttachmentKind::BeforePhoto),
            "after_photo" => Ok(AttachmentKind::AfterPhoto),
            "document" => Ok(AttachmentKind::Document),
            other => Err(format!("unknown attachment kind '{other}'")),
        }
    }
}

/// A file stored with a trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripAttachment {
    pub id: Uuid,
    pub kind: AttachmentKind,
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl TripAttachment {
    pub fn new(
        kind: AttachmentKind,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A trip with its sync metadata and attachments
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    /// Client-generated id, stable across edits
    pub trip_id: Uuid,
    pub server_id: Option<String>,
    pub payload: TripPayload,
    /// When the trip happened; drives offline retention
    pub timestamp: Millis,
    pub updated_at: Millis,
    pub revision: i64,
    pub sync_state: SyncState,
    pub attachments: Vec<TripAttachment>,
}

#[derive(Debug, sqlx::FromRow)]
struct TripRow {
    trip_id: String,
    server_id: Option<String>,
    payload: String,
    timestamp: i64,
    updated_at: i64,
    revision: i64,
    sync_state: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: String,
    kind: String,
    file_name: String,
    mime_type: String,
    data: Vec<u8>,
}

impl TripRow {
    fn decode(self, attachments: Vec<TripAttachment>) -> std::result::Result<TripRecord, String> {
        let trip_id = Uuid::parse_str(&self.trip_id)
            .map_err(|e| format!("bad trip id '{}': {e}", self.trip_id))?;
        Ok(TripRecord {
            trip_id,
            server_id: self.server_id,
            payload: codec::decode(&self.payload).map_err(|e| e.to_string())?,
            timestamp: self.timestamp,
            updated_at: self.updated_at,
            revision: self.revision,
            sync_state: self.sync_state.parse()?,
            attachments,
        })
    }
}

impl AttachmentRow {
    fn decode(self) -> std::result::Result<TripAttachment, String> {
        Ok(TripAttachment {
            id: Uuid::parse_str(&self.id).map_err(|e| e.to_string())?,
            kind: self.kind.parse()?,
            file_name: self.file_name,
            mime_type: self.mime_type,
            data: self.data,
        })
    }
}

const TRIP_COLUMNS: &str = "trip_id, server_id, payload, timestamp, updated_at, revision, sync_state";

impl LocalDatabase {
    /// Store a new pending trip with its attachments
    pub async fn insert_trip(
        &self,
        payload: &TripPayload,
        timestamp: Millis,
        attachments: &[TripAttachment],
    ) -> Result<Uuid> {
        let trip_id = Uuid::new_v4();
        let encoded = codec::encode(payload)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO trip_logs (trip_id, server_id, payload, timestamp, updated_at, revision, sync_state)
             VALUES (?, NULL, ?, ?, ?, 1, 'pending')",
        )
        .bind(trip_id.to_string())
        .bind(encoded)
        .bind(timestamp)
        .bind(next_timestamp(None))
        .execute(&mut *tx)
        .await?;

        for attachment in attachments {
            Self::insert_attachment(&mut tx, &trip_id, attachment).await?;
        }

        tx.commit().await?;
        tracing::debug!(%trip_id, attachments = attachments.len(), "stored trip");
        Ok(trip_id)
    }

    async fn insert_attachment(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        trip_id: &Uuid,
        attachment: &TripAttachment,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO trip_attachments (id, trip_id, kind, file_name, mime_type, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(attachment.id.to_string())
        .bind(trip_id.to_string())
        .bind(attachment.kind.as_str())
        .bind(&attachment.file_name)
        .bind(&attachment.mime_type)
        .bind(&attachment.data)
        .bind(now_millis())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fetch one trip with attachments
    pub async fn get_trip(&self, trip_id: &Uuid) -> Result<Option<TripRecord>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip_logs WHERE trip_id = ?"
        ))
        .bind(trip_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let attachments = self.load_attachments(trip_id).await?;
                row.decode(attachments).map(Some).map_err(corrupt_row)
            }
            None => Ok(None),
        }
    }

    async fn load_attachments(&self, trip_id: &Uuid) -> Result<Vec<TripAttachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            "SELECT id, kind, file_name, mime_type, data FROM trip_attachments
             WHERE trip_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(trip_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut attachments = Vec::with_capacity(rows.len());
        for row in rows {
            match row.decode() {
                Ok(attachment) => attachments.push(attachment),
                Err(error) => tracing::warn!(%trip_id, %error, "skipping corrupt attachment"),
            }
        }
        Ok(attachments)
    }

    /// Apply a local edit to a trip. The trip becomes pending.
    pub async fn update_trip<F>(&self, trip_id: &Uuid, mutator: F) -> Result<TripRecord>
    where
        F: FnOnce(&mut TripPayload),
    {
        let mut trip = self
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| StoreError::not_found("trip_logs", trip_id))?;

        let next_state = trip.sync_state.mark_pending()?;
        mutator(&mut trip.payload);
        let updated_at = next_timestamp(Some(trip.updated_at));

        let result = sqlx::query(
            "UPDATE trip_logs SET payload = ?, updated_at = ?, revision = revision + 1, sync_state = ?
             WHERE trip_id = ? AND revision = ?",
        )
        .bind(codec::encode(&trip.payload)?)
        .bind(updated_at)
        .bind(next_state.as_str())
        .bind(trip_id.to_string())
        .bind(trip.revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("trip_logs", trip_id));
        }

        trip.sync_state = next_state;
        trip.updated_at = updated_at;
        trip.revision += 1;
        Ok(trip)
    }

    /// Attach a file to an existing trip. Counts as a local edit.
    pub async fn add_trip_attachment(&self, trip_id: &Uuid, attachment: &TripAttachment) -> Result<()> {
        let (state, updated_at): (String, i64) =
            sqlx::query_as("SELECT sync_state, updated_at FROM trip_logs WHERE trip_id = ?")
                .bind(trip_id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::not_found("trip_logs", trip_id))?;
        let next_state = state.parse::<SyncState>().map_err(corrupt_row)?.mark_pending()?;

        let mut tx = self.pool.begin().await?;
        Self::insert_attachment(&mut tx, trip_id, attachment).await?;
        sqlx::query(
            "UPDATE trip_logs SET updated_at = ?, revision = revision + 1, sync_state = ?
             WHERE trip_id = ?",
        )
        .bind(next_timestamp(Some(updated_at)))
        .bind(next_state.as_str())
        .bind(trip_id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Tombstone a trip. It is removed once the delete is acknowledged.
    pub async fn mark_trip_deleted(&self, trip_id: &Uuid) -> Result<()> {
        let (updated_at,): (i64,) = sqlx::query_as("SELECT updated_at FROM trip_logs WHERE trip_id = ?")
            .bind(trip_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("trip_logs", trip_id))?;

        sqlx::query(
            "UPDATE trip_logs SET sync_state = 'deleted', updated_at = ?, revision = revision + 1
             WHERE trip_id = ?",
        )
        .bind(next_timestamp(Some(updated_at)))
        .bind(trip_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Trips waiting for upload or delete, oldest trip first
    pub async fn trips_needing_upload(&self) -> Result<Vec<TripRecord>> {
        self.load_trips(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip_logs
             WHERE sync_state IN ('pending', 'deleted')
             ORDER BY timestamp ASC, trip_id ASC"
        ), None)
        .await
    }

    /// Live trips with `timestamp >= since`, newest first
    pub async fn trips_since(&self, since: Millis) -> Result<Vec<TripRecord>> {
        self.load_trips(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip_logs
             WHERE sync_state != 'deleted' AND timestamp >= ?
             ORDER BY timestamp DESC, trip_id ASC"
        ), Some(since))
        .await
    }

    async fn load_trips(&self, sql: &str, bound: Option<Millis>) -> Result<Vec<TripRecord>> {
        let mut query = sqlx::query_as::<_, TripRow>(sql);
        if let Some(value) = bound {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut trips = Vec::with_capacity(rows.len());
        for row in rows {
            let trip_id = row.trip_id.clone();
            let attachments = match Uuid::parse_str(&trip_id) {
                Ok(id) => self.load_attachments(&id).await?,
                Err(_) => Vec::new(),
            };
            match row.decode(attachments) {
                Ok(trip) => trips.push(trip),
                Err(error) => tracing::warn!(%trip_id, %error, "skipping corrupt trip"),
            }
        }
        Ok(trips)
    }

    /// Apply an upload or delete acknowledgment for a trip sent at `sent_revision`
    pub async fn acknowledge_trip(
        &self,
        trip_id: &Uuid,
        server_id: Option<&str>,
        sent_revision: i64,
    ) -> Result<AckApplied> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, i64)> =
            sqlx::query_as("SELECT sync_state, revision FROM trip_logs WHERE trip_id = ?")
                .bind(trip_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let Some((state, revision)) = current else {
            return Ok(AckApplied::Missing);
        };
        let state = state.parse::<SyncState>().map_err(corrupt_row)?;

        let applied = if state == SyncState::Synced {
            AckApplied::Synced
        } else if revision != sent_revision {
            if let Some(server_id) = server_id {
                sqlx::query("UPDATE trip_logs SET server_id = ? WHERE trip_id = ?")
                    .bind(server_id)
                    .bind(trip_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
            AckApplied::Superseded
        } else {
            match state.mark_synced()? {
                AckOutcome::Synced => {
                    sqlx::query(
                        "UPDATE trip_logs SET sync_state = 'synced', server_id = COALESCE(?, server_id)
                         WHERE trip_id = ?",
                    )
                    .bind(server_id)
                    .bind(trip_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                    AckApplied::Synced
                }
                AckOutcome::Purge => {
                    // Attachments go with the row (ON DELETE CASCADE)
                    sqlx::query("DELETE FROM trip_logs WHERE trip_id = ?")
                        .bind(trip_id.to_string())
                        .execute(&mut *tx)
                        .await?;
                    AckApplied::Purged
                }
            }
        };

        tx.commit().await?;
        Ok(applied)
    }

    /// Remove synced trips older than `cutoff`. Unsynced trips are never pruned.
    pub async fn prune_synced_trips(&self, cutoff: Millis) -> Result<u64> {
        let result = sqlx::query("DELETE FROM trip_logs WHERE sync_state = 'synced' AND timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! # Trip Queue
//!
//! Store-backed queue of trip logs recorded while offline. Every operation is
//! written to the local database first; [`TripUploader`](super::uploader::TripUploader)
//! replays the queue when connectivity returns.
//!
//! ## Features
//!
//! - **Persistent Queue**: trips and attachments survive app restarts
//! - **Tombstones**: deleting a trip marks it until the server confirms
//! - **Retention Window**: offline views show the last 14 days by default
//! - **Cleanup**: synced trips older than the window are pruned
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tripsync::client::local_db::LocalDatabase;
//! use tripsync::client::offline::TripQueue;
//! use tripsync::client::local_db::trips::TripPayload;
//!
//! # async fn example(db: LocalDatabase) -> Result<(), tripsync::shared::StoreError> {
//! let queue = TripQueue::new(db, 14);
//! let trip = queue
//!     .record_trip(TripPayload { date: "2024-05-01".into(), ..Default::default() }, Vec::new())
//!     .await?;
//! let recent = queue.offline_trips().await?;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::trips::{TripAttachment, TripPayload, TripRecord};
use crate::client::local_db::{now_millis, LocalDatabase, Result};
use crate::shared::config::AppConfig;
use crate::shared::error::StoreError;
use crate::shared::protocol::Millis;
use uuid::Uuid;

const DAY_MILLIS: Millis = 24 * 60 * 60 * 1000;

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: u64,
    /// Trips waiting for upload or delete acknowledgment
    pub pending: u64,
}

/// Offline trip queue
#[derive(Debug, Clone)]
pub struct TripQueue {
    db: LocalDatabase,
    retention_days: i64,
}

impl TripQueue {
    pub fn new(db: LocalDatabase, retention_days: i64) -> Self {
        Self { db, retention_days }
    }

    pub fn from_config(db: LocalDatabase, config: &AppConfig) -> Self {
        Self::new(db, config.retention_days)
    }

    /// Record a trip that happened now
    pub async fn record_trip(&self, payload: TripPayload, attachments: Vec<TripAttachment>) -> Result<TripRecord> {
        self.record_trip_at(payload, now_millis(), attachments).await
    }

    /// Record a trip with an explicit trip time
    pub async fn record_trip_at(
        &self,
        payload: TripPayload,
        timestamp: Millis,
        attachments: Vec<TripAttachment>,
    ) -> Result<TripRecord> {
        let trip_id = self.db.insert_trip(&payload, timestamp, &attachments).await?;
        tracing::info!(%trip_id, "trip queued");
        self.require(&trip_id).await
    }

    pub async fn get_trip(&self, trip_id: &Uuid) -> Result<Option<TripRecord>> {
        self.db.get_trip(trip_id).await
    }

    /// Edit a queued or synced trip
    pub async fn edit_trip<F>(&self, trip_id: &Uuid, mutator: F) -> Result<TripRecord>
    where
        F: FnOnce(&mut TripPayload),
    {
        self.db.update_trip(trip_id, mutator).await
    }

    pub async fn add_attachment(&self, trip_id: &Uuid, attachment: TripAttachment) -> Result<TripRecord> {
        self.db.add_trip_attachment(trip_id, &attachment).await?;
        self.require(trip_id).await
    }

    /// Tombstone a trip; the delete is replayed on the next drain
    pub async fn delete_trip(&self, trip_id: &Uuid) -> Result<()> {
        self.db.mark_trip_deleted(trip_id).await?;
        tracing::info!(%trip_id, "trip marked deleted");
        Ok(())
    }

    /// Live trips inside the retention window, newest first
    pub async fn offline_trips(&self) -> Result<Vec<TripRecord>> {
        self.offline_trips_at(now_millis()).await
    }

    /// [`offline_trips`](Self::offline_trips) relative to an explicit "now"
    pub async fn offline_trips_at(&self, now: Millis) -> Result<Vec<TripRecord>> {
        self.db.trips_since(self.retention_cutoff(now)).await
    }

    /// Trips the uploader still has to send
    pub async fn pending_trips(&self) -> Result<Vec<TripRecord>> {
        self.db.trips_needing_upload().await
    }

    /// Remove synced trips older than the retention window
    pub async fn prune_expired(&self) -> Result<u64> {
        self.prune_expired_at(now_millis()).await
    }

    pub async fn prune_expired_at(&self, now: Millis) -> Result<u64> {
        let pruned = self.db.prune_synced_trips(self.retention_cutoff(now)).await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned expired trips");
        }
        Ok(pruned)
    }

    /// Oldest trip time still inside the window
    pub fn retention_cutoff(&self, now: Millis) -> Millis {
        now - self.retention_days * DAY_MILLIS
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let stats = self.db.get_stats().await?;
        Ok(QueueStats {
            total: stats.trip_count,
            pending: stats.pending_trips,
        })
    }

    async fn require(&self, trip_id: &Uuid) -> Result<TripRecord> {
        self.db
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| StoreError::not_found("trip_logs", trip_id))
    }
}

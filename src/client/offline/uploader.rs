//! # Trip Uploader
//!
//! Replays the trip queue against the multipart trip endpoints. Each trip is
//! handled on its own: a failure is logged and recorded in the report, and the
//! drain moves on. A rejected credential stops the drain since every later
//! call would fail the same way.

use crate::client::local_db::records::AckApplied;
use crate::client::local_db::trips::TripRecord;
use crate::client::local_db::LocalDatabase;
use crate::client::remote::TripTransport;
use crate::client::sync::sync_state::SyncState;
use crate::shared::error::{RemoteError, StoreError, SyncError};
use uuid::Uuid;

/// Outcome of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Created or updated on the server and now synced
    pub uploaded: usize,
    /// Deletes acknowledged and purged
    pub deleted: usize,
    /// Sent, but edited meanwhile; resent next drain
    pub superseded: usize,
    /// Trips whose call failed, with the reason
    pub failed: Vec<(Uuid, String)>,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.uploaded + self.deleted + self.superseded + self.failed.len()
    }
}

enum TripFailure {
    Remote(RemoteError),
    Store(StoreError),
}

impl From<RemoteError> for TripFailure {
    fn from(err: RemoteError) -> Self {
        TripFailure::Remote(err)
    }
}

impl From<StoreError> for TripFailure {
    fn from(err: StoreError) -> Self {
        TripFailure::Store(err)
    }
}

/// Drains pending and deleted trips through a [`TripTransport`]
pub struct TripUploader<'a, T: TripTransport + ?Sized> {
    db: &'a LocalDatabase,
    transport: &'a T,
}

impl<'a, T: TripTransport + ?Sized> TripUploader<'a, T> {
    pub fn new(db: &'a LocalDatabase, transport: &'a T) -> Self {
        Self { db, transport }
    }

    /// Send every pending trip once.
    ///
    /// Returns `SyncError::ReauthRequired` if the server rejects the credential.
    pub async fn drain(&self) -> Result<DrainReport, SyncError> {
        let trips = self.db.trips_needing_upload().await?;
        let mut report = DrainReport::default();
        if trips.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = trips.len(), "draining trip queue");

        for trip in trips {
            match self.upload(&trip).await {
                Ok(applied) => match (trip.sync_state, applied) {
                    (_, AckApplied::Superseded) => report.superseded += 1,
                    (SyncState::Deleted, _) => report.deleted += 1,
                    _ => report.uploaded += 1,
                },
                Err(TripFailure::Remote(RemoteError::Auth(message))) => {
                    tracing::error!(trip_id = %trip.trip_id, "credential rejected, stopping trip drain");
                    return Err(SyncError::ReauthRequired(message));
                }
                Err(TripFailure::Remote(error)) => {
                    tracing::warn!(trip_id = %trip.trip_id, %error, "trip upload failed");
                    report.failed.push((trip.trip_id, error.to_string()));
                }
                Err(TripFailure::Store(error)) => {
                    // Sent but not recorded; the trip is replayed next drain
                    tracing::warn!(trip_id = %trip.trip_id, %error, "failed to record trip upload");
                    report.failed.push((trip.trip_id, error.to_string()));
                }
            }
        }

        tracing::info!(
            uploaded = report.uploaded,
            deleted = report.deleted,
            failed = report.failed.len(),
            "trip drain finished"
        );
        Ok(report)
    }

    async fn upload(&self, trip: &TripRecord) -> Result<AckApplied, TripFailure> {
        let trip_id = &trip.trip_id;
        match (trip.sync_state, trip.server_id.as_deref()) {
            // A create may have landed even if its response was lost, so
            // every tombstone is replayed
            (SyncState::Deleted, _) => {
                self.transport.delete_trip(trip_id).await?;
                tracing::debug!(%trip_id, "trip deleted on server");
                Ok(self.db.acknowledge_trip(trip_id, None, trip.revision).await?)
            }
            (_, Some(server_id)) => {
                let returned = self.transport.update_trip(server_id, trip).await?;
                Ok(self.db.acknowledge_trip(trip_id, Some(&returned), trip.revision).await?)
            }
            (_, None) => {
                let server_id = self.transport.create_trip(trip).await?;
                tracing::debug!(%trip_id, %server_id, "trip created on server");
                Ok(self.db.acknowledge_trip(trip_id, Some(&server_id), trip.revision).await?)
            }
        }
    }
}

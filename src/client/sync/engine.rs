//! # Sync Engine
//!
//! Pull and push for the generic `records` table, written against
//! [`SyncTransport`] so the same code runs over HTTP and over test doubles.
//!
//! - **Pull** reads the cursor, fetches the changes since then and applies them
//!   together with the new cursor in one store transaction. Any failure leaves
//!   the cursor where it was.
//! - **Push** sends every pending and deleted record as one changeset and
//!   applies the per-record acknowledgments. Rejected and unmentioned records
//!   keep their state for the next cycle, as do records whose ack fails to
//!   apply locally.

use crate::client::local_db::records::{to_wire, AckApplied, ApplyReport};
use crate::client::local_db::LocalDatabase;
use crate::client::remote::SyncTransport;
use crate::client::sync::sync_state::SyncState;
use crate::shared::error::SyncError;
use crate::shared::protocol::{PushAck, PushRequest, TableChanges};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-record result of one push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records included in the request
    pub sent: usize,
    pub synced: usize,
    /// Acknowledged tombstones removed from the store
    pub purged: usize,
    /// Tombstones of records the server never saw, removed without a call
    pub purged_local: usize,
    /// Acknowledged, but edited while in flight; pushed again next cycle
    pub superseded: usize,
    /// Rejected by the server, with the reason
    pub rejected: Vec<(Uuid, String)>,
    /// Acknowledged, but the local store could not apply the ack
    pub failed: Vec<(Uuid, String)>,
    /// Sent but neither acknowledged nor rejected
    pub unacknowledged: usize,
}

/// A record as it was when the push was built
#[derive(Debug, Clone, Copy)]
struct InFlight {
    local_id: Uuid,
    revision: i64,
}

/// Fetch and apply remote changes since the stored cursor
pub async fn pull<T>(db: &LocalDatabase, transport: &T) -> Result<ApplyReport, SyncError>
where
    T: SyncTransport + ?Sized,
{
    let since = db.last_pulled_at().await?;
    tracing::debug!(?since, "pulling changes");

    let response = transport.pull(since).await?;
    let report = db.apply_remote_changes(&response).await?;

    tracing::info!(
        cursor = response.timestamp,
        inserted = report.inserted,
        updated = report.updated,
        deleted = report.deleted,
        kept_local = report.conflicts_kept_local,
        "pull applied"
    );
    Ok(report)
}

/// Push every pending and deleted record
pub async fn push<T>(db: &LocalDatabase, transport: &T) -> Result<PushOutcome, SyncError>
where
    T: SyncTransport + ?Sized,
{
    let mut outcome = PushOutcome::default();
    let mut changes = TableChanges::new();
    let mut by_local_id: HashMap<String, InFlight> = HashMap::new();
    let mut by_server_id: HashMap<String, InFlight> = HashMap::new();

    for record in db.pending_changes().await? {
        let in_flight = InFlight {
            local_id: record.local_id,
            revision: record.revision,
        };

        match (record.sync_state, record.server_id.as_deref()) {
            (SyncState::Deleted, None) => {
                if db.purge_unsynced_tombstone(&record.local_id).await? {
                    outcome.purged_local += 1;
                }
                continue;
            }
            (SyncState::Deleted, Some(server_id)) => {
                changes
                    .entry(record.table.clone())
                    .or_default()
                    .deleted
                    .push(server_id.to_string());
            }
            (_, None) => {
                changes.entry(record.table.clone()).or_default().created.push(to_wire(&record));
            }
            (_, Some(_)) => {
                changes.entry(record.table.clone()).or_default().updated.push(to_wire(&record));
            }
        }

        if let Some(server_id) = &record.server_id {
            by_server_id.insert(server_id.clone(), in_flight);
        }
        by_local_id.insert(record.local_id.to_string(), in_flight);
        outcome.sent += 1;
    }

    if outcome.sent == 0 {
        tracing::debug!("nothing to push");
        return Ok(outcome);
    }

    tracing::info!(records = outcome.sent, tables = changes.len(), "pushing changes");
    let response = transport.push(&PushRequest { changes }).await?;

    let mut answered = 0usize;
    for ack in &response.acks {
        let Some(in_flight) = resolve(&by_local_id, &by_server_id, ack) else {
            tracing::warn!(?ack, "acknowledgment for a record that was not pushed");
            continue;
        };
        answered += 1;

        match db
            .acknowledge_record(&in_flight.local_id, ack.id.as_deref(), in_flight.revision)
            .await
        {
            Ok(AckApplied::Synced) => outcome.synced += 1,
            Ok(AckApplied::Purged) => outcome.purged += 1,
            Ok(AckApplied::Superseded) => {
                tracing::debug!(local_id = %in_flight.local_id, "record changed during push");
                outcome.superseded += 1;
            }
            Ok(AckApplied::Missing) => {
                tracing::debug!(local_id = %in_flight.local_id, "acknowledged record no longer exists");
            }
            Err(error) => {
                // The record stays pending and the next push retries it
                tracing::warn!(local_id = %in_flight.local_id, %error, "failed to apply acknowledgment");
                outcome.failed.push((in_flight.local_id, error.to_string()));
            }
        }
    }

    for rejection in &response.rejected {
        let found = rejection
            .local_id
            .as_ref()
            .and_then(|id| by_local_id.get(id))
            .or_else(|| rejection.id.as_ref().and_then(|id| by_server_id.get(id)));
        let Some(in_flight) = found else {
            tracing::warn!(?rejection, "rejection for a record that was not pushed");
            continue;
        };
        answered += 1;
        tracing::warn!(local_id = %in_flight.local_id, reason = %rejection.reason, "record rejected by server");
        outcome.rejected.push((in_flight.local_id, rejection.reason.clone()));
    }

    outcome.unacknowledged = outcome.sent.saturating_sub(answered);
    tracing::info!(
        synced = outcome.synced,
        purged = outcome.purged,
        rejected = outcome.rejected.len(),
        failed = outcome.failed.len(),
        unacknowledged = outcome.unacknowledged,
        "push applied"
    );
    Ok(outcome)
}

fn resolve(
    by_local_id: &HashMap<String, InFlight>,
    by_server_id: &HashMap<String, InFlight>,
    ack: &PushAck,
) -> Option<InFlight> {
    ack.local_id
        .as_ref()
        .and_then(|id| by_local_id.get(id))
        .or_else(|| ack.id.as_ref().and_then(|id| by_server_id.get(id)))
        .copied()
}

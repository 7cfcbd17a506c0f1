//! Trip queue and uploader through the coordinator

use crate::common::{coordinator, file_db, memory_db, FakeBackend};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use tripsync::client::local_db::{now_millis, AttachmentKind, TripAttachment, TripPayload};
use tripsync::client::offline::TripQueue;
use tripsync::client::sync::{CycleReport, SyncState, TriggerOutcome};

const DAY: i64 = 24 * 60 * 60 * 1000;

fn payload(notes: &str) -> TripPayload {
    TripPayload {
        date: "2024-05-01".into(),
        notes: Some(notes.into()),
        ..Default::default()
    }
}

fn ran(outcome: TriggerOutcome) -> CycleReport {
    match outcome {
        TriggerOutcome::Ran(report) => report,
        TriggerOutcome::Coalesced => panic!("expected the cycle to run"),
    }
}

#[tokio::test]
async fn test_trips_recorded_offline_upload_on_reconnect() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let coordinator = coordinator(&db, &backend);
    let queue = TripQueue::new(db.clone(), 14);

    let photo = TripAttachment::new(AttachmentKind::BeforePhoto, "start.jpg", "image/jpeg", vec![1, 2, 3]);
    let trip = queue.record_trip(payload("depot run"), vec![photo]).await.unwrap();
    assert_eq!(trip.sync_state, SyncState::Pending);

    let report = ran(coordinator.trigger().await);
    assert!(!report.is_complete());
    assert_eq!(queue.pending_trips().await.unwrap().len(), 1);

    backend.set_online(true);
    let report = ran(coordinator.trigger().await);
    assert!(report.is_complete(), "{:?}", report.failure);
    assert_eq!(report.trips.map(|t| t.uploaded), Some(1));

    let stored = queue.get_trip(&trip.trip_id).await.unwrap().unwrap();
    assert_eq!(stored.sync_state, SyncState::Synced);
    let server_id = stored.server_id.clone().unwrap();

    let state = backend.state();
    let uploaded = &state.trips[&server_id];
    assert_eq!(uploaded.trip_id, trip.trip_id);
    assert_eq!(uploaded.attachments.len(), 1);
    assert_eq!(uploaded.attachments[0].file_name, "start.jpg");
}

#[tokio::test]
async fn test_edit_after_sync_sends_update() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let coordinator = coordinator(&db, &backend);
    let queue = TripQueue::new(db.clone(), 14);

    let trip = queue.record_trip(payload("first"), Vec::new()).await.unwrap();
    ran(coordinator.trigger().await);
    let server_id = queue.get_trip(&trip.trip_id).await.unwrap().unwrap().server_id.unwrap();

    let edited = queue
        .edit_trip(&trip.trip_id, |p| p.notes = Some("second".into()))
        .await
        .unwrap();
    assert_eq!(edited.sync_state, SyncState::Pending);
    assert_eq!(edited.server_id.as_deref(), Some(server_id.as_str()));

    let report = ran(coordinator.trigger().await);
    assert_eq!(report.trips.map(|t| t.uploaded), Some(1));
    assert_eq!(backend.state().trips.len(), 1);
    assert_eq!(backend.state().trips[&server_id].payload.notes.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_delete_after_lost_create_response_reaches_server() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let coordinator = coordinator(&db, &backend);
    let queue = TripQueue::new(db.clone(), 14);

    let trip = queue.record_trip(payload("mistake"), Vec::new()).await.unwrap();
    // The create landed but its response never came back
    backend.state().trips.insert("trip-lost".into(), trip.clone());
    queue.delete_trip(&trip.trip_id).await.unwrap();

    let report = ran(coordinator.trigger().await);
    let drained = report.trips.unwrap();
    assert_eq!(drained.deleted, 1);
    assert_eq!(drained.uploaded, 0);

    assert!(queue.get_trip(&trip.trip_id).await.unwrap().is_none());
    assert!(backend.state().trips.is_empty());
    assert_eq!(backend.state().deleted_trips, vec![trip.trip_id]);
}

#[tokio::test]
async fn test_synced_delete_is_replayed() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let coordinator = coordinator(&db, &backend);
    let queue = TripQueue::new(db.clone(), 14);

    let trip = queue.record_trip(payload("done"), Vec::new()).await.unwrap();
    ran(coordinator.trigger().await);
    let server_id = queue.get_trip(&trip.trip_id).await.unwrap().unwrap().server_id.unwrap();

    backend.set_online(false);
    queue.delete_trip(&trip.trip_id).await.unwrap();
    assert!(queue.offline_trips().await.unwrap().is_empty());
    ran(coordinator.trigger().await);
    assert_eq!(queue.pending_trips().await.unwrap().len(), 1);

    backend.set_online(true);
    let report = ran(coordinator.trigger().await);
    assert_eq!(report.trips.map(|t| t.deleted), Some(1));
    assert_eq!(backend.state().deleted_trips, vec![trip.trip_id]);
    assert!(!backend.state().trips.contains_key(&server_id));
    assert!(queue.get_trip(&trip.trip_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_trip_uploaded_then_pruned() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let coordinator = coordinator(&db, &backend);
    let queue = TripQueue::new(db.clone(), 14);
    let now = now_millis();

    let old = queue
        .record_trip_at(payload("three weeks ago"), now - 21 * DAY, Vec::new())
        .await
        .unwrap();
    let recent = queue
        .record_trip_at(payload("yesterday"), now - DAY, Vec::new())
        .await
        .unwrap();

    // Not synced yet, so the old trip is hidden from the list but kept
    let visible = queue.offline_trips().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].trip_id, recent.trip_id);
    assert_eq!(queue.prune_expired().await.unwrap(), 0);

    let report = ran(coordinator.trigger().await);
    assert_eq!(report.trips.map(|t| t.uploaded), Some(2));
    assert_eq!(report.trips_pruned, 1);

    assert!(queue.get_trip(&old.trip_id).await.unwrap().is_none());
    assert!(queue.get_trip(&recent.trip_id).await.unwrap().is_some());
    assert_eq!(backend.state().trips.len(), 2);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let trip_id = {
        let db = file_db(&dir).await;
        let queue = TripQueue::new(db.clone(), 14);
        let trip = queue.record_trip(payload("before restart"), Vec::new()).await.unwrap();
        queue
            .add_attachment(
                &trip.trip_id,
                TripAttachment::new(AttachmentKind::Document, "receipt.pdf", "application/pdf", b"%PDF".to_vec()),
            )
            .await
            .unwrap();
        db.close().await;
        trip.trip_id
    };

    let db = file_db(&dir).await;
    let queue = TripQueue::new(db, 14);
    let pending = queue.pending_trips().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].trip_id, trip_id);
    assert_eq!(pending[0].attachments[0].data, b"%PDF".to_vec());

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);
}

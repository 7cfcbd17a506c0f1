//! Sync cycle tests against the in-process backend

use crate::common::{coordinator, file_db, memory_db, FakeBackend};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tripsync::client::local_db::{ApplyReport, Predicate, RecordHandle};
use tripsync::client::sync::{engine, AutoSync, CycleFailure, NetworkMonitor, ReachabilityProbe, SyncState, TriggerOutcome};
use tripsync::shared::protocol::{TableChangeSet, WireRecord};

fn ran(outcome: TriggerOutcome) -> tripsync::client::sync::CycleReport {
    match outcome {
        TriggerOutcome::Ran(report) => report,
        TriggerOutcome::Coalesced => panic!("expected the cycle to run"),
    }
}

fn wire(id: &str, updated_at: i64, fields: Value) -> WireRecord {
    WireRecord {
        id: Some(id.to_string()),
        updated_at: Some(updated_at),
        fields: fields.as_object().cloned().unwrap_or_default(),
        ..Default::default()
    }
}

async fn state_of(db: &tripsync::client::LocalDatabase, handle: &RecordHandle) -> SyncState {
    db.get::<Value>(handle).await.unwrap().unwrap().sync_state
}

#[tokio::test]
async fn test_offline_round_trip() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let coordinator = coordinator(&db, &backend);

    let first = db.create("vehicles", json!({ "plate": "AB-123" })).await.unwrap();
    let second = db.create("vehicles", json!({ "plate": "CD-456" })).await.unwrap();

    let report = ran(coordinator.trigger().await);
    assert!(matches!(report.failure, Some(CycleFailure::Offline { phase: "pull", .. })));
    assert_eq!(state_of(&db, &first).await, SyncState::Pending);
    assert_eq!(coordinator.status().pending_records, 2);

    backend.set_online(true);
    let report = ran(coordinator.trigger().await);
    assert!(report.is_complete());
    assert_eq!(report.pushed.as_ref().map(|p| p.synced), Some(2));

    assert_eq!(state_of(&db, &first).await, SyncState::Synced);
    assert_eq!(state_of(&db, &second).await, SyncState::Synced);
    assert_eq!(backend.state().records["vehicles"].len(), 2);
    assert_eq!(coordinator.status().pending_records, 0);
}

#[tokio::test]
async fn test_partial_push_keeps_unanswered_record_pending() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let coordinator = coordinator(&db, &backend);

    let first = db.create("vehicles", json!({ "plate": "1" })).await.unwrap();
    let second = db.create("vehicles", json!({ "plate": "2" })).await.unwrap();
    let third = db.create("vehicles", json!({ "plate": "3" })).await.unwrap();
    backend
        .state()
        .unanswered_local_ids
        .insert(second.local_id.to_string());

    let report = ran(coordinator.trigger().await);
    let pushed = report.pushed.unwrap();
    assert_eq!(pushed.synced, 2);
    assert_eq!(pushed.unacknowledged, 1);

    assert_eq!(state_of(&db, &first).await, SyncState::Synced);
    assert_eq!(state_of(&db, &second).await, SyncState::Pending);
    assert_eq!(state_of(&db, &third).await, SyncState::Synced);

    backend.state().unanswered_local_ids.clear();
    ran(coordinator.trigger().await);
    assert_eq!(state_of(&db, &second).await, SyncState::Synced);
    let last_push = backend.state().pushes.last().cloned().unwrap();
    assert_eq!(last_push.changes["vehicles"].created.len(), 1);
}

#[tokio::test]
async fn test_pull_is_idempotent() {
    let db = memory_db().await;
    let backend = FakeBackend::online();
    {
        let mut state = backend.state();
        state.pull_changes.insert(
            "vehicles".into(),
            TableChangeSet {
                created: vec![
                    wire("srv-1", 10, json!({ "plate": "AB-123" })),
                    wire("srv-2", 11, json!({ "plate": "CD-456" })),
                ],
                ..Default::default()
            },
        );
        state.pull_timestamp = 100;
    }

    let first = engine::pull(&db, &backend).await.unwrap();
    let second = engine::pull(&db, &backend).await.unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted + second.updated + second.deleted, 0);

    let rows = db.query::<Value>("vehicles", &Predicate::All).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.sync_state == SyncState::Synced && r.revision == 0));
    assert_eq!(db.last_pulled_at().await.unwrap(), Some(100));
    assert_eq!(backend.state().pull_cursors, vec![None, Some(100)]);

    // Nothing new on the server: the cursor stays put
    let third = engine::pull(&db, &backend).await.unwrap();
    assert_eq!(third, ApplyReport::default());
    assert_eq!(db.last_pulled_at().await.unwrap(), Some(100));
}

#[tokio::test]
async fn test_tombstone_survives_restart_until_acknowledged() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FakeBackend::online());

    let handle = {
        let db = file_db(&dir).await;
        let handle = db.create("vehicles", json!({ "plate": "AB-123" })).await.unwrap();
        ran(coordinator(&db, &backend).trigger().await);
        assert_eq!(backend.state().records["vehicles"].len(), 1);

        backend.set_online(false);
        db.mark_deleted(&handle).await.unwrap();
        let report = ran(coordinator(&db, &backend).trigger().await);
        assert!(!report.is_complete());
        db.close().await;
        handle
    };

    let db = file_db(&dir).await;
    let tombstones = db
        .query::<Value>("vehicles", &Predicate::state(SyncState::Deleted))
        .await
        .unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].local_id, handle.local_id);

    backend.set_online(true);
    let report = ran(coordinator(&db, &backend).trigger().await);
    assert_eq!(report.pushed.map(|p| p.purged), Some(1));
    assert!(db.get::<Value>(&handle).await.unwrap().is_none());
    assert!(backend.state().records["vehicles"].is_empty());
}

#[tokio::test]
async fn test_rejected_token_stops_cycle() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    backend.state().reject_auth = true;
    let coordinator = coordinator(&db, &backend);
    let handle = db.create("vehicles", json!({ "plate": "AB-123" })).await.unwrap();

    let report = ran(coordinator.trigger().await);
    assert!(matches!(report.failure, Some(CycleFailure::ReauthRequired(_))));
    assert!(coordinator.status().reauth_required);
    assert_eq!(state_of(&db, &handle).await, SyncState::Pending);
    assert!(backend.state().pushes.is_empty());
}

#[tokio::test]
async fn test_reconnect_triggers_one_cycle() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let coordinator = coordinator(&db, &backend);
    let monitor = Arc::new(NetworkMonitor::new());
    let _auto = AutoSync::spawn(Arc::clone(&coordinator), monitor.subscribe());
    db.create("vehicles", json!({ "plate": "AB-123" })).await.unwrap();

    assert_eq!(ReachabilityProbe::probe_once(&*backend, &monitor).await, None);

    backend.set_online(true);
    let mut status = coordinator.subscribe();
    ReachabilityProbe::probe_once(&*backend, &monitor).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while status.borrow_and_update().last_report.is_none() {
            status.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    ReachabilityProbe::probe_once(&*backend, &monitor).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.cycles_completed(), 1);
    assert_eq!(coordinator.status().pending_records, 0);
}

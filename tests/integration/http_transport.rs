//! HTTP transport tests against a wiremock server

use crate::common::{memory_db, test_config};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tripsync::client::local_db::{AttachmentKind, TripAttachment, TripPayload, TripRecord};
use tripsync::client::location::PositionSample;
use tripsync::client::remote::{
    HealthCheck, HttpTransport, RemoteApi, SyncTransport, TelemetryTransport, TripTransport,
};
use tripsync::client::sync::{SyncCoordinator, SyncState, TriggerOutcome};
use tripsync::client::Config;
use tripsync::shared::error::RemoteError;
use tripsync::shared::protocol::{PushRequest, TableChangeSet, WireRecord};
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    let config = Config::from_app(test_config(&server.uri()));
    config.set_token(Some("secret-token".into()));
    assert_ok!(HttpTransport::new(config))
}

fn trip() -> TripRecord {
    TripRecord {
        trip_id: Uuid::new_v4(),
        server_id: None,
        payload: TripPayload {
            date: "2024-05-01".into(),
            notes: Some("gravel road".into()),
            ..Default::default()
        },
        timestamp: 1_714_550_400_000,
        updated_at: 1,
        revision: 1,
        sync_state: SyncState::Pending,
        attachments: vec![TripAttachment::new(
            AttachmentKind::BeforePhoto,
            "odometer.jpg",
            "image/jpeg",
            vec![0xff, 0xd8, 0xff],
        )],
    }
}

#[tokio::test]
async fn test_pull_sends_cursor_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/pull"))
        .and(query_param("lastPulledAt", "1700"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": { "vehicles": { "created": [{ "id": "srv-1", "plate": "AB-123" }] } },
            "timestamp": 1800
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = assert_ok!(transport(&server).pull(Some(1700)).await);
    assert_eq!(response.timestamp, 1800);
    assert_eq!(response.changes["vehicles"].created[0].id.as_deref(), Some("srv-1"));
}

#[tokio::test]
async fn test_first_pull_has_no_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "changes": {}, "timestamp": 5 })))
        .mount(&server)
        .await;

    assert_ok!(transport(&server).pull(None).await);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(path("/sync/pull"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;
    Mock::given(path("/sync/push"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(path("/trip_statuses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let transport = transport(&server);
    assert_err!(transport.pull(None).await, RemoteError::Auth(_));
    assert_err!(
        transport.push(&PushRequest::default()).await,
        RemoteError::Server { status: 503, .. }
    );
    assert_err!(
        tripsync::client::remote::LookupTransport::trip_statuses(&transport).await,
        RemoteError::Malformed(_)
    );
}

#[tokio::test]
async fn test_unreachable_server_is_offline() {
    let config = Config::from_app(test_config("http://127.0.0.1:9"));
    let transport = assert_ok!(HttpTransport::new(config));
    assert_err!(transport.pull(None).await, RemoteError::Offline(_));
    assert_err!(transport.health().await, RemoteError::Offline(_));
}

#[tokio::test]
async fn test_create_trip_sends_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trip_logs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let trip = trip();
    let id = assert_ok!(transport(&server).create_trip(&trip).await);
    assert_eq!(id, "42");

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"trip_id\""));
    assert!(body.contains(&trip.trip_id.to_string()));
    assert!(body.contains("name=\"notes\""));
    assert!(body.contains("name=\"photos\"; filename=\"odometer.jpg\""));
    assert!(!body.contains("name=\"purpose\""));
}

#[tokio::test]
async fn test_update_and_delete_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/trip_logs/srv-9"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let deleted = trip();
    Mock::given(method("DELETE"))
        .and(path(format!("/trip_logs/{}", deleted.trip_id)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    assert_eq!(assert_ok!(transport.update_trip("srv-9", &trip()).await), "srv-9");
    // Never seen by the server: still acknowledged
    assert_ok!(transport.delete_trip(&deleted.trip_id).await);
}

#[tokio::test]
async fn test_track_location_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/locations/track"))
        .and(body_json(json!({
            "latitude": 52.5,
            "longitude": 13.4,
            "speed": 36.0,
            "accuracy": 8.0
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sample = PositionSample::new(52.5, 13.4).with_speed(36.0).with_accuracy(8.0);
    assert_ok!(transport(&server).track_location(&sample).await);
}

#[tokio::test]
async fn test_health_accepts_any_answer() {
    let server = MockServer::start().await;
    Mock::given(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    assert_ok!(transport(&server).health().await);
}

#[tokio::test]
async fn test_cycle_over_http() {
    let server = MockServer::start().await;
    let mut changes = std::collections::BTreeMap::new();
    changes.insert(
        "vehicles".to_string(),
        TableChangeSet {
            created: vec![WireRecord {
                id: Some("srv-1".into()),
                updated_at: Some(10),
                fields: json!({ "plate": "AB-123" }).as_object().cloned().unwrap(),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    Mock::given(method("GET"))
        .and(path("/sync/pull"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "changes": changes, "timestamp": 900 })))
        .mount(&server)
        .await;
    Mock::given(path("/trip_statuses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "1", "name": "open" }])))
        .mount(&server)
        .await;

    let db = memory_db().await;
    let local = db.create("vehicles", json!({ "plate": "CD-456" })).await.unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/push"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "acks": [{ "local_id": local.local_id.to_string(), "id": "srv-2" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let remote: Arc<dyn RemoteApi> = Arc::new(transport(&server));
    let coordinator = SyncCoordinator::new(db.clone(), remote, &test_config(&server.uri()));
    let TriggerOutcome::Ran(report) = coordinator.trigger().await else {
        panic!("expected the cycle to run");
    };
    assert!(report.is_complete(), "{:?}", report.failure);
    assert!(report.lookups_refreshed);

    let pushed = db.get::<serde_json::Value>(&local).await.unwrap().unwrap();
    assert_eq!(pushed.sync_state, SyncState::Synced);
    assert_eq!(pushed.server_id.as_deref(), Some("srv-2"));
    assert_eq!(db.last_pulled_at().await.unwrap(), Some(900));
}

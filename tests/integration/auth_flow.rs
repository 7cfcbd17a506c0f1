//! Online/offline authentication against the in-process backend

use crate::common::{coordinator, memory_db, test_config, FakeBackend};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tripsync::client::local_db::LocalDatabase;
use tripsync::client::remote::AccountTransport;
use tripsync::client::sync::{SyncState, TriggerOutcome};
use tripsync::client::{AuthMode, AuthService, Config, LocalAuth, SignupForm};
use tripsync::shared::error::AuthError;

fn service(db: &LocalDatabase, backend: &Arc<FakeBackend>) -> (AuthService, Config) {
    let app = test_config("http://localhost");
    let config = Config::from_app(app.clone());
    let transport: Arc<dyn AccountTransport> = backend.clone();
    let local = LocalAuth::from_config(db.clone(), &app);
    (AuthService::new(config.clone(), transport, local), config)
}

#[tokio::test]
async fn test_offline_signup_then_login_then_replay() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let (auth, config) = service(&db, &backend);

    let form = SignupForm::new("driver7", "correct horse").with_email("driver7@example.com");
    let session = auth.signup(form).await.unwrap();
    assert_eq!(session.mode, AuthMode::Offline);
    assert_eq!(session.profile.id, None);
    assert_eq!(config.get_token(), None);

    let session = auth.login("driver7", "correct horse").await.unwrap();
    assert_eq!(session.mode, AuthMode::Offline);
    assert_eq!(session.profile.username, "driver7");
    assert_matches!(
        auth.login("driver7", "wrong horse").await,
        Err(AuthError::InvalidCredentials)
    );

    let credential = db.get_credential("driver7").await.unwrap().unwrap();
    assert_eq!(credential.sync_state, SyncState::Pending);
    assert_ne!(credential.secret_hash, "correct horse");

    backend.set_online(true);
    let TriggerOutcome::Ran(report) = coordinator(&db, &backend).trigger().await else {
        panic!("expected the cycle to run");
    };
    assert_eq!(report.signups.map(|s| s.replayed), Some(1));
    assert_eq!(backend.state().signups.len(), 1);
    assert_eq!(backend.state().signups[0].email.as_deref(), Some("driver7@example.com"));

    let credential = db.get_credential("driver7").await.unwrap().unwrap();
    assert_eq!(credential.sync_state, SyncState::Synced);
    assert!(credential.server_id.is_some());
    assert!(auth.local().pending_signups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_online_login_caches_credential() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let (auth, config) = service(&db, &backend);

    let session = auth.login("driver9", "long secret").await.unwrap();
    assert_eq!(session.mode, AuthMode::Online);
    assert_eq!(config.get_token().as_deref(), Some("token-driver9"));

    auth.logout();
    assert_eq!(config.get_token(), None);

    backend.set_online(false);
    let session = auth.login("driver9", "long secret").await.unwrap();
    assert_eq!(session.mode, AuthMode::Offline);
    assert_eq!(session.profile.id.as_deref(), Some("user-driver9"));
}

#[tokio::test]
async fn test_unknown_user_offline_is_not_cached() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let (auth, _) = service(&db, &backend);

    assert_matches!(
        auth.login("nobody", "whatever123").await,
        Err(AuthError::NotCached(id)) if id == "nobody"
    );
}

#[tokio::test]
async fn test_server_rejection_does_not_fall_back() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::online());
    let (auth, _) = service(&db, &backend);

    auth.login("driver9", "long secret").await.unwrap();
    backend.state().reject_auth = true;

    assert_matches!(
        auth.login("driver9", "long secret").await,
        Err(AuthError::InvalidCredentials)
    );
}

#[tokio::test]
async fn test_duplicate_offline_signup_rejected() {
    let db = memory_db().await;
    let backend = Arc::new(FakeBackend::offline());
    let (auth, _) = service(&db, &backend);

    auth.signup(SignupForm::new("driver7", "correct horse")).await.unwrap();
    assert_matches!(
        auth.signup(SignupForm::new("driver7", "another horse")).await,
        Err(AuthError::Validation { .. })
    );
    assert_eq!(auth.local().pending_signups().await.unwrap().len(), 1);
}

//! tripsync-agent
//!
//! Headless sync agent: opens the local store, watches reachability and runs
//! a sync cycle whenever the backend comes back. Runs until Ctrl-C.
//!
//! Environment:
//!
//! - `TRIPSYNC_CONFIG` - config file (default `<config_dir>/tripsync/config.toml`)
//! - `TRIPSYNC_API_URL`, `TRIPSYNC_DB_PATH` - overrides
//! - `TRIPSYNC_TOKEN` - bearer token for an already signed-in session
//! - `RUST_LOG` - log filter (default `tripsync=info`)

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tripsync::client::local_db::{LocalDatabase, StoreOptions};
use tripsync::client::remote::{HealthCheck, HttpTransport, RemoteApi};
use tripsync::client::sync::{AutoSync, NetworkMonitor, ReachabilityProbe, SyncCoordinator};
use tripsync::client::Config;
use tripsync::shared::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tripsync=info")))
        .init();

    let app = AppConfig::load()?;
    tracing::info!(server = %app.server_url, "starting tripsync agent");

    let db_path = app.db_path.clone().unwrap_or_else(LocalDatabase::get_db_path);
    let db = LocalDatabase::open(StoreOptions::file(&db_path)).await?;
    tracing::info!(path = %db_path.display(), "local store ready");

    let config = Config::from_app(app.clone());
    if let Ok(token) = std::env::var("TRIPSYNC_TOKEN") {
        config.set_token(Some(token));
    }

    let transport = Arc::new(HttpTransport::new(config)?);
    let remote: Arc<dyn RemoteApi> = transport.clone();
    let health: Arc<dyn HealthCheck> = transport;

    let coordinator = Arc::new(SyncCoordinator::new(db.clone(), remote, &app));
    coordinator.refresh_status().await?;

    let monitor = Arc::new(NetworkMonitor::new());
    let auto_sync = AutoSync::spawn(Arc::clone(&coordinator), monitor.subscribe());
    let probe = ReachabilityProbe::spawn(health, Arc::clone(&monitor), app.probe_interval());

    let mut status = coordinator.subscribe();
    let reporter = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            if snapshot.is_syncing {
                continue;
            }
            if snapshot.reauth_required {
                tracing::warn!("backend rejected the token; set TRIPSYNC_TOKEN and restart");
            }
            tracing::info!(
                network = ?snapshot.network_status,
                pending = snapshot.pending_records,
                last_sync = snapshot.last_sync.as_deref().unwrap_or("never"),
                errors = snapshot.errors.len(),
                "sync status"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    probe.stop();
    auto_sync.stop();
    reporter.abort();
    db.close().await;
    Ok(())
}

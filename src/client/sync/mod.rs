//! # Sync Coordinator
//!
//! Runs the sync cycle against the remote authority and starts it whenever
//! connectivity comes back.
//!
//! ## Architecture
//!
//! - **Network Monitor**: two-state connectivity tracker (`network_monitor.rs`)
//! - **Reachability Probe**: health-check poller feeding the monitor (`probe.rs`)
//! - **Engine**: pull and push of the generic records table (`engine.rs`)
//! - **Sync State**: record lifecycle and published status (`sync_state.rs`)
//!
//! ## Cycle
//!
//! Phases run strictly in order, each bounded by the configured phase timeout:
//!
//! 1. pull remote changes
//! 2. push local changes
//! 3. drain the trip queue
//! 4. replay queued signups
//! 5. refresh lookup tables (best effort)
//!
//! A rejected credential stops the cycle and sets `reauth_required` on the
//! published [`SyncStatus`]. A trigger that arrives while a cycle runs is
//! folded into one follow-up run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tripsync::client::sync::{AutoSync, NetworkMonitor, SyncCoordinator};
//! # use tripsync::client::local_db::LocalDatabase;
//! # use tripsync::client::remote::RemoteApi;
//! # use tripsync::shared::AppConfig;
//!
//! # fn example(db: LocalDatabase, transport: Arc<dyn RemoteApi>, config: AppConfig) {
//! let monitor = Arc::new(NetworkMonitor::new());
//! let coordinator = Arc::new(SyncCoordinator::new(db, transport, &config));
//! let _auto = AutoSync::spawn(Arc::clone(&coordinator), monitor.subscribe());
//!
//! let mut status = coordinator.subscribe();
//! # }
//! ```

pub mod engine;
pub mod network_monitor;
pub mod probe;
pub mod sync_state;

pub use engine::PushOutcome;
pub use network_monitor::{NetworkMonitor, NetworkStatus, Transition};
pub use probe::ReachabilityProbe;
pub use sync_state::{AckOutcome, SyncState, SyncStatus};

use crate::client::local_auth::{LocalAuth, ReplayReport};
use crate::client::local_db::lookups::TRIP_STATUSES;
use crate::client::local_db::records::ApplyReport;
use crate::client::local_db::LocalDatabase;
use crate::client::offline::{DrainReport, TripQueue, TripUploader};
use crate::client::remote::{LookupTransport, RemoteApi};
use crate::shared::config::AppConfig;
use crate::shared::error::{StoreError, SyncError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Why a cycle stopped early
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleFailure {
    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    #[error("{phase} failed, retry later: {message}")]
    Offline { phase: &'static str, message: String },

    #[error("{phase} failed on the local store: {message}")]
    Store { phase: &'static str, message: String },

    #[error("{0} timed out")]
    TimedOut(&'static str),
}

impl CycleFailure {
    fn from_sync(phase: &'static str, error: SyncError) -> Self {
        match error {
            SyncError::ReauthRequired(message) => Self::ReauthRequired(message),
            SyncError::Offline(message) => Self::Offline { phase, message },
            SyncError::Store(error) => Self::Store {
                phase,
                message: error.to_string(),
            },
        }
    }
}

/// What one cycle did. Phases that did not run are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub pulled: Option<ApplyReport>,
    pub pushed: Option<PushOutcome>,
    pub trips: Option<DrainReport>,
    pub signups: Option<ReplayReport>,
    pub trips_pruned: u64,
    pub lookups_refreshed: bool,
    pub failure: Option<CycleFailure>,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Cycle failure and per-record failures, for display
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(failure) = &self.failure {
            errors.push(failure.to_string());
        }
        if let Some(pushed) = &self.pushed {
            errors.extend(pushed.rejected.iter().map(|(id, reason)| format!("record {id}: {reason}")));
            errors.extend(pushed.failed.iter().map(|(id, reason)| format!("record {id}: {reason}")));
        }
        if let Some(trips) = &self.trips {
            errors.extend(trips.failed.iter().map(|(id, reason)| format!("trip {id}: {reason}")));
        }
        if let Some(signups) = &self.signups {
            errors.extend(signups.failed.iter().map(|(id, reason)| format!("signup {id}: {reason}")));
        }
        errors
    }
}

/// Result of [`SyncCoordinator::trigger`]
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// This call ran the cycle (plus any follow-up); the last report
    Ran(CycleReport),
    /// A cycle was already running; it will run once more when done
    Coalesced,
}

#[derive(Debug, Default)]
struct CycleFlags {
    running: bool,
    rerun: bool,
}

/// Holds the running flag for one `trigger` call
struct RunningSlot<'a> {
    flags: &'a Mutex<CycleFlags>,
    released: bool,
}

impl RunningSlot<'_> {
    /// Consume a queued rerun, or release the slot
    fn rerun_or_release(&mut self) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.rerun {
            flags.rerun = false;
            return true;
        }
        flags.running = false;
        self.released = true;
        false
    }
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        if !self.released {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            flags.running = false;
            flags.rerun = false;
        }
    }
}

/// Idle/Running sync cycle runner
pub struct SyncCoordinator {
    db: LocalDatabase,
    transport: Arc<dyn RemoteApi>,
    auth: LocalAuth,
    trips: TripQueue,
    phase_timeout: Duration,
    flags: Mutex<CycleFlags>,
    status: watch::Sender<SyncStatus>,
    cycles: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(db: LocalDatabase, transport: Arc<dyn RemoteApi>, config: &AppConfig) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            auth: LocalAuth::from_config(db.clone(), config),
            trips: TripQueue::from_config(db.clone(), config),
            db,
            transport,
            phase_timeout: config.cycle_phase_timeout(),
            flags: Mutex::new(CycleFlags::default()),
            status,
            cycles: AtomicU64::new(0),
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Number of cycles run since creation
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Load last sync time and pending counts from the store
    pub async fn refresh_status(&self) -> Result<(), StoreError> {
        let last_sync = self.db.get_last_sync_time().await?;
        let pending = self.db.get_stats().await?.total_pending() as usize;
        self.status.send_modify(|status| {
            status.last_sync = last_sync;
            status.pending_records = pending;
        });
        Ok(())
    }

    pub fn set_network_status(&self, network: NetworkStatus) {
        self.status.send_if_modified(|status| {
            let changed = status.network_status != network;
            status.network_status = network;
            changed
        });
    }

    /// Clear the re-authentication flag after the user signed in again
    pub fn reauthenticated(&self) {
        self.status.send_if_modified(|status| std::mem::replace(&mut status.reauth_required, false));
    }

    /// Run a sync cycle now, or queue one follow-up if a cycle is running
    pub async fn trigger(&self) -> TriggerOutcome {
        {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            if flags.running {
                flags.rerun = true;
                tracing::debug!("sync cycle already running, coalescing trigger");
                return TriggerOutcome::Coalesced;
            }
            flags.running = true;
        }

        let mut slot = RunningSlot {
            flags: &self.flags,
            released: false,
        };
        loop {
            let report = self.run_cycle().await;
            if !slot.rerun_or_release() {
                return TriggerOutcome::Ran(report);
            }
            tracing::debug!("running coalesced follow-up cycle");
        }
    }

    async fn run_cycle(&self) -> CycleReport {
        self.status.send_modify(|status| status.is_syncing = true);
        tracing::info!("sync cycle started");

        let mut report = CycleReport::default();
        if let Err(failure) = self.run_phases(&mut report).await {
            match &failure {
                CycleFailure::ReauthRequired(_) => tracing::error!(%failure, "sync cycle aborted"),
                _ => tracing::warn!(%failure, "sync cycle aborted"),
            }
            report.failure = Some(failure);
        } else {
            tracing::info!("sync cycle finished");
        }

        self.cycles.fetch_add(1, Ordering::SeqCst);
        self.finish(&report).await;
        report
    }

    async fn run_phases(&self, report: &mut CycleReport) -> Result<(), CycleFailure> {
        let transport = self.transport.as_ref();

        report.pulled = Some(self.phase("pull", engine::pull(&self.db, transport)).await?);
        report.pushed = Some(self.phase("push", engine::push(&self.db, transport)).await?);
        report.trips = Some(
            self.phase("trip upload", TripUploader::new(&self.db, transport).drain())
                .await?,
        );
        report.signups = Some(self.phase("signup replay", self.auth.replay_signups(transport)).await?);

        match self.trips.prune_expired().await {
            Ok(pruned) => report.trips_pruned = pruned,
            Err(error) => tracing::warn!(%error, "trip pruning failed"),
        }
        report.lookups_refreshed = self.refresh_lookups().await;
        Ok(())
    }

    async fn phase<T, F>(&self, name: &'static str, work: F) -> Result<T, CycleFailure>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        match tokio::time::timeout(self.phase_timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(CycleFailure::from_sync(name, error)),
            Err(_) => Err(CycleFailure::TimedOut(name)),
        }
    }

    async fn refresh_lookups(&self) -> bool {
        let fetched = tokio::time::timeout(self.phase_timeout, self.transport.trip_statuses()).await;
        let entries = match fetched {
            Ok(Ok(entries)) => entries,
            Ok(Err(error)) => {
                tracing::debug!(%error, "lookup refresh skipped");
                return false;
            }
            Err(_) => {
                tracing::debug!("lookup refresh timed out");
                return false;
            }
        };

        match self.db.replace_lookups(TRIP_STATUSES, &entries).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "lookup cache write failed");
                false
            }
        }
    }

    async fn finish(&self, report: &CycleReport) {
        let last_sync = if report.is_complete() {
            match self.db.set_last_sync_time().await {
                Ok(time) => Some(time),
                Err(error) => {
                    tracing::warn!(%error, "could not record last sync time");
                    None
                }
            }
        } else {
            None
        };
        let pending = match self.db.get_stats().await {
            Ok(stats) => Some(stats.total_pending() as usize),
            Err(error) => {
                tracing::warn!(%error, "could not count pending records");
                None
            }
        };

        self.status.send_modify(|status| {
            status.is_syncing = false;
            if let Some(time) = last_sync {
                status.last_sync = Some(time);
            }
            if let Some(pending) = pending {
                status.pending_records = pending;
            }
            match &report.failure {
                Some(CycleFailure::ReauthRequired(_)) => status.reauth_required = true,
                None => status.reauth_required = false,
                Some(_) => {}
            }
            status.errors = report.errors();
            status.last_report = Some(report.clone());
        });
    }
}

/// Starts one sync cycle per Offline to Online transition
#[derive(Debug)]
pub struct AutoSync {
    handle: JoinHandle<()>,
}

impl AutoSync {
    pub fn spawn(coordinator: Arc<SyncCoordinator>, mut network: watch::Receiver<NetworkStatus>) -> Self {
        // Read before spawning so a transition right after `spawn` is not missed
        let mut last = *network.borrow_and_update();
        coordinator.set_network_status(last);

        let handle = tokio::spawn(async move {
            while network.changed().await.is_ok() {
                let current = *network.borrow_and_update();
                coordinator.set_network_status(current);
                let went_online = !last.is_online() && current.is_online();
                last = current;

                if !went_online {
                    continue;
                }
                if coordinator.status().reauth_required {
                    tracing::info!("back online, but re-authentication is required; not syncing");
                    continue;
                }

                tracing::info!("back online, starting sync");
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator.trigger().await;
                });
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

//! # Network Monitor
//!
//! Two-state connectivity tracker fed by the platform reachability signal (or
//! by [`ReachabilityProbe`](super::probe::ReachabilityProbe) where there is
//! none). The current status is published through a `watch` channel so the
//! auto-sync task, the location tracker and the UI read the same value.

use tokio::sync::watch;

/// Connectivity as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

/// A change of connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

/// Connectivity state machine. Starts `Offline`.
#[derive(Debug)]
pub struct NetworkMonitor {
    status: watch::Sender<NetworkStatus>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    pub fn new() -> Self {
        let (status, _) = watch::channel(NetworkStatus::Offline);
        Self { status }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }

    /// Record a reachability observation. Returns the transition, if any.
    ///
    /// Repeated reports of the same status do not notify subscribers.
    pub fn report(&self, reachable: bool) -> Option<Transition> {
        let next = if reachable {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };

        let mut transition = None;
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            transition = Some(match next {
                NetworkStatus::Online => Transition::WentOnline,
                NetworkStatus::Offline => Transition::WentOffline,
            });
            *current = next;
            true
        });

        if let Some(transition) = transition {
            tracing::info!(?transition, "network status changed");
        }
        transition
    }
}

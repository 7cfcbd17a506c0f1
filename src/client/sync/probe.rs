//! Periodic reachability probe for platforms without a native signal

use crate::client::remote::HealthCheck;
use crate::client::sync::network_monitor::{NetworkMonitor, Transition};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Polls `GET /health` and feeds the result into a [`NetworkMonitor`]
#[derive(Debug)]
pub struct ReachabilityProbe {
    handle: JoinHandle<()>,
}

impl ReachabilityProbe {
    /// Start probing immediately, then every `interval`
    pub fn spawn(check: Arc<dyn HealthCheck>, monitor: Arc<NetworkMonitor>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                Self::probe_once(check.as_ref(), &monitor).await;
            }
        });
        Self { handle }
    }

    /// Run a single check
    pub async fn probe_once(check: &dyn HealthCheck, monitor: &NetworkMonitor) -> Option<Transition> {
        let reachable = match check.health().await {
            Ok(()) => true,
            Err(error) => {
                tracing::trace!(%error, "health check failed");
                false
            }
        };
        monitor.report(reachable)
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ReachabilityProbe {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

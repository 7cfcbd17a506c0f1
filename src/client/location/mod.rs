//! # Adaptive Location Sampler
//!
//! Watches the platform position source, classifies motion from reported
//! speed, adapts the sampling interval to the motion class and drops samples
//! that did not move far enough to matter.
//!
//! ## Lifecycle
//!
//! `LocationTracker` is owned by the caller: `new → start → stop → drop`.
//! `start` acquires the platform watch and spawns a worker task, which is the
//! only writer of sampler state. `stop` releases the watch; dropping the
//! tracker aborts the worker.
//!
//! ## Outputs
//!
//! - current motion class and last accepted sample through `watch` channels
//! - every accepted sample through a `broadcast` channel
//! - accepted samples pushed best-effort to `POST /locations/track`; while
//!   offline they are dropped and counted
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tripsync::client::location::{ChannelPositionSource, LocationTracker, PositionSample, TrackerSettings};
//! use tripsync::client::sync::network_monitor::NetworkMonitor;
//!
//! # async fn example() -> Result<(), tripsync::shared::LocationError> {
//! let monitor = NetworkMonitor::new();
//! let (source, feed) = ChannelPositionSource::new();
//! let mut tracker = LocationTracker::new(Arc::new(source), monitor.subscribe(), TrackerSettings::default());
//!
//! tracker.start().await?;
//! let mut accepted = tracker.subscribe();
//! feed.push(PositionSample::new(48.137, 11.575).with_speed(32.0));
//! let sample = accepted.recv().await;
//! tracker.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod filter;
pub mod motion;
pub mod source;

pub use filter::{haversine_m, SignificantChangeFilter};
pub use motion::MotionClass;
pub use source::{ChannelPositionSource, PositionFeed, PositionSample, PositionSource};

use crate::client::remote::TelemetryTransport;
use crate::client::sync::network_monitor::NetworkStatus;
use crate::shared::config::{AppConfig, SamplingIntervals};
use crate::shared::error::LocationError;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Sampler settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub intervals: SamplingIntervals,
    /// Significant-change threshold in meters
    pub min_displacement_m: f64,
    /// Push accepted samples to the telemetry endpoint
    pub telemetry_enabled: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TrackerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            intervals: config.sampling.clone(),
            min_displacement_m: config.min_displacement_m,
            telemetry_enabled: config.telemetry_enabled,
        }
    }
}

/// Result of [`LocationTracker::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Sampler counters since the tracker was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub pushed: u64,
    /// Accepted while offline and not sent
    pub dropped_offline: u64,
    pub push_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    pushed: AtomicU64,
    dropped_offline: AtomicU64,
    push_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped_offline: self.dropped_offline.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
        }
    }
}

/// Adaptive position sampler
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    telemetry: Option<Arc<dyn TelemetryTransport>>,
    network: watch::Receiver<NetworkStatus>,
    settings: TrackerSettings,
    motion: Arc<watch::Sender<MotionClass>>,
    last_accepted: Arc<watch::Sender<Option<PositionSample>>>,
    samples: broadcast::Sender<PositionSample>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
}

impl LocationTracker {
    pub fn new(
        source: Arc<dyn PositionSource>,
        network: watch::Receiver<NetworkStatus>,
        settings: TrackerSettings,
    ) -> Self {
        let (motion, _) = watch::channel(MotionClass::Stationary);
        let (last_accepted, _) = watch::channel(None);
        let (samples, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        Self {
            source,
            telemetry: None,
            network,
            settings,
            motion: Arc::new(motion),
            last_accepted: Arc::new(last_accepted),
            samples,
            counters: Arc::default(),
            worker: None,
        }
    }

    /// Push accepted samples through this transport
    pub fn with_telemetry(mut self, transport: Arc<dyn TelemetryTransport>) -> Self {
        self.telemetry = Some(transport);
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Acquire the platform watch and start sampling
    pub async fn start(&mut self) -> Result<StartOutcome, LocationError> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let class = *self.motion.borrow();
        let stream = self.source.watch(class.interval(&self.settings.intervals)).await?;

        let worker = SamplerWorker {
            source: Arc::clone(&self.source),
            telemetry: self.telemetry.clone().filter(|_| self.settings.telemetry_enabled),
            network: self.network.clone(),
            intervals: self.settings.intervals.clone(),
            filter: SignificantChangeFilter::new(self.settings.min_displacement_m),
            motion: Arc::clone(&self.motion),
            last_accepted: Arc::clone(&self.last_accepted),
            samples: self.samples.clone(),
            counters: Arc::clone(&self.counters),
        };
        self.worker = Some(tokio::spawn(worker.run(stream)));

        tracing::info!(?class, "location tracking started");
        Ok(StartOutcome::Started)
    }

    /// Stop sampling and release the platform watch. Returns whether it was running.
    pub async fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        worker.abort();
        self.source.clear_watch().await;
        tracing::info!("location tracking stopped");
        true
    }

    pub fn motion_class(&self) -> MotionClass {
        *self.motion.borrow()
    }

    pub fn watch_motion(&self) -> watch::Receiver<MotionClass> {
        self.motion.subscribe()
    }

    /// Last sample that passed the significant-change filter
    pub fn last_sample(&self) -> Option<PositionSample> {
        self.last_accepted.borrow().clone()
    }

    pub fn watch_last_sample(&self) -> watch::Receiver<Option<PositionSample>> {
        self.last_accepted.subscribe()
    }

    /// Receive every accepted sample from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PositionSample> {
        self.samples.subscribe()
    }

    pub fn stats(&self) -> TrackerStats {
        self.counters.snapshot()
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

struct SamplerWorker {
    source: Arc<dyn PositionSource>,
    telemetry: Option<Arc<dyn TelemetryTransport>>,
    network: watch::Receiver<NetworkStatus>,
    intervals: SamplingIntervals,
    filter: SignificantChangeFilter,
    motion: Arc<watch::Sender<MotionClass>>,
    last_accepted: Arc<watch::Sender<Option<PositionSample>>>,
    samples: broadcast::Sender<PositionSample>,
    counters: Arc<Counters>,
}

impl SamplerWorker {
    async fn run(mut self, mut stream: BoxStream<'static, PositionSample>) {
        while let Some(sample) = stream.next().await {
            self.handle(sample).await;
        }
        tracing::debug!("position stream ended");
    }

    async fn handle(&mut self, sample: PositionSample) {
        Counters::bump(&self.counters.received);

        let class = MotionClass::from_speed(sample.speed_kmh.unwrap_or(0.0));
        if class != *self.motion.borrow() {
            self.motion.send_replace(class);
            let interval = class.interval(&self.intervals);
            tracing::debug!(?class, ?interval, "motion class changed");
            self.source.set_interval(interval).await;
        }

        if !self.filter.accept(&sample) {
            Counters::bump(&self.counters.rejected);
            return;
        }

        Counters::bump(&self.counters.accepted);
        self.last_accepted.send_replace(Some(sample.clone()));
        // No subscribers is fine
        let _ = self.samples.send(sample.clone());

        if let Some(transport) = &self.telemetry {
            if !self.network.borrow().is_online() {
                Counters::bump(&self.counters.dropped_offline);
                return;
            }
            let transport = Arc::clone(transport);
            let counters = Arc::clone(&self.counters);
            tokio::spawn(async move {
                match transport.track_location(&sample).await {
                    Ok(()) => Counters::bump(&counters.pushed),
                    Err(error) => {
                        tracing::warn!(%error, "location push failed");
                        Counters::bump(&counters.push_failures);
                    }
                }
            });
        }
    }
}

//! Position samples and the platform position source

use crate::client::local_db::now_millis;
use crate::client::location::filter::haversine_m;
use crate::shared::error::LocationError;
use crate::shared::protocol::Millis;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One position fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in km/h, when the platform reports one
    pub speed_kmh: Option<f64>,
    /// Horizontal accuracy in meters
    pub accuracy_m: Option<f64>,
    pub timestamp: Millis,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh: None,
            accuracy_m: None,
            timestamp: now_millis(),
        }
    }

    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Distance to another sample in meters
    pub fn distance_m(&self, other: &PositionSample) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Platform position provider (GPS, fused provider, simulator)
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Start a watch; samples arrive on the returned stream
    async fn watch(&self, interval: Duration) -> Result<BoxStream<'static, PositionSample>, LocationError>;

    /// Advise a new sampling interval for the active watch
    async fn set_interval(&self, interval: Duration);

    /// Release the active watch
    async fn clear_watch(&self);
}

/// Position source fed through a channel.
///
/// Used by embedders whose platform pushes fixes from a callback, and by tests.
#[derive(Debug)]
pub struct ChannelPositionSource {
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<PositionSample>>>,
    intervals: Mutex<Vec<Duration>>,
    cleared: Mutex<bool>,
}

/// Sending half of a [`ChannelPositionSource`]
#[derive(Debug, Clone)]
pub struct PositionFeed {
    sender: mpsc::UnboundedSender<PositionSample>,
}

impl PositionFeed {
    /// Push a fix. Returns `false` once the source has been dropped.
    pub fn push(&self, sample: PositionSample) -> bool {
        self.sender.send(sample).is_ok()
    }
}

impl ChannelPositionSource {
    pub fn new() -> (Self, PositionFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            intervals: Mutex::new(Vec::new()),
            cleared: Mutex::new(false),
        };
        (source, PositionFeed { sender })
    }

    /// Every interval requested so far, starting with the one passed to `watch`
    pub fn requested_intervals(&self) -> Vec<Duration> {
        self.intervals.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.lock().map(|c| *c).unwrap_or(false)
    }

    fn record_interval(&self, interval: Duration) {
        if let Ok(mut intervals) = self.intervals.lock() {
            intervals.push(interval);
        }
    }
}

#[async_trait]
impl PositionSource for ChannelPositionSource {
    async fn watch(&self, interval: Duration) -> Result<BoxStream<'static, PositionSample>, LocationError> {
        self.record_interval(interval);
        if let Ok(mut cleared) = self.cleared.lock() {
            *cleared = false;
        }

        // The receiver outlives any single watch so the source can be re-watched
        let samples = stream::unfold(Arc::clone(&self.receiver), |receiver| async move {
            let next = receiver.lock().await.recv().await;
            next.map(|sample| (sample, receiver))
        });
        Ok(Box::pin(samples))
    }

    async fn set_interval(&self, interval: Duration) {
        self.record_interval(interval);
    }

    async fn clear_watch(&self) {
        if let Ok(mut cleared) = self.cleared.lock() {
            *cleared = true;
        }
    }
}

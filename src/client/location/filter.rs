//! Significant-change filter
//!
//! Drops position samples that moved less than a threshold from the last
//! accepted one, so a parked vehicle does not flood subscribers.

use crate::client::location::source::PositionSample;

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Accepts the first sample and every sample at least `threshold_m` away from
/// the last accepted one
#[derive(Debug, Clone)]
pub struct SignificantChangeFilter {
    threshold_m: f64,
    last: Option<PositionSample>,
}

impl SignificantChangeFilter {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            last: None,
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Last accepted sample
    pub fn last(&self) -> Option<&PositionSample> {
        self.last.as_ref()
    }

    /// Returns `true` and adopts the sample as the new reference if it passes
    pub fn accept(&mut self, sample: &PositionSample) -> bool {
        let passes = match &self.last {
            None => true,
            Some(last) => last.distance_m(sample) >= self.threshold_m,
        };
        if passes {
            self.last = Some(sample.clone());
        }
        passes
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

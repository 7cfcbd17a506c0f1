//! Motion classification from reported speed

use crate::shared::config::SamplingIntervals;
use std::time::Duration;

/// Coarse movement class derived from speed in km/h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionClass {
    Stationary,
    SlowMoving,
    Moving,
    HighSpeed,
}

impl MotionClass {
    /// Classify a speed in km/h. NaN and non-positive speeds are stationary.
    pub fn from_speed(speed_kmh: f64) -> Self {
        if speed_kmh.is_nan() || speed_kmh <= 0.0 {
            MotionClass::Stationary
        } else if speed_kmh < 10.0 {
            MotionClass::SlowMoving
        } else if speed_kmh < 50.0 {
            MotionClass::Moving
        } else {
            MotionClass::HighSpeed
        }
    }

    /// Advisory sampling interval for this class
    pub fn interval(self, intervals: &SamplingIntervals) -> Duration {
        let secs = match self {
            MotionClass::Stationary => intervals.stationary_secs,
            MotionClass::SlowMoving => intervals.slow_moving_secs,
            MotionClass::Moving => intervals.moving_secs,
            MotionClass::HighSpeed => intervals.high_speed_secs,
        };
        Duration::from_secs(secs)
    }
}

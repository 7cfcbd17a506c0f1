//! Property-based tests for motion classification and the significant-change filter

use proptest::prelude::*;
use tripsync::client::location::{haversine_m, MotionClass, PositionSample, SignificantChangeFilter};

fn rank(class: MotionClass) -> u8 {
    match class {
        MotionClass::Stationary => 0,
        MotionClass::SlowMoving => 1,
        MotionClass::Moving => 2,
        MotionClass::HighSpeed => 3,
    }
}

fn coordinate() -> impl Strategy<Value = (f64, f64)> {
    (-80.0f64..80.0, -179.0f64..179.0)
}

proptest! {
    #[test]
    fn test_faster_never_classifies_lower(a in -10.0f64..200.0, b in -10.0f64..200.0) {
        let (slow, fast) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(MotionClass::from_speed(slow)) <= rank(MotionClass::from_speed(fast)));
    }

    #[test]
    fn test_non_positive_speed_is_stationary(speed in -500.0f64..=0.0) {
        prop_assert_eq!(MotionClass::from_speed(speed), MotionClass::Stationary);
    }

    #[test]
    fn test_distance_is_symmetric_and_non_negative(a in coordinate(), b in coordinate()) {
        let forward = haversine_m(a.0, a.1, b.0, b.1);
        let backward = haversine_m(b.0, b.1, a.0, a.1);
        prop_assert!(forward >= 0.0);
        prop_assert!((forward - backward).abs() < 1e-6);
        // Never more than half the circumference
        prop_assert!(forward <= std::f64::consts::PI * 6_371_000.0 + 1.0);
    }

    #[test]
    fn test_accepted_samples_are_spaced_by_threshold(
        threshold in 1.0f64..500.0,
        steps in prop::collection::vec((-0.01f64..0.01, -0.01f64..0.01), 1..40),
    ) {
        let mut filter = SignificantChangeFilter::new(threshold);
        let mut position = PositionSample::new(48.0, 11.0);
        let mut accepted = Vec::new();

        prop_assert!(filter.accept(&position));
        accepted.push(position.clone());
        for (d_lat, d_lon) in steps {
            position = PositionSample::new(position.latitude + d_lat, position.longitude + d_lon);
            if filter.accept(&position) {
                accepted.push(position.clone());
            }
        }

        for pair in accepted.windows(2) {
            prop_assert!(pair[0].distance_m(&pair[1]) >= threshold);
        }
        prop_assert_eq!(filter.last(), accepted.last());
    }
}

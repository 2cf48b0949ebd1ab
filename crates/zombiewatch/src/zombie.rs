//! Zombie driver classification.
//!
//! A driver is a zombie when the distance covered by its recent location
//! history is below a configured threshold. Classification is pure: it never
//! touches storage and never fails.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distance::haversine;
use crate::location::Location;

/// When a driver counts as a zombie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZombiePredicate {
    /// A driver that covered strictly less than this many meters is a zombie.
    pub distance_threshold_meters: u64,
    /// How far back the history is taken.
    pub time_window: Duration,
}

/// Classification result for one driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStatus {
    /// The driver key.
    pub id: String,
    /// Whether the driver is a zombie.
    pub zombie: bool,
}

/// Applies a fixed [`ZombiePredicate`] to location histories.
#[derive(Debug, Clone, Copy)]
pub struct ZombieClassifier {
    predicate: ZombiePredicate,
}

impl ZombieClassifier {
    /// Create a classifier with a fixed predicate.
    #[must_use]
    pub fn new(predicate: ZombiePredicate) -> Self {
        Self { predicate }
    }

    /// The predicate applied by this classifier.
    #[must_use]
    pub fn predicate(&self) -> &ZombiePredicate {
        &self.predicate
    }

    /// The history window callers should query before [`Self::evaluate`].
    #[must_use]
    pub fn time_window(&self) -> Duration {
        self.predicate.time_window
    }

    /// Classify `driver_key` from its time-ordered `history`.
    ///
    /// The history is used in the order given.
    #[must_use]
    pub fn evaluate(&self, driver_key: &str, history: &[Location]) -> DriverStatus {
        let distance_driven = distance_travelled(history);
        let zombie = distance_driven < self.predicate.distance_threshold_meters;
        tracing::debug!(
            driver_id = driver_key,
            distance_driven,
            distance_threshold = self.predicate.distance_threshold_meters,
            zombie,
            "Calculated distance driven for the driver"
        );
        DriverStatus {
            id: driver_key.to_string(),
            zombie,
        }
    }
}

/// Total distance in whole meters along consecutive points of `history`.
///
/// Segment lengths are summed in floating point and rounded once at the end.
/// Fewer than two points cover no distance.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn distance_travelled(history: &[Location]) -> u64 {
    let total: f64 = history
        .windows(2)
        .map(|pair| haversine(pair[0].coordinates, pair[1].coordinates))
        .sum();
    total.round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Coordinates;
    use chrono::{TimeZone, Utc};

    const DRIVER: &str = "foo";

    fn track(points: &[(f64, f64)]) -> Vec<Location> {
        let base = Utc.with_ymd_and_hms(2020, 11, 7, 0, 0, 0).unwrap();
        points
            .iter()
            .zip(0_i64..)
            .map(|(&(lat, lon), i)| {
                Location::new(
                    Coordinates::new(lat, lon),
                    base + chrono::Duration::seconds(i * 5),
                )
            })
            .collect()
    }

    fn classifier(threshold: u64) -> ZombieClassifier {
        ZombieClassifier::new(ZombiePredicate {
            distance_threshold_meters: threshold,
            time_window: Duration::from_secs(300),
        })
    }

    #[test]
    fn test_distance_travelled_empty_and_single() {
        assert_eq!(distance_travelled(&[]), 0);
        assert_eq!(distance_travelled(&track(&[(48.864193, 2.350498)])), 0);
    }

    #[test]
    fn test_distance_travelled_sums_segments() {
        let history = track(&[
            (48.864193, 2.350498),
            (48.863193, 2.351498),
            (48.862193, 2.352498),
        ]);
        assert_eq!(distance_travelled(&history), 266);
    }

    #[test]
    fn test_distance_travelled_rounds_once() {
        // Each hop is about 0.44 m: rounding per segment would give 0.
        let history = track(&[
            (48.864000, 2.35),
            (48.864004, 2.35),
            (48.864008, 2.35),
            (48.864012, 2.35),
            (48.864016, 2.35),
        ]);
        assert_eq!(distance_travelled(&history), 2);
    }

    #[test]
    fn test_evaluate_zombie_and_not_zombie() {
        let history = track(&[
            (48.864193, 2.350498),
            (48.863193, 2.351498),
            (48.862193, 2.352498),
        ]);

        assert_eq!(
            classifier(500).evaluate(DRIVER, &history),
            DriverStatus {
                id: DRIVER.to_string(),
                zombie: true
            }
        );
        assert_eq!(
            classifier(200).evaluate(DRIVER, &history),
            DriverStatus {
                id: DRIVER.to_string(),
                zombie: false
            }
        );
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let history = track(&[(48.864193, 2.350498), (48.863921, 2.349211)]);
        let driven = distance_travelled(&history);

        assert!(!classifier(driven).evaluate(DRIVER, &history).zombie);
        assert!(classifier(driven + 1).evaluate(DRIVER, &history).zombie);
        assert!(!classifier(driven - 1).evaluate(DRIVER, &history).zombie);
    }

    #[test]
    fn test_degenerate_history() {
        let single = track(&[(48.864193, 2.350498)]);

        assert!(classifier(1).evaluate(DRIVER, &[]).zombie);
        assert!(classifier(1).evaluate(DRIVER, &single).zombie);
        assert!(!classifier(0).evaluate(DRIVER, &[]).zombie);
        assert!(!classifier(0).evaluate(DRIVER, &single).zombie);
    }

    #[test]
    fn test_end_to_end_example() {
        let history = track(&[(48.864193, 2.350498), (48.863921, 2.349211)]);

        assert!(classifier(200).evaluate(DRIVER, &history).zombie);
        assert!(!classifier(20).evaluate(DRIVER, &history).zombie);
    }

    #[test]
    fn test_driver_status_json() {
        let status = DriverStatus {
            id: DRIVER.to_string(),
            zombie: true,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"id": "foo", "zombie": true})
        );
    }

    #[test]
    fn test_time_window() {
        assert_eq!(classifier(1).time_window(), Duration::from_secs(300));
        assert_eq!(classifier(7).predicate().distance_threshold_meters, 7);
    }
}

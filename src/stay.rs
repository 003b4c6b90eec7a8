//! Stay detection over a stream of location fixes.
//!
//! The detector keeps one baseline fix. A fix farther than the distance threshold from the
//! baseline is a movement: the baseline moves to the new fix and the stay flag drops. A fix
//! within the threshold leaves the baseline alone and raises the stay flag once the baseline is
//! at least `stay_duration_ms` old.
//!
//! The flag is consumed by the spawner ([`StayDetector::take_stay_flag`]), so every spawn has to
//! be earned by a fresh qualifying fix.

use log::{debug, warn};

use crate::geo_utils::haversine_distance;
use crate::{Coordinate, LocationFix};

/// Detector phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StayPhase {
    /// No fix has been accepted yet.
    NoBaseline,
    /// A baseline exists and every fix is measured against it.
    Tracking,
}

/// Why a fix was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixRejection {
    /// Latitude/longitude not finite or out of range.
    InvalidCoordinate,
    /// Timestamp earlier than the last accepted fix.
    StaleTimestamp,
}

/// Outcome of feeding one fix to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StayEvent {
    /// First accepted fix; it became the baseline.
    Baseline,
    /// Displacement above the threshold. Counters must be reset and the spawn ticker replaced.
    Moved { distance_meters: f64 },
    /// Still within the threshold of the baseline. `stayed` is the current stay flag.
    Holding { stayed: bool },
    /// The fix was ignored.
    Rejected(FixRejection),
}

/// Stay state machine.
#[derive(Debug, Clone)]
pub struct StayDetector {
    stay_duration_ms: u64,
    distance_threshold_meters: f64,
    last_location: Option<Coordinate>,
    /// When the baseline was (re)established.
    last_location_update_ms: i64,
    /// Timestamp of the most recent accepted fix, for ordering checks.
    last_fix_ms: i64,
    has_stayed: bool,
}

impl StayDetector {
    pub fn new(stay_duration_ms: u64, distance_threshold_meters: f64) -> Self {
        Self {
            stay_duration_ms,
            distance_threshold_meters,
            last_location: None,
            last_location_update_ms: 0,
            last_fix_ms: i64::MIN,
            has_stayed: false,
        }
    }

    pub fn phase(&self) -> StayPhase {
        if self.last_location.is_some() {
            StayPhase::Tracking
        } else {
            StayPhase::NoBaseline
        }
    }

    /// Baseline fix coordinate, if any.
    pub fn last_location(&self) -> Option<Coordinate> {
        self.last_location
    }

    /// Timestamp (Unix ms) at which the current baseline was set.
    pub fn stable_since_ms(&self) -> Option<i64> {
        self.last_location.map(|_| self.last_location_update_ms)
    }

    pub fn has_stayed(&self) -> bool {
        self.has_stayed
    }

    /// Feed one fix through the state machine.
    pub fn observe(&mut self, fix: &LocationFix) -> StayEvent {
        if !fix.coordinate.is_valid() {
            warn!(
                "[StayDetector] Ignoring fix with invalid coordinate ({}, {})",
                fix.coordinate.latitude, fix.coordinate.longitude
            );
            return StayEvent::Rejected(FixRejection::InvalidCoordinate);
        }
        if fix.timestamp_ms < self.last_fix_ms {
            warn!(
                "[StayDetector] Ignoring stale fix at {}ms (last accepted {}ms)",
                fix.timestamp_ms, self.last_fix_ms
            );
            return StayEvent::Rejected(FixRejection::StaleTimestamp);
        }
        self.last_fix_ms = fix.timestamp_ms;

        let Some(baseline) = self.last_location else {
            self.rebase(fix);
            debug!("[StayDetector] Baseline set at {}ms", fix.timestamp_ms);
            return StayEvent::Baseline;
        };

        let distance = haversine_distance(&baseline, &fix.coordinate);
        if distance > self.distance_threshold_meters {
            self.rebase(fix);
            debug!("[StayDetector] Moved {:.1}m, baseline reset", distance);
            return StayEvent::Moved { distance_meters: distance };
        }

        let held_ms = fix.timestamp_ms.saturating_sub(self.last_location_update_ms);
        if held_ms >= 0 && held_ms as u64 >= self.stay_duration_ms {
            self.has_stayed = true;
        }
        debug!(
            "[StayDetector] Holding {:.1}m from baseline for {}ms (stayed={})",
            distance, held_ms, self.has_stayed
        );
        StayEvent::Holding { stayed: self.has_stayed }
    }

    /// Return the stay flag and clear it.
    pub fn take_stay_flag(&mut self) -> bool {
        std::mem::replace(&mut self.has_stayed, false)
    }

    fn rebase(&mut self, fix: &LocationFix) {
        self.last_location = Some(fix.coordinate);
        self.last_location_update_ms = fix.timestamp_ms;
        self.has_stayed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANCHOR: (f64, f64) = (37.3349, -122.00902);

    fn fix(lat: f64, lng: f64, timestamp_ms: i64) -> LocationFix {
        LocationFix::new(Coordinate::new(lat, lng), timestamp_ms)
    }

    /// A point roughly `meters` north of the anchor.
    fn north_of_anchor(meters: f64, timestamp_ms: i64) -> LocationFix {
        fix(ANCHOR.0 + meters / 111_195.0, ANCHOR.1, timestamp_ms)
    }

    #[test]
    fn test_first_fix_sets_baseline() {
        let mut detector = StayDetector::new(3_000, 75.0);
        assert_eq!(detector.phase(), StayPhase::NoBaseline);
        assert_eq!(detector.observe(&fix(ANCHOR.0, ANCHOR.1, 0)), StayEvent::Baseline);
        assert_eq!(detector.phase(), StayPhase::Tracking);
        assert!(!detector.has_stayed());
        assert_eq!(detector.stable_since_ms(), Some(0));
    }

    #[test]
    fn test_stay_after_duration() {
        let mut detector = StayDetector::new(3_000, 75.0);
        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 0));
        assert_eq!(
            detector.observe(&north_of_anchor(10.0, 2_999)),
            StayEvent::Holding { stayed: false }
        );
        assert_eq!(
            detector.observe(&north_of_anchor(10.0, 3_000)),
            StayEvent::Holding { stayed: true }
        );
    }

    #[test]
    fn test_movement_resets_flag_and_baseline() {
        let mut detector = StayDetector::new(3_000, 75.0);
        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 0));
        detector.observe(&north_of_anchor(5.0, 10_000));
        assert!(detector.has_stayed());

        match detector.observe(&north_of_anchor(100.0, 11_000)) {
            StayEvent::Moved { distance_meters } => assert!(distance_meters > 75.0),
            other => panic!("expected movement, got {:?}", other),
        }
        assert!(!detector.has_stayed());
        assert_eq!(detector.stable_since_ms(), Some(11_000));

        // The stay clock restarts from the new baseline
        assert_eq!(
            detector.observe(&north_of_anchor(100.0, 12_000)),
            StayEvent::Holding { stayed: false }
        );
    }

    #[test]
    fn test_take_stay_flag_consumes() {
        let mut detector = StayDetector::new(0, 75.0);
        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 0));
        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 1));
        assert!(detector.take_stay_flag());
        assert!(!detector.take_stay_flag());
    }

    #[test]
    fn test_rejects_invalid_and_stale() {
        let mut detector = StayDetector::new(3_000, 75.0);
        assert_eq!(
            detector.observe(&fix(f64::NAN, 0.0, 0)),
            StayEvent::Rejected(FixRejection::InvalidCoordinate)
        );
        assert_eq!(detector.phase(), StayPhase::NoBaseline);

        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 5_000));
        assert_eq!(
            detector.observe(&fix(ANCHOR.0, ANCHOR.1, 4_000)),
            StayEvent::Rejected(FixRejection::StaleTimestamp)
        );
    }

    #[test]
    fn test_irregular_intervals_accepted() {
        let mut detector = StayDetector::new(30_000, 75.0);
        detector.observe(&fix(ANCHOR.0, ANCHOR.1, 0));
        detector.observe(&north_of_anchor(3.0, 17));
        detector.observe(&north_of_anchor(3.0, 17));
        assert_eq!(
            detector.observe(&north_of_anchor(3.0, 45_000)),
            StayEvent::Holding { stayed: true }
        );
    }
}

//! Radius counts of ordinary and special markers.
//!
//! Counts are computed by indexing marker positions on the Earth sphere in an R-tree and
//! pulling every marker whose chord distance could put it inside the radius, then confirming
//! with the Haversine distance. Results are cached per neighborhood:
//! - a probe within the radius of an existing entry overwrites that entry's counts
//! - any other probe appends a new entry
//!
//! The scan is first-match, so entries whose neighborhoods overlap are not merged and a probe
//! between two of them always lands on the older one. The entry list is an approximation of a
//! partition, not a guaranteed one.

use log::debug;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{chord_length, haversine_distance, to_unit_sphere};
use crate::{CloverCounts, Coordinate, Marker};

// Slack added to the chord search so floating error never drops a marker the exact
// Haversine check would keep.
const CHORD_SLACK_METERS: f64 = 1.0;

/// Cached counts for one neighborhood.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeighborhoodCounts {
    /// Probe location that created the entry
    pub reference: Coordinate,
    pub counts: CloverCounts,
}

// =============================================================================
// R-tree Indexed Marker
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexedMarker {
    idx: usize,
    position: [f64; 3],
}

impl RTreeObject for IndexedMarker {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedMarker {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn build_rtree(markers: &[Marker]) -> RTree<IndexedMarker> {
    let indexed: Vec<IndexedMarker> = markers
        .iter()
        .enumerate()
        .map(|(idx, m)| IndexedMarker {
            idx,
            position: to_unit_sphere(&m.coordinate),
        })
        .collect();
    RTree::bulk_load(indexed)
}

fn tally<'a>(markers: impl Iterator<Item = &'a Marker>) -> CloverCounts {
    let mut counts = CloverCounts::default();
    for marker in markers {
        if marker.is_special {
            counts.special += 1;
        } else {
            counts.ordinary += 1;
        }
    }
    counts
}

fn counts_with_tree(
    tree: &RTree<IndexedMarker>,
    probe: &Coordinate,
    markers: &[Marker],
    radius_meters: f64,
) -> CloverCounts {
    if radius_meters.is_nan() || radius_meters < 0.0 {
        return CloverCounts::default();
    }
    let within = |m: &&Marker| haversine_distance(probe, &m.coordinate) <= radius_meters;

    match chord_length(radius_meters + CHORD_SLACK_METERS) {
        Some(chord) => {
            let candidates = tree
                .locate_within_distance(to_unit_sphere(probe), chord * chord)
                .map(|indexed| &markers[indexed.idx]);
            tally(candidates.filter(within))
        }
        // Radius covers the whole sphere
        None => tally(markers.iter().filter(within)),
    }
}

// =============================================================================
// Radius Queries
// =============================================================================

/// Count ordinary and special markers within `radius_meters` of `probe`.
///
/// `ordinary + special` always equals the number of markers within the radius; a radius of 0
/// only counts markers exactly at the probe, an infinite radius counts every marker.
///
/// ```rust
/// use clover_engine::{aggregate, Coordinate, Marker};
///
/// let here = Coordinate::new(37.3349, -122.00902);
/// let markers = vec![
///     Marker::new(here, false),
///     Marker::new(Coordinate::new(37.3350, -122.00902), true),
///     Marker::new(Coordinate::new(37.4000, -122.00902), false), // ~7km away
/// ];
/// let counts = aggregate::recompute_counts(&here, &markers, 75.0);
/// assert_eq!((counts.ordinary, counts.special), (1, 1));
/// ```
pub fn recompute_counts(probe: &Coordinate, markers: &[Marker], radius_meters: f64) -> CloverCounts {
    if markers.is_empty() {
        return CloverCounts::default();
    }
    let tree = build_rtree(markers);
    counts_with_tree(&tree, probe, markers, radius_meters)
}

/// Counts for many probes against one marker set, sharing a single index.
pub fn counts_for_probes(
    probes: &[Coordinate],
    markers: &[Marker],
    radius_meters: f64,
) -> Vec<CloverCounts> {
    let tree = build_rtree(markers);
    probes
        .iter()
        .map(|p| counts_with_tree(&tree, p, markers, radius_meters))
        .collect()
}

/// Parallel version of [`counts_for_probes`].
#[cfg(feature = "parallel")]
pub fn counts_for_probes_parallel(
    probes: &[Coordinate],
    markers: &[Marker],
    radius_meters: f64,
) -> Vec<CloverCounts> {
    let tree = build_rtree(markers);
    probes
        .par_iter()
        .map(|p| counts_with_tree(&tree, p, markers, radius_meters))
        .collect()
}

// =============================================================================
// Per-Neighborhood Cache
// =============================================================================

/// Radius aggregator with its per-neighborhood cache.
#[derive(Debug, Clone)]
pub struct RadiusAggregator {
    radius_meters: f64,
    entries: Vec<NeighborhoodCounts>,
}

impl RadiusAggregator {
    pub fn new(radius_meters: f64) -> Self {
        Self {
            radius_meters,
            entries: Vec::new(),
        }
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Cached entries in creation order.
    pub fn entries(&self) -> &[NeighborhoodCounts] {
        &self.entries
    }

    /// Fresh counts around `current`, without touching the cache.
    pub fn recompute_counts(&self, current: &Coordinate, markers: &[Marker]) -> CloverCounts {
        recompute_counts(current, markers, self.radius_meters)
    }

    /// Recompute around `current` and store the result in the first entry within the radius,
    /// or in a new entry when none is.
    pub fn upsert(&mut self, current: &Coordinate, markers: &[Marker]) -> CloverCounts {
        let counts = self.recompute_counts(current, markers);
        match self.position_of(current) {
            Some(i) => {
                self.entries[i].counts = counts;
                debug!("[RadiusAggregator] Updated neighborhood #{}: {:?}", i, counts);
            }
            None => {
                self.entries.push(NeighborhoodCounts {
                    reference: *current,
                    counts,
                });
                debug!(
                    "[RadiusAggregator] New neighborhood #{}: {:?}",
                    self.entries.len() - 1,
                    counts
                );
            }
        }
        counts
    }

    /// Cached counts for the first entry within the radius of `probe`.
    pub fn lookup(&self, probe: &Coordinate) -> Option<CloverCounts> {
        self.position_of(probe).map(|i| self.entries[i].counts)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position_of(&self, probe: &Coordinate) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| haversine_distance(&e.reference, probe) <= self.radius_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Coordinate {
        Coordinate::new(37.3349, -122.00902)
    }

    /// A coordinate roughly `meters` north of `here()`.
    fn north(meters: f64) -> Coordinate {
        Coordinate::new(37.3349 + meters / 111_195.0, -122.00902)
    }

    fn sample_markers() -> Vec<Marker> {
        vec![
            Marker::new(here(), false),
            Marker::new(north(20.0), false),
            Marker::new(north(40.0), true),
            Marker::new(north(200.0), true),
            Marker::new(north(5_000.0), false),
        ]
    }

    #[test]
    fn test_counts_within_radius() {
        let counts = recompute_counts(&here(), &sample_markers(), 75.0);
        assert_eq!(counts, CloverCounts { ordinary: 2, special: 1 });
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_zero_radius_counts_coincident_only() {
        let mut markers = sample_markers();
        markers.push(Marker::new(here(), true));
        let counts = recompute_counts(&here(), &markers, 0.0);
        assert_eq!(counts, CloverCounts { ordinary: 1, special: 1 });
    }

    #[test]
    fn test_infinite_radius_counts_everything() {
        let markers = sample_markers();
        let counts = recompute_counts(&here(), &markers, f64::INFINITY);
        assert_eq!(counts.total() as usize, markers.len());
        assert_eq!(counts, CloverCounts { ordinary: 3, special: 2 });
    }

    #[test]
    fn test_total_matches_linear_filter() {
        let markers = sample_markers();
        for radius in [0.0, 10.0, 25.0, 50.0, 150.0, 250.0, 10_000.0] {
            let counts = recompute_counts(&north(30.0), &markers, radius);
            let expected = markers
                .iter()
                .filter(|m| haversine_distance(&north(30.0), &m.coordinate) <= radius)
                .count();
            assert_eq!(counts.total() as usize, expected, "radius {}", radius);
        }
    }

    #[test]
    fn test_negative_radius_is_empty() {
        assert_eq!(recompute_counts(&here(), &sample_markers(), -1.0), CloverCounts::default());
        assert_eq!(recompute_counts(&here(), &[], 75.0), CloverCounts::default());
    }

    #[test]
    fn test_upsert_updates_nearby_entry() {
        let mut aggregator = RadiusAggregator::new(75.0);
        let mut markers = sample_markers();
        aggregator.upsert(&here(), &markers);
        assert_eq!(aggregator.entries().len(), 1);

        markers.push(Marker::new(north(10.0), true));
        let counts = aggregator.upsert(&north(30.0), &markers);
        assert_eq!(aggregator.entries().len(), 1);
        assert_eq!(aggregator.entries()[0].reference, here());
        assert_eq!(aggregator.lookup(&here()), Some(counts));
    }

    #[test]
    fn test_upsert_appends_far_entry() {
        let mut aggregator = RadiusAggregator::new(75.0);
        let markers = sample_markers();
        aggregator.upsert(&here(), &markers);
        aggregator.upsert(&north(5_000.0), &markers);
        assert_eq!(aggregator.entries().len(), 2);
        assert_eq!(
            aggregator.lookup(&north(5_010.0)),
            Some(CloverCounts { ordinary: 1, special: 0 })
        );
        assert_eq!(aggregator.lookup(&north(1_000.0)), None);
    }

    #[test]
    fn test_first_match_wins_between_overlapping_entries() {
        let mut aggregator = RadiusAggregator::new(75.0);
        let markers = sample_markers();
        aggregator.upsert(&here(), &markers);
        aggregator.upsert(&north(100.0), &markers);
        assert_eq!(aggregator.entries().len(), 2);

        // 50m north is inside both neighborhoods; the older entry takes the update
        aggregator.upsert(&north(50.0), &[]);
        assert_eq!(aggregator.entries()[0].counts, CloverCounts::default());
        assert_ne!(aggregator.entries()[1].counts, CloverCounts::default());
    }

    #[test]
    fn test_clear() {
        let mut aggregator = RadiusAggregator::new(75.0);
        aggregator.upsert(&here(), &sample_markers());
        aggregator.clear();
        assert!(aggregator.entries().is_empty());
        assert_eq!(aggregator.lookup(&here()), None);
    }

    #[test]
    fn test_counts_for_probes() {
        let markers = sample_markers();
        let probes = vec![here(), north(5_000.0)];
        let counts = counts_for_probes(&probes, &markers, 75.0);
        assert_eq!(counts[0], CloverCounts { ordinary: 2, special: 1 });
        assert_eq!(counts[1], CloverCounts { ordinary: 1, special: 0 });
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_counts_for_probes_parallel_matches_sequential() {
        let markers = sample_markers();
        let probes: Vec<Coordinate> = (0..20).map(|i| north(i as f64 * 15.0)).collect();
        assert_eq!(
            counts_for_probes_parallel(&probes, &markers, 75.0),
            counts_for_probes(&probes, &markers, 75.0)
        );
    }
}

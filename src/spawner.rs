//! Marker placement.
//!
//! Markers fill a grid anchored at the current stay's anchor location, one cell per marker
//! in creation order. Every n-th marker since the last counter reset is special ("four-leaf");
//! the rest are ordinary. The set is capped; once full, spawn attempts are silent no-ops.

use log::debug;
use rand::Rng;

use crate::geo_utils::{grid_cell, offset_coordinate};
use crate::{Coordinate, EngineConfig, Marker};

/// Whether the `ordinal`-th spawn (1-based) since the last reset is special.
///
/// ```rust
/// use clover_engine::spawner::is_special_ordinal;
///
/// let specials: Vec<u32> = (1..=8).filter(|n| is_special_ordinal(*n, 4)).collect();
/// assert_eq!(specials, vec![4, 8]);
/// ```
#[inline]
pub fn is_special_ordinal(ordinal: u32, every_nth: u32) -> bool {
    every_nth != 0 && ordinal % every_nth == 0
}

/// Owns the marker set and the special counter.
#[derive(Debug, Clone)]
pub struct MarkerSpawner {
    max_markers: usize,
    grid_size: usize,
    cell_size_degrees: f64,
    special_every_nth: u32,
    special_counter: u32,
    markers: Vec<Marker>,
}

impl MarkerSpawner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_markers: config.max_markers as usize,
            grid_size: config.grid_size as usize,
            cell_size_degrees: config.cell_size_degrees,
            special_every_nth: config.special_every_nth,
            special_counter: 0,
            markers: Vec::with_capacity(config.max_markers as usize),
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.markers.len() >= self.max_markers
    }

    /// Markers spawned since the last movement or midnight reset.
    pub fn special_counter(&self) -> u32 {
        self.special_counter
    }

    /// Place one marker around `anchor`.
    ///
    /// Returns `None` without touching any state when the set is full or no anchor is known.
    pub fn try_spawn<R: Rng + ?Sized>(
        &mut self,
        anchor: Option<&Coordinate>,
        rng: &mut R,
    ) -> Option<Marker> {
        if self.is_full() {
            debug!("[MarkerSpawner] At capacity ({}), skipping", self.max_markers);
            return None;
        }
        let anchor = anchor?;

        self.special_counter += 1;
        let is_special = is_special_ordinal(self.special_counter, self.special_every_nth);

        let (row, column) = grid_cell(self.markers.len(), self.grid_size);
        let coordinate = offset_coordinate(anchor, row, column, self.cell_size_degrees, rng);
        let marker = Marker::new(coordinate, is_special);

        debug!(
            "[MarkerSpawner] Marker #{} at cell ({}, {}), special={}",
            self.special_counter, row, column, is_special
        );
        self.markers.push(marker.clone());
        Some(marker)
    }

    /// Restart the special sequence (movement). Existing markers are kept.
    pub fn reset_counter(&mut self) {
        self.special_counter = 0;
    }

    /// Drop every marker and restart the special sequence (midnight).
    pub fn clear(&mut self) {
        self.markers.clear();
        self.special_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn anchor() -> Coordinate {
        Coordinate::new(37.3349, -122.00902)
    }

    #[test]
    fn test_every_fourth_is_special() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let flags: Vec<bool> = (0..8)
            .map(|_| spawner.try_spawn(Some(&anchor()), &mut rng).unwrap().is_special)
            .collect();
        assert_eq!(flags, vec![false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn test_capacity_is_respected() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..48 {
            assert!(spawner.try_spawn(Some(&anchor()), &mut rng).is_some());
        }
        assert!(spawner.is_full());
        let counter = spawner.special_counter();
        assert!(spawner.try_spawn(Some(&anchor()), &mut rng).is_none());
        assert_eq!(spawner.len(), 48);
        assert_eq!(spawner.special_counter(), counter);
    }

    #[test]
    fn test_no_anchor_is_noop() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        assert!(spawner.try_spawn(None, &mut rng).is_none());
        assert_eq!(spawner.special_counter(), 0);
        assert!(spawner.is_empty());
    }

    #[test]
    fn test_markers_land_in_their_cells() {
        let config = EngineConfig::default();
        let mut spawner = MarkerSpawner::new(&config);
        let mut rng = StdRng::seed_from_u64(4);
        let base = anchor();
        for index in 0..48usize {
            let marker = spawner.try_spawn(Some(&base), &mut rng).unwrap();
            let row = ((marker.coordinate.latitude - base.latitude) / config.cell_size_degrees).floor();
            let column = ((marker.coordinate.longitude - base.longitude) / config.cell_size_degrees).floor();
            // Allow for float rounding right at a cell edge
            assert!((row - (index / 6) as f64).abs() <= 1.0);
            assert!((column - (index % 6) as f64).abs() <= 1.0);
            assert!(marker.coordinate.latitude >= base.latitude + (index / 6) as f64 * 0.0001 - 1e-9);
            assert!(marker.coordinate.longitude >= base.longitude + (index % 6) as f64 * 0.0001 - 1e-9);
        }
    }

    #[test]
    fn test_reset_counter_keeps_markers() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..3 {
            spawner.try_spawn(Some(&anchor()), &mut rng);
        }
        spawner.reset_counter();
        let next = spawner.try_spawn(Some(&anchor()), &mut rng).unwrap();
        assert!(!next.is_special);
        assert_eq!(spawner.len(), 4);
        assert_eq!(spawner.special_counter(), 1);
    }

    #[test]
    fn test_clear_empties_set() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(6);
        spawner.try_spawn(Some(&anchor()), &mut rng);
        spawner.clear();
        assert!(spawner.is_empty());
        assert_eq!(spawner.special_counter(), 0);
    }

    #[test]
    fn test_marker_ids_are_unique() {
        let mut spawner = MarkerSpawner::new(&EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..10 {
            spawner.try_spawn(Some(&anchor()), &mut rng);
        }
        let mut ids: Vec<&str> = spawner.markers().iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }
}

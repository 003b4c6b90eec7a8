//! The engine: one owner for all clover state.
//!
//! Location fixes, spawn ticks, midnight checks and stopwatch ticks all go through
//! `&mut CloverEngine`, so the host decides the ordering (the [`driver`](crate::driver) does it
//! with a single lock). Reads are plain data and never block.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

use crate::aggregate::{NeighborhoodCounts, RadiusAggregator};
use crate::midnight::MidnightResetScheduler;
use crate::spawner::MarkerSpawner;
use crate::stay::{StayDetector, StayEvent};
use crate::stopwatch::{ElapsedFormat, ElapsedStayTimer};
use crate::ticker::{SpawnTicker, TickToken};
use crate::{CloverCounts, Coordinate, EngineConfig, LocationFix, Marker};

/// Everything the display surface needs, copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineSnapshot {
    pub markers: Vec<Marker>,
    pub anchor: Option<Coordinate>,
    pub has_stayed: bool,
    pub special_counter: u32,
    /// Counts around the latest accepted fix, if there is one
    pub counts_here: Option<CloverCounts>,
    pub elapsed_ms: u64,
    pub stay_started_at_ms: Option<i64>,
}

pub struct CloverEngine {
    config: EngineConfig,
    rng: StdRng,
    anchor: Option<Coordinate>,
    current_location: Option<Coordinate>,
    stay: StayDetector,
    spawner: MarkerSpawner,
    aggregator: RadiusAggregator,
    midnight: MidnightResetScheduler,
    stopwatch: ElapsedStayTimer,
    ticker: SpawnTicker,
}

impl CloverEngine {
    /// Create an engine with an entropy-seeded placement RNG, tracking days from today (local).
    ///
    /// ```rust
    /// use clover_engine::{CloverEngine, Coordinate, EngineConfig, LocationFix};
    ///
    /// let mut engine = CloverEngine::new(EngineConfig::default());
    /// let here = Coordinate::new(37.3349, -122.00902);
    /// engine.handle_location(LocationFix::new(here, 0));
    /// engine.handle_location(LocationFix::new(here, 3_000));
    ///
    /// let token = engine.spawn_token();
    /// let marker = engine.handle_spawn_tick(token, 4_000).unwrap();
    /// assert!(!marker.is_special);
    /// assert_eq!(engine.markers().len(), 1);
    /// ```
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, StdRng::from_entropy())
    }

    /// Create an engine with a seeded placement RNG.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    /// Treat `date` as the day of the last reset.
    pub fn with_reset_date(mut self, date: NaiveDate) -> Self {
        self.midnight = MidnightResetScheduler::new(date);
        self
    }

    fn build(config: EngineConfig, rng: StdRng) -> Self {
        let config = if config.is_valid() {
            config
        } else {
            warn!("[CloverEngine] Invalid config {:?}, using defaults", config);
            EngineConfig::default()
        };
        info!(
            "[CloverEngine] Starting: max_markers={}, grid={}x, stay={}ms, threshold={}m",
            config.max_markers, config.grid_size, config.stay_duration_ms, config.distance_threshold_meters
        );
        Self {
            rng,
            anchor: None,
            current_location: None,
            stay: StayDetector::new(config.stay_duration_ms, config.distance_threshold_meters),
            spawner: MarkerSpawner::new(&config),
            aggregator: RadiusAggregator::new(config.aggregate_radius_meters),
            midnight: MidnightResetScheduler::starting_at(&Local::now()),
            stopwatch: ElapsedStayTimer::new(Duration::from_millis(config.elapsed_tick_interval_ms)),
            ticker: SpawnTicker::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    /// Feed one location fix.
    ///
    /// The first fix becomes the anchor. A movement re-anchors, restarts the special sequence,
    /// stops the stopwatch and replaces the spawn ticker: the host must restart its spawn timer
    /// with [`spawn_token`](Self::spawn_token).
    pub fn handle_location(&mut self, fix: LocationFix) -> StayEvent {
        let event = self.stay.observe(&fix);
        if !matches!(event, StayEvent::Rejected(_)) {
            self.current_location = Some(fix.coordinate);
        }
        match event {
            StayEvent::Baseline => {
                self.anchor = Some(fix.coordinate);
                info!(
                    "[CloverEngine] Anchored at ({:.6}, {:.6})",
                    fix.coordinate.latitude, fix.coordinate.longitude
                );
            }
            StayEvent::Moved { distance_meters } => {
                self.anchor = Some(fix.coordinate);
                self.spawner.reset_counter();
                self.stopwatch.clear();
                let token = self.ticker.replace();
                info!(
                    "[CloverEngine] Moved {:.0}m, new stay episode (ticker generation {})",
                    distance_meters, token.generation
                );
            }
            StayEvent::Holding { stayed: true } if self.config.spawn_on_fix => {
                self.attempt_spawn(fix.timestamp_ms);
            }
            StayEvent::Holding { .. } | StayEvent::Rejected(_) => {}
        }
        event
    }

    /// Token the host's spawn timer must present.
    pub fn spawn_token(&self) -> TickToken {
        self.ticker.current()
    }

    /// Periodic spawn opportunity.
    ///
    /// Spawns when the token is current and the stay flag is up. The flag is consumed whether
    /// or not a marker could be placed.
    pub fn handle_spawn_tick(&mut self, token: TickToken, now_ms: i64) -> Option<Marker> {
        if !self.ticker.is_current(token) {
            debug!(
                "[CloverEngine] Dropping stale tick (generation {}, current {})",
                token.generation,
                self.ticker.current().generation
            );
            return None;
        }
        self.attempt_spawn(now_ms)
    }

    /// Poll the wall clock. Performs the daily reset when the local date has changed.
    pub fn handle_midnight_check<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        if !self.midnight.check(now) {
            return false;
        }
        self.reset_day(now.timestamp_millis());
        true
    }

    /// One stopwatch tick.
    pub fn handle_elapsed_tick(&mut self) {
        self.stopwatch.tick();
    }

    /// Clear markers, neighborhood counts, the special sequence and the stopwatch, then seed
    /// the new day with one marker (no stay required). Returns the seed marker, if an anchor
    /// is known.
    pub fn reset_day(&mut self, now_ms: i64) -> Option<Marker> {
        let dropped = self.spawner.len();
        self.spawner.clear();
        self.aggregator.clear();
        self.stopwatch.clear();
        let seed = self.spawn_marker(now_ms);
        info!(
            "[CloverEngine] Daily reset: dropped {} markers, seeded {}",
            dropped,
            if seed.is_some() { "1" } else { "none (no anchor)" }
        );
        seed
    }

    fn attempt_spawn(&mut self, now_ms: i64) -> Option<Marker> {
        if !self.stay.take_stay_flag() {
            return None;
        }
        self.spawn_marker(now_ms)
    }

    fn spawn_marker(&mut self, now_ms: i64) -> Option<Marker> {
        let marker = self.spawner.try_spawn(self.anchor.as_ref(), &mut self.rng)?;
        if self.stopwatch.start_if_idle(now_ms) {
            debug!("[CloverEngine] Stopwatch started at {}ms", now_ms);
        }
        Some(marker)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn markers(&self) -> &[Marker] {
        self.spawner.markers()
    }

    pub fn anchor(&self) -> Option<Coordinate> {
        self.anchor
    }

    /// Coordinate of the latest accepted fix.
    pub fn current_location(&self) -> Option<Coordinate> {
        self.current_location
    }

    pub fn has_stayed(&self) -> bool {
        self.stay.has_stayed()
    }

    pub fn special_counter(&self) -> u32 {
        self.spawner.special_counter()
    }

    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    pub fn elapsed_display(&self, format: ElapsedFormat) -> String {
        self.stopwatch.display(format)
    }

    /// Fresh counts around `probe`, stored in the neighborhood cache.
    pub fn counts_at(&mut self, probe: &Coordinate) -> CloverCounts {
        self.aggregator.upsert(probe, self.spawner.markers())
    }

    /// Fresh counts around `probe`, cache untouched.
    pub fn recompute_counts(&self, probe: &Coordinate) -> CloverCounts {
        self.aggregator.recompute_counts(probe, self.spawner.markers())
    }

    /// Cached counts for the neighborhood containing `probe`.
    pub fn lookup_counts(&self, probe: &Coordinate) -> Option<CloverCounts> {
        self.aggregator.lookup(probe)
    }

    /// Cached counts for the neighborhood around a marker (detail view).
    pub fn counts_near_marker(&self, marker_id: &str) -> Option<CloverCounts> {
        let marker = self.markers().iter().find(|m| m.id == marker_id)?;
        self.aggregator.lookup(&marker.coordinate)
    }

    pub fn neighborhoods(&self) -> &[NeighborhoodCounts] {
        self.aggregator.entries()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            markers: self.markers().to_vec(),
            anchor: self.anchor,
            has_stayed: self.stay.has_stayed(),
            special_counter: self.spawner.special_counter(),
            counts_here: self.current_location.map(|p| self.recompute_counts(&p)),
            elapsed_ms: self.stopwatch.elapsed().as_millis() as u64,
            stay_started_at_ms: self.stopwatch.started_at_ms(),
        }
    }
}

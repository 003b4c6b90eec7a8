//! # Clover Engine
//!
//! Location-driven item spawning for a mobile map.
//!
//! As the device reports its position, the engine decides when the user has stayed in one
//! place long enough, places clover markers on a jittered grid around that place, marks every
//! fourth one as a four-leaf clover, counts clovers within a radius of any location, and
//! clears everything at local midnight.
//!
//! This library provides:
//! - Stay detection over noisy, irregular location fixes
//! - Grid placement with a deterministic special-marker rule
//! - Radius counts backed by an R-tree
//! - A daily reset and an elapsed-stay stopwatch
//!
//! ## Features
//!
//! - **`serde`** - Serialize/deserialize config, markers and snapshots
//! - **`parallel`** - Batch radius queries with rayon
//! - **`runtime`** - Tokio event loop driving the engine, plus the async geocoding hook
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use clover_engine::{CloverEngine, Coordinate, EngineConfig, LocationFix};
//!
//! let mut engine = CloverEngine::with_seed(EngineConfig::default(), 7);
//! let here = Coordinate::new(37.3349, -122.00902);
//!
//! // Stay for the configured duration, then let the spawn timer fire
//! let mut t = 0;
//! for _ in 0..4 {
//!     engine.handle_location(LocationFix::new(here, t));
//!     t += 3_000;
//!     engine.handle_location(LocationFix::new(here, t));
//!     engine.handle_spawn_tick(engine.spawn_token(), t);
//! }
//!
//! let counts = engine.counts_at(&here);
//! assert_eq!((counts.ordinary, counts.special), (3, 1));
//! ```

pub mod geo_utils;

pub mod stay;
pub use stay::{FixRejection, StayDetector, StayEvent, StayPhase};

pub mod spawner;
pub use spawner::MarkerSpawner;

// Radius counts and the per-neighborhood cache
pub mod aggregate;
pub use aggregate::{NeighborhoodCounts, RadiusAggregator};

pub mod midnight;
pub use midnight::MidnightResetScheduler;

pub mod stopwatch;
pub use stopwatch::{format_elapsed, ElapsedFormat, ElapsedStayTimer};

pub mod stay_file;

pub mod ticker;
pub use ticker::{SpawnTicker, TickToken};

pub mod engine;
pub use engine::{CloverEngine, EngineSnapshot};

// Address lookup contract (detached lookups need the runtime)
pub mod geocode;
pub use geocode::{AddressParts, GeocodeError, Geocoder};

// Tokio event loop
#[cfg(feature = "runtime")]
pub mod driver;

#[cfg(feature = "runtime")]
pub use driver::{DriverHandle, EngineDriver};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("CloverEngineRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use clover_engine::Coordinate;
/// let point = Coordinate::new(37.3349, -122.00902); // Cupertino
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One report from the location source.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationFix {
    pub coordinate: Coordinate,
    /// Unix milliseconds
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, timestamp_ms: i64) -> Self {
        Self { coordinate, timestamp_ms }
    }
}

/// A placed clover. Ordinary markers are three-leaf, special ones four-leaf.
///
/// Two markers are equal when their ids are equal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Marker {
    /// UUID v4
    pub id: String,
    pub coordinate: Coordinate,
    pub is_special: bool,
}

impl Marker {
    /// Create a marker with a fresh id.
    pub fn new(coordinate: Coordinate, is_special: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            coordinate,
            is_special,
        }
    }
}

impl PartialEq for Marker {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Marker {}

/// Ordinary and special marker counts around a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CloverCounts {
    /// Three-leaf clovers
    pub ordinary: u32,
    /// Four-leaf clovers
    pub special: u32,
}

impl CloverCounts {
    pub fn total(&self) -> u32 {
        self.ordinary + self.special
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Maximum markers alive at once. Default: 48
    pub max_markers: u32,

    /// Grid width in cells; rows are unbounded. Default: 6
    pub grid_size: u32,

    /// Grid cell edge in degrees. Default: 0.0001 (~11 meters of latitude)
    pub cell_size_degrees: f64,

    /// Time a fix must stay within `distance_threshold_meters` of the baseline before
    /// a spawn is earned. Default: 3000 ms
    pub stay_duration_ms: u64,

    /// Displacement that counts as leaving the place. Default: 75.0 meters
    pub distance_threshold_meters: f64,

    /// Spawn timer period. Default: 2000 ms
    pub spawn_tick_interval_ms: u64,

    /// Wall-clock poll period for the daily reset. Default: 60000 ms
    pub midnight_check_interval_ms: u64,

    /// Stopwatch tick period. Default: 1000 ms
    pub elapsed_tick_interval_ms: u64,

    /// Every n-th marker since the last reset is special. Default: 4
    pub special_every_nth: u32,

    /// Radius for clover counts and neighborhood matching. Default: 75.0 meters
    pub aggregate_radius_meters: f64,

    /// Also spawn directly from the fix that earns the stay flag, not only on the timer.
    /// Default: false
    pub spawn_on_fix: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_markers: 48,
            grid_size: 6,
            cell_size_degrees: 0.0001,
            stay_duration_ms: 3_000,
            distance_threshold_meters: 75.0,
            spawn_tick_interval_ms: 2_000,
            midnight_check_interval_ms: 60_000,
            elapsed_tick_interval_ms: 1_000,
            special_every_nth: 4,
            aggregate_radius_meters: 75.0,
            spawn_on_fix: false,
        }
    }
}

impl EngineConfig {
    /// Whether the values can drive an engine.
    pub fn is_valid(&self) -> bool {
        self.grid_size > 0
            && self.special_every_nth > 0
            && self.cell_size_degrees.is_finite()
            && self.cell_size_degrees > 0.0
            && self.distance_threshold_meters.is_finite()
            && self.distance_threshold_meters >= 0.0
            && !self.aggregate_radius_meters.is_nan()
            && self.aggregate_radius_meters >= 0.0
            && self.spawn_tick_interval_ms > 0
            && self.midnight_check_interval_ms > 0
            && self.elapsed_tick_interval_ms > 0
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Engine handle for the mobile host. The host owns the timers and calls in from them.
    #[derive(uniffi::Object)]
    pub struct FfiCloverEngine {
        inner: Mutex<CloverEngine>,
    }

    impl FfiCloverEngine {
        fn engine(&self) -> MutexGuard<'_, CloverEngine> {
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[uniffi::export]
    impl FfiCloverEngine {
        #[uniffi::constructor]
        pub fn new(config: EngineConfig) -> Arc<Self> {
            init_logging();
            info!("[CloverEngineRust] 🍀 engine created");
            Arc::new(Self {
                inner: Mutex::new(CloverEngine::new(config)),
            })
        }

        /// Feed a fix. Returns true when the host must restart its spawn timer.
        pub fn handle_location(&self, latitude: f64, longitude: f64, timestamp_ms: i64) -> bool {
            let fix = LocationFix::new(Coordinate::new(latitude, longitude), timestamp_ms);
            let event = self.engine().handle_location(fix);
            debug!("[CloverEngineRust] 🍀 fix -> {:?}", event);
            matches!(event, StayEvent::Moved { .. })
        }

        /// Generation the host's spawn timer must pass back.
        pub fn spawn_tick_generation(&self) -> u64 {
            self.engine().spawn_token().generation
        }

        pub fn handle_spawn_tick(&self, generation: u64, now_ms: i64) -> Option<Marker> {
            self.engine().handle_spawn_tick(TickToken { generation }, now_ms)
        }

        /// Poll the device's local clock for the daily reset.
        pub fn check_midnight(&self) -> bool {
            self.engine().handle_midnight_check(&chrono::Local::now())
        }

        pub fn elapsed_tick(&self) {
            self.engine().handle_elapsed_tick();
        }

        pub fn snapshot(&self) -> EngineSnapshot {
            self.engine().snapshot()
        }

        pub fn counts_at(&self, latitude: f64, longitude: f64) -> CloverCounts {
            self.engine().counts_at(&Coordinate::new(latitude, longitude))
        }

        pub fn lookup_counts(&self, latitude: f64, longitude: f64) -> Option<CloverCounts> {
            self.engine().lookup_counts(&Coordinate::new(latitude, longitude))
        }

        pub fn counts_near_marker(&self, marker_id: String) -> Option<CloverCounts> {
            self.engine().counts_near_marker(&marker_id)
        }

        /// Near-counts for every marker, for the list/detail views.
        pub fn counts_for_all_markers(&self) -> Vec<CloverCounts> {
            let engine = self.engine();
            let probes: Vec<Coordinate> = engine.markers().iter().map(|m| m.coordinate).collect();
            aggregate::counts_for_probes_parallel(
                &probes,
                engine.markers(),
                engine.config().aggregate_radius_meters,
            )
        }

        pub fn elapsed_text(&self, format: ElapsedFormat) -> String {
            self.engine().elapsed_display(format)
        }
    }

    /// Get default engine configuration.
    #[uniffi::export]
    pub fn default_engine_config() -> EngineConfig {
        init_logging();
        EngineConfig::default()
    }

    /// Read the persisted stay-duration text; falls back to the zero value.
    #[uniffi::export]
    pub fn read_stay_duration_file(path: String) -> String {
        stay_file::read_stay_duration(path)
    }
}

#[cfg(feature = "ffi")]
pub use ffi::*;

// ============================================================================
// Tests
// ============================================================================

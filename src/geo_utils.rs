//! # Geographic Utilities
//!
//! Coordinate arithmetic shared by the stay detector, the spawner and the radius aggregator.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`grid_cell`] | (row, column) cell for the n-th marker of a grid |
//! | [`offset_coordinate`] | Randomized coordinate inside a grid cell |
//! | [`offset_coordinate_with`] | Same, with caller-supplied jitter (deterministic) |
//! | [`to_unit_sphere`] | Cartesian position on the Earth sphere, for spatial indexing |
//! | [`chord_length`] | Straight-line chord for a great-circle distance |
//!
//! ## Example
//!
//! ```rust
//! use clover_engine::{Coordinate, geo_utils};
//!
//! let anchor = Coordinate::new(37.3349, -122.00902);
//! let (row, column) = geo_utils::grid_cell(7, 6);
//! assert_eq!((row, column), (1, 1));
//!
//! let mut rng = rand::thread_rng();
//! let placed = geo_utils::offset_coordinate(&anchor, row, column, 0.0001, &mut rng);
//! assert!(placed.latitude >= anchor.latitude + 0.0001);
//! assert!(geo_utils::haversine_distance(&anchor, &placed) < 75.0);
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees). Grid offsets are
//! applied in raw degrees, so a cell is not square on the ground away from the equator.

use geo::{Distance, Haversine, Point};
use rand::Rng;

use crate::Coordinate;

/// Mean Earth radius used by `geo::Haversine`, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use clover_engine::{Coordinate, geo_utils};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Position of a coordinate on a sphere of radius [`EARTH_RADIUS_METERS`], as `[x, y, z]`.
///
/// Euclidean distance between two such points is the chord through the Earth, which grows
/// monotonically with the great-circle distance. That lets an R-tree answer radius queries
/// exactly instead of with a degree-box approximation that breaks down near the poles.
pub fn to_unit_sphere(p: &Coordinate) -> [f64; 3] {
    let lat = p.latitude.to_radians();
    let lng = p.longitude.to_radians();
    [
        EARTH_RADIUS_METERS * lat.cos() * lng.cos(),
        EARTH_RADIUS_METERS * lat.cos() * lng.sin(),
        EARTH_RADIUS_METERS * lat.sin(),
    ]
}

/// Chord length (meters) matching a great-circle distance (meters).
///
/// Returns `None` when the distance reaches half the circumference or more (or is infinite):
/// every point on the sphere is then within range.
pub fn chord_length(great_circle_meters: f64) -> Option<f64> {
    if great_circle_meters.is_nan() || great_circle_meters < 0.0 {
        return Some(0.0);
    }
    if great_circle_meters >= std::f64::consts::PI * EARTH_RADIUS_METERS {
        return None;
    }
    Some(2.0 * EARTH_RADIUS_METERS * (great_circle_meters / (2.0 * EARTH_RADIUS_METERS)).sin())
}

// =============================================================================
// Grid Placement
// =============================================================================

/// Grid cell for the marker at `index` (0-based) in a grid `grid_size` columns wide.
///
/// Rows are unbounded: the 37th marker of a 6-wide grid lands in row 6, column 0.
/// A `grid_size` of zero is treated as one column.
#[inline]
pub fn grid_cell(index: usize, grid_size: usize) -> (usize, usize) {
    let width = grid_size.max(1);
    (index / width, index % width)
}

/// Randomized coordinate inside grid cell `(row, column)` anchored at `base`.
///
/// Latitude becomes `base.latitude + (row + U) * cell_size` and longitude
/// `base.longitude + (column + U) * cell_size`, with an independent `U` drawn from `[0, 1)`
/// for each axis.
pub fn offset_coordinate<R: Rng + ?Sized>(
    base: &Coordinate,
    row: usize,
    column: usize,
    cell_size: f64,
    rng: &mut R,
) -> Coordinate {
    let jitter_lat: f64 = rng.gen();
    let jitter_lng: f64 = rng.gen();
    offset_coordinate_with(base, row, column, cell_size, jitter_lat, jitter_lng)
}

/// [`offset_coordinate`] with explicit jitter values (each expected in `[0, 1)`).
///
/// Latitude is clamped to the poles and longitude wraps past the antimeridian, so a valid
/// base always yields a valid coordinate.
#[inline]
pub fn offset_coordinate_with(
    base: &Coordinate,
    row: usize,
    column: usize,
    cell_size: f64,
    jitter_lat: f64,
    jitter_lng: f64,
) -> Coordinate {
    let latitude = base.latitude + (row as f64 + jitter_lat) * cell_size;
    let longitude = base.longitude + (column as f64 + jitter_lng) * cell_size;
    Coordinate::new(latitude.clamp(-90.0, 90.0), wrap_longitude(longitude))
}

#[inline]
fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

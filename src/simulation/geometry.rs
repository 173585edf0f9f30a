//! Geometry helpers for the flat-disk range model.
//!
//! Contains helper functions for:
//! - Squared and plain Euclidean distance
//! - The inclusive range test used by the topology
//! - Clamping generated positions into a bounding box

use super::types::Point;

/// Squared Euclidean distance in world units.
///
/// Range checks compare d² against r², so the square root is only taken
/// when a caller actually wants the distance.
///
/// # Parameters
///
/// * `a` - First point
/// * `b` - Second point
///
/// # Returns
///
/// The squared distance (dx² + dy²).
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance between two points.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance2(a, b).sqrt()
}

/// Inclusive range test: `true` when `distance(a, b) <= range`.
///
/// Symmetric in `a` and `b`, since `distance2` is.
pub fn within_range(a: &Point, b: &Point, range: f64) -> bool {
    distance2(a, b) <= range * range
}

/// Clamp a point into the box spanned by `min` and `max` (inclusive).
pub fn clamp_point(p: Point, min: Point, max: Point) -> Point {
    Point {
        x: p.x.max(min.x).min(max.x),
        y: p.y.max(min.y).min(max.y),
    }
}

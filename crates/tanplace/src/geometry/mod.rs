//! Geometry kernel: canonical tan polygons, pose transforms, polygon
//! distance, and feature-angle arithmetic.
//!
//! All positions are in puzzle units: the canonical seven-piece set
//! assembles a unit square, so one unit is the square's side length.

mod angle;
mod polygon;
mod shape;

pub use angle::{feature_angle, feature_delta, signed_delta, wrap_two_pi};
pub use polygon::{
    polygon_centroid, polygon_min_distance, polygon_outline_gap, transformed_vertices,
};
pub use shape::PieceShape;

/// Position, rotation and mirror state of one piece or target slot.
///
/// Rotation is in radians. A flipped pose mirrors the canonical vertex set
/// about the y axis before rotating; only the parallelogram is chiral, so
/// observations of the other shapes have `flip` coerced to `false` on
/// ingest.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
    /// Position (x, y) in puzzle units.
    pub position: [f64; 2],
    /// Rotation in radians.
    pub rotation: f64,
    /// Mirror state.
    #[serde(default)]
    pub flip: bool,
}

impl Pose {
    pub fn new(x: f64, y: f64, rotation: f64, flip: bool) -> Self {
        Self {
            position: [x, y],
            rotation,
            flip,
        }
    }
}

#[inline]
pub fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

#[inline]
pub fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    dist2(a, b).sqrt()
}

use std::f64::consts::TAU;

use super::PieceShape;

/// Wrap an angle into [0, 2π).
#[inline]
pub fn wrap_two_pi(angle: f64) -> f64 {
    let a = angle % TAU;
    if a < 0.0 {
        a + TAU
    } else {
        a
    }
}

/// Wrap into [0, period).
#[inline]
fn wrap_period(angle: f64, period: f64) -> f64 {
    let a = angle % period;
    if a < 0.0 {
        a + period
    } else {
        a
    }
}

/// Signed shortest difference `a - b` wrapped into (-period/2, period/2].
#[inline]
pub fn signed_delta(a: f64, b: f64, period: f64) -> f64 {
    let d = wrap_period(a - b, period);
    if d > period * 0.5 {
        d - period
    } else {
        d
    }
}

/// Orientation of a pose reduced modulo the shape's rotational symmetry.
///
/// The canonical vertex sets are axis-aligned, so no per-shape offset term
/// is needed. A flipped chiral piece reads its rotation mirrored; negating
/// it keeps two identically-oriented flipped pieces comparable.
#[inline]
pub fn feature_angle(shape: PieceShape, rotation: f64, flip: bool) -> f64 {
    let oriented = if flip && shape.is_chiral() {
        -rotation
    } else {
        rotation
    };
    wrap_period(oriented, shape.symmetry_period())
}

/// Absolute shortest-arc difference between two poses' feature angles.
#[inline]
pub fn feature_delta(shape: PieceShape, a_rot: f64, a_flip: bool, b_rot: f64, b_flip: bool) -> f64 {
    let period = shape.symmetry_period();
    let fa = feature_angle(shape, a_rot, a_flip);
    let fb = feature_angle(shape, b_rot, b_flip);
    signed_delta(fa, fb, period).abs()
}

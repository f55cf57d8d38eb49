//! Pure pose validation.
//!
//! [`validate_pose`] compares one observed pose against one target pose for
//! a given shape. It is deterministic, side-effect free, and safe to call
//! at any rate; everything stateful (binding, hysteresis, streaks) lives in
//! the engine.

use crate::geometry::{
    dist, feature_delta, polygon_outline_gap, transformed_vertices, PieceShape, Pose,
};

/// Validator tolerance band, in puzzle units / radians.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    /// Maximum centroid offset for a position match.
    pub position: f64,
    /// Maximum feature-angle error, radians.
    pub rotation: f64,
    /// Boundary-contact distance that rescues an offset centroid.
    pub edge_contact: f64,
}

impl Tolerances {
    /// Uniformly widened copy, used for the hysteresis band.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            position: self.position * factor,
            rotation: self.rotation * factor,
            edge_contact: self.edge_contact * factor,
        }
    }
}

/// Why a placement was rejected, in check priority order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PlacementFault {
    /// Shape mismatch between piece and target. Only reachable when a noisy
    /// observation re-classifies a bound piece; the engine never pairs
    /// mismatched shapes otherwise.
    WrongPiece,
    /// Centroid offset beyond tolerance and no rescuing edge contact.
    WrongPosition { offset: f64 },
    /// Feature-angle error beyond tolerance.
    WrongRotation { degrees_off: f64 },
    /// Parallelogram mirrored relative to its target.
    NeedsFlip,
}

/// Per-check outcome of a single observed-vs-target comparison.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoseCheck {
    pub position_ok: bool,
    pub rotation_ok: bool,
    pub flip_ok: bool,
    /// Centroid distance, puzzle units.
    pub position_error: f64,
    /// Feature-angle error, radians.
    pub rotation_error: f64,
}

impl PoseCheck {
    pub fn is_valid(&self) -> bool {
        self.position_ok && self.rotation_ok && self.flip_ok
    }

    /// First failing check in priority order, or `None` when valid.
    pub fn fault(&self) -> Option<PlacementFault> {
        if !self.position_ok {
            Some(PlacementFault::WrongPosition {
                offset: self.position_error,
            })
        } else if !self.rotation_ok {
            Some(PlacementFault::WrongRotation {
                degrees_off: self.rotation_error.to_degrees(),
            })
        } else if !self.flip_ok {
            Some(PlacementFault::NeedsFlip)
        } else {
            None
        }
    }
}

/// Compare an observed pose against a target pose for `shape`.
///
/// Position passes on centroid distance within `tolerances.position`, or
/// when the observed and target outlines align within the `edge_contact`
/// band; the latter rescues pieces whose outline sits on the silhouette
/// while the reported center is offset by the piece's own geometry.
/// Rotation is compared in feature-angle space. Flip only constrains
/// chiral shapes.
pub fn validate_pose(
    shape: PieceShape,
    observed: &Pose,
    target: &Pose,
    tolerances: &Tolerances,
) -> PoseCheck {
    let position_error = dist(observed.position, target.position);
    let mut position_ok = position_error <= tolerances.position;
    if !position_ok {
        let obs_poly = transformed_vertices(shape, observed);
        let tgt_poly = transformed_vertices(shape, target);
        position_ok = polygon_outline_gap(&obs_poly, &tgt_poly) <= tolerances.edge_contact;
    }

    let rotation_error = feature_delta(
        shape,
        observed.rotation,
        observed.flip,
        target.rotation,
        target.flip,
    );
    let rotation_ok = rotation_error <= tolerances.rotation;

    let flip_ok = !shape.is_chiral() || observed.flip == target.flip;

    PoseCheck {
        position_ok,
        rotation_ok,
        flip_ok,
        position_error,
        rotation_error,
    }
}

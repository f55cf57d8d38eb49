//! Relative mapping from observed space to the puzzle's target frame.
//!
//! A correctly-assembled cluster should validate wherever it sits on the
//! table. Per group, one member (the anchor) is corresponded to a target
//! slot; the rigid transform between the two lets every other member be
//! checked against target space without any absolute-position slack.
//!
//! Derivation stages, mirroring how the group accumulates evidence:
//! - two or more bound pairs: least-squares rigid refit over all pairs;
//! - exactly one bound pair: that pair acts as the anchor correspondence;
//! - no pairs yet: rank an anchor, match it to an unconsumed slot, and
//!   score the symmetry-ambiguous rotation candidates against the rest of
//!   the group.
//!
//! A `None` from [`derive_group_mapping`] is the internal no-anchor /
//! no-mapping-yet signal: callers fall back to direct validation.

mod anchor;
mod binding;
mod rigid;

pub use binding::BindingTable;
pub use rigid::RigidMap;

pub(crate) use anchor::{anchor_slot_candidates, ordered, select_anchor};

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::config::EngineConfig;
use crate::geometry::{dist, feature_delta, signed_delta};
use crate::groups::ConstructionGroup;
use crate::lifecycle::{PieceId, PieceInstance, PieceState};
use crate::puzzle::{PuzzleLayout, TargetId};

/// A derived per-group mapping: the anchor correspondence plus the rigid
/// transform and the bound pairs supporting it.
#[derive(Debug, Clone)]
pub struct AnchorMapping {
    pub anchor_piece: PieceId,
    pub anchor_target: TargetId,
    pub map: RigidMap,
    /// (piece, target) pairs the map is supported by. Never two entries
    /// with the same piece or the same target.
    pub pairs: Vec<(PieceId, TargetId)>,
}

/// Derive the mapping for `group`, or `None` when the group cannot anchor
/// yet. Recomputed per validation pass; the durable state it derives from
/// is the binding table.
pub(crate) fn derive_group_mapping(
    group: &ConstructionGroup,
    pieces: &BTreeMap<PieceId, PieceInstance>,
    puzzle: &PuzzleLayout,
    bindings: &BindingTable,
    config: &EngineConfig,
) -> Option<AnchorMapping> {
    if group.members.len() < 2 {
        return None;
    }

    let bound_pairs: Vec<(PieceId, TargetId)> = group
        .members
        .iter()
        .filter_map(|&id| {
            let piece = pieces.get(&id)?;
            if piece.state != PieceState::Validated {
                return None;
            }
            bindings.target_of(id).map(|t| (id, t))
        })
        .collect();

    if bound_pairs.len() >= 2 {
        return refit_from_pairs(&bound_pairs, pieces, puzzle);
    }

    if let Some(&(anchor_id, target_id)) = bound_pairs.first() {
        let anchor = pieces.get(&anchor_id)?;
        let slot = puzzle.slot(target_id)?;
        let (map, _) = best_symmetry_candidate(
            anchor, &slot.pose, target_id, group, pieces, puzzle, bindings, config,
        )?;
        return Some(AnchorMapping {
            anchor_piece: anchor_id,
            anchor_target: target_id,
            map,
            pairs: bound_pairs,
        });
    }

    // Nothing bound yet: promote an anchor and evaluate every plausible
    // slot correspondence, keeping the one the rest of the group agrees
    // with most.
    let anchor_id = select_anchor(group, pieces)?;
    let anchor = pieces.get(&anchor_id)?;
    let full_support = group.members.len() - 1;

    let mut best: Option<(TargetId, RigidMap, usize)> = None;
    for target_id in anchor_slot_candidates(anchor, puzzle, bindings, config) {
        let Some(slot) = puzzle.slot(target_id) else {
            continue;
        };
        let Some((map, n_supported)) = best_symmetry_candidate(
            anchor, &slot.pose, target_id, group, pieces, puzzle, bindings, config,
        ) else {
            continue;
        };
        if best.as_ref().is_none_or(|(_, _, n)| n_supported > *n) {
            best = Some((target_id, map, n_supported));
            if n_supported == full_support {
                break;
            }
        }
    }

    let (target_id, map, n_supported) = best?;

    // An unsupported mapping is only trusted when the anchor plausibly sits
    // on its own silhouette, or the group has been still long enough.
    if n_supported == 0 {
        let slot = puzzle.slot(target_id)?;
        let near = dist(anchor.pose.position, slot.pose.position)
            <= config.position_tolerance * config.mapping.anchor_proximity_mul;
        let confident = group.confidence >= config.mapping.high_confidence;
        if !near && !confident {
            tracing::debug!(
                group = group.id,
                anchor = anchor_id,
                target = target_id,
                "anchor match rejected: no supporting member and no adjacency evidence"
            );
            return None;
        }
    }

    tracing::debug!(
        group = group.id,
        anchor = anchor_id,
        target = target_id,
        rotation = map.rotation,
        n_supported,
        "group mapping derived"
    );
    Some(AnchorMapping {
        anchor_piece: anchor_id,
        anchor_target: target_id,
        map,
        pairs: Vec::new(),
    })
}

fn refit_from_pairs(
    bound_pairs: &[(PieceId, TargetId)],
    pieces: &BTreeMap<PieceId, PieceInstance>,
    puzzle: &PuzzleLayout,
) -> Option<AnchorMapping> {
    let mut point_pairs = Vec::with_capacity(bound_pairs.len());
    let mut flip_parity = false;
    for &(pid, tid) in bound_pairs {
        let piece = pieces.get(&pid)?;
        let slot = puzzle.slot(tid)?;
        point_pairs.push((piece.pose.position, slot.pose.position));
        if piece.shape.is_chiral() {
            flip_parity = piece.pose.flip ^ slot.pose.flip;
        }
    }

    let &(anchor_piece, anchor_target) = &bound_pairs[0];
    let map = match rigid::fit_pairs(&point_pairs, flip_parity) {
        Some(map) => map,
        None => {
            // Coincident centroids; fall back to the first correspondence.
            let piece = pieces.get(&anchor_piece)?;
            let slot = puzzle.slot(anchor_target)?;
            rigid::from_anchor(piece.shape, &piece.pose, &slot.pose)
        }
    };
    Some(AnchorMapping {
        anchor_piece,
        anchor_target,
        map,
        pairs: bound_pairs.to_vec(),
    })
}

/// Enumerate the rotation-delta representatives permitted by the anchor
/// shape's symmetry and keep the one that validates the most other group
/// members; ties prefer the smallest rotation magnitude. Members may not
/// count support from the anchor's own slot.
#[allow(clippy::too_many_arguments)]
fn best_symmetry_candidate(
    anchor: &PieceInstance,
    anchor_slot_pose: &crate::geometry::Pose,
    anchor_slot_id: TargetId,
    group: &ConstructionGroup,
    pieces: &BTreeMap<PieceId, PieceInstance>,
    puzzle: &PuzzleLayout,
    bindings: &BindingTable,
    config: &EngineConfig,
) -> Option<(RigidMap, usize)> {
    let period = anchor.shape.symmetry_period();
    let n_candidates = (TAU / period).round().max(1.0) as usize;
    let base = rigid::from_anchor(anchor.shape, &anchor.pose, anchor_slot_pose);

    let tolerances = config.tolerances();
    let mut best: Option<(RigidMap, usize)> = None;
    for k in 0..n_candidates {
        let theta = signed_delta(base.rotation + k as f64 * period, 0.0, TAU);
        let candidate = {
            let rotated = nalgebra::Rotation2::new(theta)
                * nalgebra::Vector2::new(anchor.pose.position[0], anchor.pose.position[1]);
            RigidMap {
                rotation: theta,
                translation: [
                    anchor_slot_pose.position[0] - rotated.x,
                    anchor_slot_pose.position[1] - rotated.y,
                ],
                flip_parity: base.flip_parity,
                mean_residual: 0.0,
            }
        };

        let mut n_supported = 0usize;
        for &member_id in &group.members {
            if member_id == anchor.id {
                continue;
            }
            let Some(member) = pieces.get(&member_id) else {
                continue;
            };
            let mapped = candidate.apply(&member.pose);
            // Support uses centroid alignment only: the edge-contact rescue
            // is far too permissive to discriminate between candidate
            // correspondences (touching neighbors rescue each other).
            let supported = puzzle
                .slots_of_shape(member.shape)
                .filter(|s| s.id != anchor_slot_id && !bindings.is_consumed(s.id))
                .any(|s| {
                    dist(mapped.position, s.pose.position) <= tolerances.position
                        && feature_delta(
                            member.shape,
                            mapped.rotation,
                            mapped.flip,
                            s.pose.rotation,
                            s.pose.flip,
                        ) <= tolerances.rotation
                        && (!member.shape.is_chiral() || mapped.flip == s.pose.flip)
                });
            if supported {
                n_supported += 1;
            }
        }

        let better = match &best {
            None => true,
            Some((cur, cur_n)) => {
                n_supported > *cur_n
                    || (n_supported == *cur_n && theta.abs() < cur.rotation.abs())
            }
        };
        if better {
            best = Some((candidate, n_supported));
        }
    }
    best
}

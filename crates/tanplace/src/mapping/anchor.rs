//! Anchor selection and anchor-to-target matching.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::geometry::{dist, feature_delta};
use crate::groups::ConstructionGroup;
use crate::lifecycle::{PieceId, PieceInstance, PieceState};
use crate::puzzle::{PuzzleLayout, TargetId};

use super::binding::BindingTable;

/// Pick the group member best suited to carry the relative mapping.
///
/// An already-validated member wins outright; otherwise candidates rank by
/// shape importance (large pieces first), then proximity to the group
/// centroid, then id for determinism.
pub(crate) fn select_anchor(
    group: &ConstructionGroup,
    pieces: &BTreeMap<PieceId, PieceInstance>,
) -> Option<PieceId> {
    group
        .members
        .iter()
        .filter_map(|id| pieces.get(id))
        .min_by_key(|p| {
            (
                p.state != PieceState::Validated,
                p.shape.importance(),
                ordered(dist(p.pose.position, group.centroid)),
                p.id,
            )
        })
        .map(|p| p.id)
}

/// Candidate target slots for an anchor, most plausible first.
///
/// Unconsumed slots of the anchor's shape, preferring slots whose feature
/// angle agrees with the anchor within a relaxed band (this is what
/// disambiguates duplicate-shape slots), then the closest. The caller
/// scores each candidate against the rest of the group; this ordering only
/// decides ties.
pub(crate) fn anchor_slot_candidates(
    anchor: &PieceInstance,
    puzzle: &PuzzleLayout,
    bindings: &BindingTable,
    config: &EngineConfig,
) -> Vec<TargetId> {
    let relaxed = config.rotation_tolerance_rad() * config.mapping.relaxed_rotation_mul;
    let mut slots: Vec<_> = puzzle
        .slots_of_shape(anchor.shape)
        .filter(|s| !bindings.is_consumed(s.id))
        .collect();
    slots.sort_by_key(|s| {
        let disagrees = feature_delta(
            anchor.shape,
            anchor.pose.rotation,
            anchor.pose.flip,
            s.pose.rotation,
            s.pose.flip,
        ) > relaxed;
        (
            disagrees,
            ordered(dist(anchor.pose.position, s.pose.position)),
            s.id,
        )
    });
    slots.into_iter().map(|s| s.id).collect()
}

/// Total order for non-NaN distances, for use in sort keys.
#[inline]
pub(crate) fn ordered(d: f64) -> u64 {
    debug_assert!(!d.is_nan());
    d.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PieceShape, Pose};

    fn resting(id: PieceId, shape: PieceShape, x: f64, y: f64) -> PieceInstance {
        let mut p = PieceInstance::new(id, shape, Pose::new(x, y, 0.0, false), 0.0);
        p.state = PieceState::Placed;
        p
    }

    fn group_of(pieces: &BTreeMap<PieceId, PieceInstance>) -> ConstructionGroup {
        let members: Vec<_> = pieces.keys().copied().collect();
        let positions: Vec<_> = pieces.values().map(|p| p.pose.position).collect();
        ConstructionGroup {
            id: 0,
            members,
            centroid: crate::geometry::polygon_centroid(&positions),
            radius: 1.0,
            confidence: 0.0,
            attempts: 0,
        }
    }

    #[test]
    fn validated_member_is_preferred() {
        let mut pieces = BTreeMap::new();
        pieces.insert(0, resting(0, PieceShape::LargeTriangle, 0.0, 0.0));
        let mut small = resting(1, PieceShape::SmallTriangle, 0.5, 0.0);
        small.state = PieceState::Validated;
        pieces.insert(1, small);

        let group = group_of(&pieces);
        assert_eq!(select_anchor(&group, &pieces), Some(1));
    }

    #[test]
    fn importance_breaks_ties_between_unvalidated_members() {
        let mut pieces = BTreeMap::new();
        pieces.insert(0, resting(0, PieceShape::SmallTriangle, 0.0, 0.0));
        pieces.insert(1, resting(1, PieceShape::LargeTriangle, 0.6, 0.0));
        pieces.insert(2, resting(2, PieceShape::Square, 0.3, 0.0));

        let group = group_of(&pieces);
        assert_eq!(select_anchor(&group, &pieces), Some(1));
    }

    #[test]
    fn candidates_skip_consumed_slots() {
        let puzzle = PuzzleLayout::default();
        let config = EngineConfig::default();
        let mut bindings = BindingTable::default();

        // Small triangle at slot 4's pose; slots 4 and 5 share the shape.
        let slot4 = puzzle.slot(4).unwrap().pose;
        let anchor = {
            let mut p = resting(9, PieceShape::SmallTriangle, slot4.position[0], slot4.position[1]);
            p.pose.rotation = slot4.rotation;
            p
        };
        assert_eq!(
            anchor_slot_candidates(&anchor, &puzzle, &bindings, &config),
            vec![4, 5]
        );

        bindings.claim(3, 4);
        assert_eq!(
            anchor_slot_candidates(&anchor, &puzzle, &bindings, &config),
            vec![5]
        );
        bindings.claim(7, 5);
        assert!(anchor_slot_candidates(&anchor, &puzzle, &bindings, &config).is_empty());
    }

    #[test]
    fn feature_agreement_outranks_raw_distance() {
        let puzzle = PuzzleLayout::default();
        let config = EngineConfig::default();
        let bindings = BindingTable::default();

        // Sit between the two small-triangle slots, slightly nearer slot 4
        // but oriented like slot 5.
        let s4 = puzzle.slot(4).unwrap().pose;
        let s5 = puzzle.slot(5).unwrap().pose;
        let mid = [
            0.45 * s5.position[0] + 0.55 * s4.position[0],
            0.45 * s5.position[1] + 0.55 * s4.position[1],
        ];
        let mut anchor = resting(9, PieceShape::SmallTriangle, mid[0], mid[1]);
        anchor.pose.rotation = s5.rotation;
        assert_eq!(
            anchor_slot_candidates(&anchor, &puzzle, &bindings, &config),
            vec![5, 4]
        );
    }
}

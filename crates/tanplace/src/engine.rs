//! Engine facade.
//!
//! One [`Engine`] instance owns every mutable collection (pieces, bindings,
//! attempt counters, event queue); callers mutate piece poses only through
//! [`Engine::observe_piece`]. All entry points take `&mut self`, so the
//! binding and consumption side effects of a pass are serialized by
//! construction; there is no interior mutability and no clock access, and
//! the only notion of time is the caller-supplied timestamp.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::geometry::{dist, feature_delta, PieceShape, Pose};
use crate::groups::{build_groups, ConstructionGroup};
use crate::lifecycle::{sanitize_pose, PieceId, PieceInstance, PieceState};
use crate::mapping::{derive_group_mapping, ordered, BindingTable};
use crate::nudge::{NudgeContext, NudgeEscalator};
use crate::puzzle::{PuzzleLayout, TargetId};
use crate::validator::{validate_pose, PlacementFault, Tolerances};

/// Counters for one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Pieces examined (each at most once per pass).
    pub n_examined: usize,
    /// Pieces validated against a target in canonical space.
    pub n_validated_direct: usize,
    /// Pieces validated through a group's relative mapping.
    pub n_validated_mapped: usize,
    /// Pieces kept valid by the still-valid hysteresis band.
    pub n_validated_hysteresis: usize,
    /// Claims rejected because the target was already consumed.
    pub n_binding_conflicts: usize,
    /// Pieces that crossed the invalid-streak threshold this pass.
    pub n_invalidated: usize,
    /// Refinement sweeps over group members triggered by new bindings.
    pub n_refine_sweeps: usize,
    /// Nudges emitted.
    pub n_nudges: usize,
    /// Construction groups in this pass.
    pub n_groups: usize,
}

enum Validation {
    Direct,
    Mapped,
    Hysteresis,
}

/// Placement validation engine: consumes pose observations, maintains the
/// piece lifecycle, and decides which pieces satisfy which target slots.
pub struct Engine {
    config: EngineConfig,
    puzzle: PuzzleLayout,
    pieces: BTreeMap<PieceId, PieceInstance>,
    bindings: BindingTable,
    attempts: BTreeMap<PieceId, u32>,
    nudges: NudgeEscalator,
    valid_targets: BTreeSet<TargetId>,
    events: VecDeque<EngineEvent>,
    completed: bool,
}

impl Engine {
    /// Create an engine for a puzzle with the default (standard difficulty)
    /// configuration.
    pub fn new(puzzle: PuzzleLayout) -> Self {
        Self {
            config: EngineConfig::default(),
            puzzle,
            pieces: BTreeMap::new(),
            bindings: BindingTable::default(),
            attempts: BTreeMap::new(),
            nudges: NudgeEscalator::default(),
            valid_targets: BTreeSet::new(),
            events: VecDeque::new(),
            completed: false,
        }
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(puzzle: PuzzleLayout, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut engine = Self::new(puzzle);
        engine.config = config;
        Ok(engine)
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swap the configuration (difficulty change) without disturbing
    /// in-flight piece state. Rejected configurations leave the previous
    /// one in place.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Current puzzle layout.
    pub fn puzzle(&self) -> &PuzzleLayout {
        &self.puzzle
    }

    /// Install a new target set and reset every piece of mutable state:
    /// pieces, bindings, consumed targets, attempt counters, hint history
    /// and the completion latch. Malformed target sets never reach this
    /// point; [`PuzzleLayout`] construction rejects them, so a failed load
    /// leaves the engine untouched.
    pub fn load_puzzle(&mut self, puzzle: PuzzleLayout) {
        tracing::debug!(name = %puzzle.name, n_slots = puzzle.n_slots(), "puzzle loaded");
        self.puzzle = puzzle;
        self.pieces.clear();
        self.bindings.clear();
        self.attempts.clear();
        self.nudges.clear();
        self.valid_targets.clear();
        self.events.clear();
        self.completed = false;
    }

    /// Feed one pose observation. Drives the lifecycle state machine and,
    /// when a placement debounce has elapsed, runs event-driven validation
    /// for the due pieces.
    pub fn observe_piece(
        &mut self,
        id: PieceId,
        shape: PieceShape,
        position: [f64; 2],
        rotation: f64,
        flip: bool,
        timestamp: f64,
    ) {
        if !timestamp.is_finite() {
            tracing::warn!(piece = id, "observation dropped: non-finite timestamp");
            return;
        }
        let raw = Pose {
            position,
            rotation,
            flip,
        };

        if self.pieces.contains_key(&id) {
            let (state_changed, state, released_target) = {
                let piece = self.pieces.get_mut(&id).expect("piece present");
                piece.shape = shape;
                let pose = piece.sanitize(&raw);
                let outcome = piece.apply_observation(pose, timestamp, &self.config);
                (
                    outcome.state_changed,
                    piece.state,
                    outcome.left_validated.then(|| piece.bound_target).flatten(),
                )
            };
            if let Some(target) = released_target {
                self.set_target_validity(target, false);
            }
            if state_changed {
                self.push_state_event(id, state);
            }
        } else {
            if !position[0].is_finite() || !position[1].is_finite() {
                tracing::warn!(piece = id, "first observation dropped: non-finite position");
                return;
            }
            let pose = sanitize_pose(shape, &raw, None);
            self.pieces
                .insert(id, PieceInstance::new(id, shape, pose, timestamp));
            self.push_state_event(id, PieceState::Detected);
        }

        let due: Vec<PieceId> = self
            .pieces
            .values()
            .filter(|p| p.debounce_elapsed(timestamp))
            .map(|p| p.id)
            .collect();
        if !due.is_empty() {
            self.run_pass(timestamp, due);
        }
    }

    /// Run an immediate batch re-validation over every piece whose state
    /// allows it (periodic / frame-driven validation).
    pub fn request_validation_pass(&mut self, now: f64) -> PassStats {
        let ids: Vec<PieceId> = self
            .pieces
            .values()
            .filter(|p| p.state.can_validate())
            .map(|p| p.id)
            .collect();
        self.run_pass(now, ids)
    }

    /// Drain queued outbound events in emission order.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    /// Targets currently consumed by a valid, bound piece.
    pub fn validated_targets(&self) -> &BTreeSet<TargetId> {
        &self.valid_targets
    }

    /// Lifecycle state of one piece, `Unobserved` if never seen.
    pub fn piece_state(&self, id: PieceId) -> PieceState {
        self.pieces
            .get(&id)
            .map_or(PieceState::Unobserved, |p| p.state)
    }

    /// Full tracked record of one piece.
    pub fn piece(&self, id: PieceId) -> Option<&PieceInstance> {
        self.pieces.get(&id)
    }

    /// Whether the loaded puzzle has been completed.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Current piece-to-target bindings in ascending piece order.
    pub fn bound_pairs(&self) -> Vec<(PieceId, TargetId)> {
        self.bindings.pairs().collect()
    }

    /// The piece currently consuming a target slot, if any.
    pub fn piece_for_target(&self, target: TargetId) -> Option<PieceId> {
        self.bindings.piece_of(target)
    }

    /// Diagnostic view: the relative mapping each current construction
    /// group would validate against at time `now`.
    pub fn current_mappings(&self, now: f64) -> Vec<crate::mapping::AnchorMapping> {
        let groups = build_groups(&self.pieces, &self.attempts, &self.config.grouping, now);
        groups
            .iter()
            .filter_map(|g| {
                derive_group_mapping(g, &self.pieces, &self.puzzle, &self.bindings, &self.config)
            })
            .collect()
    }

    fn run_pass(&mut self, now: f64, ids: Vec<PieceId>) -> PassStats {
        let mut stats = PassStats::default();
        let groups = build_groups(&self.pieces, &self.attempts, &self.config.grouping, now);
        stats.n_groups = groups.len();

        let mut visited = BTreeSet::new();
        for id in ids {
            self.validate_piece(id, &groups, &mut visited, &mut stats, now);
        }

        self.flush_settled_nudges(now, &mut stats);
        self.check_completion();
        tracing::debug!(
            n_examined = stats.n_examined,
            n_direct = stats.n_validated_direct,
            n_mapped = stats.n_validated_mapped,
            n_hysteresis = stats.n_validated_hysteresis,
            n_conflicts = stats.n_binding_conflicts,
            n_bound = self.bindings.n_bound(),
            "validation pass complete"
        );
        stats
    }

    fn validate_piece(
        &mut self,
        id: PieceId,
        groups: &[ConstructionGroup],
        visited: &mut BTreeSet<PieceId>,
        stats: &mut PassStats,
        now: f64,
    ) -> bool {
        if !visited.insert(id) {
            return false;
        }
        let Some(piece) = self.pieces.get(&id) else {
            return false;
        };
        if !piece.state.can_validate() {
            return false;
        }
        stats.n_examined += 1;

        let shape = piece.shape;
        let pose = piece.pose;
        let was_placed = piece.state == PieceState::Placed;
        let last_valid = piece.last_valid_pose;
        if was_placed {
            let p = self.pieces.get_mut(&id).expect("piece present");
            p.state = PieceState::Validating;
            p.pending_validation = None;
            self.push_state_event(id, PieceState::Validating);
        }

        let tolerances = self.config.tolerances();

        // Still-valid hysteresis: a previously validated piece that drifted
        // only slightly from its last valid pose skips the full match.
        if let (Some(target), Some(last)) = (self.bindings.target_of(id), last_valid) {
            let band = tolerances.scaled(self.config.hysteresis_mul);
            let close = dist(pose.position, last.position) <= band.position
                && feature_delta(shape, pose.rotation, pose.flip, last.rotation, last.flip)
                    <= band.rotation
                && pose.flip == last.flip;
            if close {
                self.mark_validated(id, target, Validation::Hysteresis, stats);
                return true;
            }
        }

        let direct = self.attempt_match(id, shape, &pose, &tolerances, stats);
        let direct_fallback = match direct {
            Ok(target) => {
                self.mark_validated(id, target, Validation::Direct, stats);
                self.sweep_group(id, groups, visited, stats, now);
                return true;
            }
            Err(fallback) => fallback,
        };

        let group = groups.iter().find(|g| g.contains(id));
        let mut mapped_fallback = None;
        if let Some(group) = group {
            if let Some(mapping) =
                derive_group_mapping(group, &self.pieces, &self.puzzle, &self.bindings, &self.config)
            {
                let mapped = mapping.map.apply(&pose);
                match self.attempt_match(id, shape, &mapped, &tolerances, stats) {
                    Ok(target) => {
                        self.mark_validated(id, target, Validation::Mapped, stats);
                        self.sweep_group(id, groups, visited, stats, now);
                        return true;
                    }
                    Err(fallback) => mapped_fallback = fallback,
                }
            }
        }

        let confidence = group.map_or(0.0, |g| g.confidence);
        if let Some((fault, target_pose)) = direct_fallback.or(mapped_fallback) {
            self.record_failure(id, fault, Some(target_pose), confidence, now, stats);
        }
        false
    }

    /// Compare a pose (observed or mapped) against this piece's bound
    /// target, or against every unconsumed slot of its shape, claiming the
    /// closest valid one. `Err` carries the most plausible failing slot for
    /// hint generation; `Err(None)` means the rejection was purely a
    /// binding conflict and stays silent.
    fn attempt_match(
        &mut self,
        id: PieceId,
        shape: PieceShape,
        pose: &Pose,
        tolerances: &Tolerances,
        stats: &mut PassStats,
    ) -> Result<TargetId, Option<(PlacementFault, Pose)>> {
        if let Some(target) = self.bindings.target_of(id) {
            let Some(slot) = self.puzzle.slot(target) else {
                return Err(None);
            };
            if slot.shape != shape {
                return Err(Some((PlacementFault::WrongPiece, slot.pose)));
            }
            let check = validate_pose(shape, pose, &slot.pose, tolerances);
            return match check.fault() {
                None => Ok(target),
                Some(fault) => Err(Some((fault, slot.pose))),
            };
        }

        let mut valid: Vec<(u64, TargetId)> = Vec::new();
        let mut best_fail: Option<(u64, PlacementFault, Pose)> = None;
        for slot in self.puzzle.slots_of_shape(shape) {
            let check = validate_pose(shape, pose, &slot.pose, tolerances);
            match check.fault() {
                None if !self.bindings.is_consumed(slot.id) => {
                    valid.push((ordered(check.position_error), slot.id));
                }
                None => {
                    // Geometrically fine but the slot is taken.
                    stats.n_binding_conflicts += 1;
                }
                Some(fault) => {
                    let key = ordered(check.position_error);
                    if best_fail.as_ref().is_none_or(|(k, _, _)| key < *k) {
                        best_fail = Some((key, fault, slot.pose));
                    }
                }
            }
        }

        valid.sort_unstable();
        for (_, target) in valid {
            if self.bindings.claim(id, target) {
                return Ok(target);
            }
            stats.n_binding_conflicts += 1;
        }
        Err(best_fail.map(|(_, fault, pose)| (fault, pose)))
    }

    fn mark_validated(
        &mut self,
        id: PieceId,
        target: TargetId,
        kind: Validation,
        stats: &mut PassStats,
    ) {
        let claimed = self.bindings.claim(id, target);
        debug_assert!(claimed, "validated piece must hold its binding");

        let state_changed;
        {
            let piece = self.pieces.get_mut(&id).expect("piece present");
            state_changed = piece.state != PieceState::Validated;
            piece.state = PieceState::Validated;
            piece.bound_target = Some(target);
            piece.invalid_streak = 0;
            piece.pending_validation = None;
            match kind {
                // The hysteresis short-circuit keeps the original valid
                // pose so slow drift cannot walk the band along with it.
                Validation::Hysteresis => {}
                Validation::Direct | Validation::Mapped => {
                    piece.last_valid_pose = Some(piece.pose);
                }
            }
        }
        match kind {
            Validation::Direct => stats.n_validated_direct += 1,
            Validation::Mapped => stats.n_validated_mapped += 1,
            Validation::Hysteresis => stats.n_validated_hysteresis += 1,
        }
        self.attempts.insert(id, 0);
        self.nudges.reset_piece(id);
        if state_changed {
            self.push_state_event(id, PieceState::Validated);
        }
        self.set_target_validity(target, true);
        tracing::debug!(piece = id, target, "piece validated");
    }

    /// After a new binding, re-validate the not-yet-valid members of the
    /// trigger's group once the refit has at least two supporting pairs.
    /// The trigger is excluded and the per-pass visited set bounds the
    /// sweep to a single non-recursive re-validation per piece.
    fn sweep_group(
        &mut self,
        trigger: PieceId,
        groups: &[ConstructionGroup],
        visited: &mut BTreeSet<PieceId>,
        stats: &mut PassStats,
        now: f64,
    ) {
        let Some(group) = groups.iter().find(|g| g.contains(trigger)) else {
            return;
        };
        let n_bound = group
            .members
            .iter()
            .filter(|m| {
                self.bindings.target_of(**m).is_some()
                    && self
                        .pieces
                        .get(*m)
                        .is_some_and(|p| p.state == PieceState::Validated)
            })
            .count();
        if n_bound < 2 {
            return;
        }
        stats.n_refine_sweeps += 1;

        let members: Vec<PieceId> = group
            .members
            .iter()
            .copied()
            .filter(|m| *m != trigger && !visited.contains(m))
            .collect();
        for member in members {
            self.validate_piece(member, groups, visited, stats, now);
        }
    }

    fn record_failure(
        &mut self,
        id: PieceId,
        fault: PlacementFault,
        target_pose: Option<Pose>,
        group_confidence: f64,
        now: f64,
        stats: &mut PassStats,
    ) {
        let attempts = {
            let counter = self.attempts.entry(id).or_insert(0);
            *counter += 1;
            *counter
        };

        let threshold = self.config.invalid_streak_threshold;
        let pose;
        let still_for;
        let mut became_invalid = false;
        let mut released = None;
        {
            let piece = self.pieces.get_mut(&id).expect("piece present");
            piece.invalid_streak += 1;
            pose = piece.pose;
            still_for = piece.still_for(now);
            if piece.invalid_streak > threshold {
                became_invalid = !matches!(piece.state, PieceState::Invalid(_));
                piece.state = PieceState::Invalid(fault);
                piece.last_valid_pose = None;
                piece.bound_target = None;
                released = self.bindings.release_piece(id);
            }
        }

        if became_invalid {
            stats.n_invalidated += 1;
            self.push_state_event(id, PieceState::Invalid(fault));
            tracing::debug!(piece = id, ?fault, "piece invalidated");
        }
        if let Some(target) = released {
            self.set_target_validity(target, false);
        }

        let ctx = NudgeContext {
            fault,
            piece_pose: &pose,
            target_pose: target_pose.as_ref(),
            group_confidence,
            attempts,
            still_for,
        };
        if let Some(content) = self.nudges.evaluate(id, &ctx, &self.config.nudge, now) {
            stats.n_nudges += 1;
            self.events.push_back(EngineEvent::Nudge { piece: id, content });
        }
    }

    fn flush_settled_nudges(&mut self, now: f64, stats: &mut PassStats) {
        let params = self.config.nudge;
        let candidates: Vec<(PieceId, f64)> = self
            .pieces
            .values()
            .filter(|p| p.state.can_validate())
            .map(|p| (p.id, p.still_for(now)))
            .collect();
        for (id, still_for) in candidates {
            if let Some(content) = self.nudges.take_settled(id, still_for, &params, now) {
                stats.n_nudges += 1;
                self.events.push_back(EngineEvent::Nudge { piece: id, content });
            }
        }
    }

    fn set_target_validity(&mut self, target: TargetId, is_valid: bool) {
        let changed = if is_valid {
            self.valid_targets.insert(target)
        } else {
            self.valid_targets.remove(&target)
        };
        if changed {
            self.events
                .push_back(EngineEvent::ValidationChanged { target, is_valid });
        }
    }

    fn check_completion(&mut self) {
        if self.completed || self.puzzle.n_slots() == 0 {
            return;
        }
        if self.valid_targets.len() == self.puzzle.n_slots() {
            self.completed = true;
            self.events.push_back(EngineEvent::PuzzleCompleted);
            tracing::info!(puzzle = %self.puzzle.name, "puzzle completed");
        }
    }

    fn push_state_event(&mut self, piece: PieceId, state: PieceState) {
        self.events
            .push_back(EngineEvent::PieceStateChanged { piece, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Difficulty;
    use crate::puzzle::TargetSlot;
    use nalgebra::{Rotation2, Vector2};

    /// Observe a piece appearing, moving to `pose`, and coming to rest.
    fn place(engine: &mut Engine, id: PieceId, shape: PieceShape, pose: Pose, t: f64) {
        engine.observe_piece(
            id,
            shape,
            [pose.position[0] + 0.5, pose.position[1] + 0.3],
            pose.rotation,
            pose.flip,
            t,
        );
        engine.observe_piece(id, shape, pose.position, pose.rotation, pose.flip, t + 0.05);
        engine.observe_piece(id, shape, pose.position, pose.rotation, pose.flip, t + 0.1);
    }

    fn displaced(pose: &Pose, theta: f64, t: [f64; 2]) -> Pose {
        let r = Rotation2::new(theta);
        let p = r * Vector2::new(pose.position[0], pose.position[1]);
        Pose {
            position: [p.x + t[0], p.y + t[1]],
            rotation: pose.rotation + theta,
            flip: pose.flip,
        }
    }

    fn slot_pose(engine: &Engine, id: TargetId) -> Pose {
        engine.puzzle().slot(id).unwrap().pose
    }

    #[test]
    fn seven_exact_pieces_complete_the_puzzle() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let slots: Vec<TargetSlot> = engine.puzzle().slots.clone();
        for (i, slot) in slots.iter().enumerate() {
            place(&mut engine, i as PieceId, slot.shape, slot.pose, i as f64);
        }
        engine.request_validation_pass(100.0);

        assert_eq!(engine.validated_targets().len(), 7);
        assert!(engine.is_completed());
        let events = engine.drain_events();
        let completions = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::PuzzleCompleted))
            .count();
        assert_eq!(completions, 1);
        for slot in &slots {
            assert!(events.iter().any(|e| {
                matches!(e, EngineEvent::ValidationChanged { target, is_valid: true } if *target == slot.id)
            }));
        }

        // A further pass must not re-announce completion.
        engine.request_validation_pass(101.0);
        assert!(engine
            .drain_events()
            .iter()
            .all(|e| !matches!(e, EngineEvent::PuzzleCompleted)));
    }

    #[test]
    fn single_piece_validates_directly_on_its_silhouette() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        place(&mut engine, 0, PieceShape::Square, target, 0.0);
        let stats = engine.request_validation_pass(1.0);

        assert_eq!(stats.n_validated_direct, 1);
        assert_eq!(engine.piece_state(0), PieceState::Validated);
        assert_eq!(engine.piece(0).unwrap().bound_target, Some(3));
        assert!(engine.validated_targets().contains(&3));
    }

    #[test]
    fn duplicate_shape_binding_is_stable() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let slot4 = slot_pose(&engine, 4);
        place(&mut engine, 0, PieceShape::SmallTriangle, slot4, 0.0);
        engine.request_validation_pass(1.0);
        assert_eq!(engine.piece(0).unwrap().bound_target, Some(4));

        // A second small triangle parks on the same silhouette: slot 4 is
        // consumed, slot 5 does not fit, so it cannot bind anywhere.
        place(&mut engine, 1, PieceShape::SmallTriangle, slot4, 2.0);
        let stats = engine.request_validation_pass(3.0);
        assert!(stats.n_binding_conflicts > 0);
        assert_eq!(engine.piece(1).unwrap().bound_target, None);
        assert_eq!(engine.piece_state(1), PieceState::Validating);

        // Drag the first piece far away until its binding is released.
        let far = Pose::new(3.0, 3.0, slot4.rotation, false);
        place(&mut engine, 0, PieceShape::SmallTriangle, far, 4.0);
        let threshold = engine.config().invalid_streak_threshold;
        for i in 0..=threshold {
            engine.request_validation_pass(5.0 + f64::from(i));
        }
        assert!(matches!(engine.piece_state(0), PieceState::Invalid(_)));
        assert_eq!(engine.piece(0).unwrap().bound_target, None);

        // Slot 4 is free again and the waiting piece claims it.
        engine.request_validation_pass(20.0);
        assert_eq!(engine.piece(1).unwrap().bound_target, Some(4));
        assert_eq!(engine.piece_state(1), PieceState::Validated);
    }

    #[test]
    fn displaced_cluster_validates_relatively() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let theta = 0.7;
        let offset = [2.0, 1.5];
        let s0 = displaced(&slot_pose(&engine, 0), theta, offset);
        let s1 = displaced(&slot_pose(&engine, 1), theta, offset);
        place(&mut engine, 0, PieceShape::LargeTriangle, s0, 0.0);
        place(&mut engine, 1, PieceShape::LargeTriangle, s1, 1.0);

        let stats = engine.request_validation_pass(2.0);
        assert_eq!(stats.n_validated_mapped, 2);
        assert_eq!(engine.piece(0).unwrap().bound_target, Some(0));
        assert_eq!(engine.piece(1).unwrap().bound_target, Some(1));
    }

    #[test]
    fn hysteresis_band_absorbs_drift_then_streak_invalidates() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        place(&mut engine, 0, PieceShape::Square, target, 0.0);
        engine.request_validation_pass(1.0);
        assert_eq!(engine.piece_state(0), PieceState::Validated);

        // Drift beyond the base tolerance but inside the 1.5x band.
        let band = engine.config().position_tolerance * engine.config().hysteresis_mul;
        let drift = Pose::new(
            target.position[0] + band - 0.01,
            target.position[1],
            target.rotation,
            false,
        );
        place(&mut engine, 0, PieceShape::Square, drift, 2.0);
        let stats = engine.request_validation_pass(3.0);
        assert_eq!(stats.n_validated_hysteresis, 1);
        assert_eq!(engine.piece_state(0), PieceState::Validated);

        // Far outside any band: the streak eventually invalidates.
        let far = Pose::new(
            target.position[0] + 0.5,
            target.position[1],
            target.rotation,
            false,
        );
        place(&mut engine, 0, PieceShape::Square, far, 4.0);
        let threshold = engine.config().invalid_streak_threshold;
        for i in 0..=threshold {
            engine.request_validation_pass(5.0 + f64::from(i));
        }
        assert!(matches!(
            engine.piece_state(0),
            PieceState::Invalid(PlacementFault::WrongPosition { .. })
        ));
        assert!(engine.validated_targets().is_empty());
    }

    #[test]
    fn rapid_observations_debounce_to_one_validation() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);

        engine.observe_piece(0, PieceShape::Square, [2.0, 2.0], 0.0, false, 0.0);
        engine.observe_piece(0, PieceShape::Square, [1.5, 1.0], target.rotation, false, 0.1);
        engine.observe_piece(
            0,
            PieceShape::Square,
            target.position,
            target.rotation,
            false,
            0.2,
        );
        engine.observe_piece(
            0,
            PieceShape::Square,
            target.position,
            target.rotation,
            false,
            0.25,
        );
        assert_eq!(engine.piece_state(0), PieceState::Placed);

        // Jitter before the deadline neither validates nor re-arms.
        engine.observe_piece(
            0,
            PieceShape::Square,
            [target.position[0] + 0.004, target.position[1]],
            target.rotation,
            false,
            0.4,
        );
        assert_eq!(engine.piece_state(0), PieceState::Placed);
        let premature = engine
            .drain_events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    EngineEvent::PieceStateChanged {
                        state: PieceState::Validated,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(premature, 0);

        // First observation past the deadline runs exactly one validation,
        // using the last-reported pose.
        engine.observe_piece(
            0,
            PieceShape::Square,
            target.position,
            target.rotation,
            false,
            1.0,
        );
        assert_eq!(engine.piece_state(0), PieceState::Validated);
        let validated = engine
            .drain_events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    EngineEvent::PieceStateChanged {
                        state: PieceState::Validated,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(validated, 1);
    }

    #[test]
    fn wrong_rotation_nudges_with_specific_hint() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        let rotated = Pose::new(
            target.position[0],
            target.position[1],
            target.rotation + 30f64.to_radians(),
            false,
        );
        place(&mut engine, 0, PieceShape::Square, rotated, 0.0);
        engine.request_validation_pass(1.0);

        let events = engine.drain_events();
        let nudge = events
            .iter()
            .find_map(|e| match e {
                EngineEvent::Nudge { content, .. } => Some(content.clone()),
                _ => None,
            })
            .expect("rotation failure must nudge");
        assert_eq!(nudge.level, crate::nudge::NudgeLevel::Specific);
        assert!(nudge.message.contains("rotating"));
        assert_eq!(engine.piece_state(0), PieceState::Validating);
    }

    #[test]
    fn config_swap_preserves_in_flight_state() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        place(&mut engine, 0, PieceShape::Square, target, 0.0);
        engine.request_validation_pass(1.0);
        assert_eq!(engine.piece_state(0), PieceState::Validated);

        let mut bad = EngineConfig::default();
        bad.position_tolerance = -1.0;
        assert!(engine.set_config(bad).is_err());
        assert!(engine.config().position_tolerance > 0.0);

        engine
            .set_config(EngineConfig::for_difficulty(Difficulty::Hard))
            .expect("valid preset");
        assert_eq!(engine.piece_state(0), PieceState::Validated);
        assert_eq!(engine.piece(0).unwrap().bound_target, Some(3));
    }

    #[test]
    fn load_puzzle_resets_everything() {
        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        place(&mut engine, 0, PieceShape::Square, target, 0.0);
        engine.request_validation_pass(1.0);
        assert!(!engine.validated_targets().is_empty());

        engine.load_puzzle(PuzzleLayout::default());
        assert!(engine.validated_targets().is_empty());
        assert_eq!(engine.piece_state(0), PieceState::Unobserved);
        assert!(!engine.is_completed());
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn detection_noise_does_not_flicker_validation() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut engine = Engine::new(PuzzleLayout::default());
        let target = slot_pose(&engine, 3);
        place(&mut engine, 0, PieceShape::Square, target, 0.0);
        engine.request_validation_pass(1.0);
        assert_eq!(engine.piece_state(0), PieceState::Validated);
        engine.drain_events();

        // Re-detection noise well inside the jitter radius must not move
        // the piece through the state machine at all.
        let mut rng = StdRng::seed_from_u64(7);
        let noise = engine.config().grouping.jitter_radius * 0.3;
        for i in 0..50 {
            let t = 2.0 + i as f64 * 0.05;
            let dx = rng.gen_range(-noise..noise);
            let dy = rng.gen_range(-noise..noise);
            engine.observe_piece(
                0,
                PieceShape::Square,
                [target.position[0] + dx, target.position[1] + dy],
                target.rotation,
                false,
                t,
            );
        }
        engine.request_validation_pass(10.0);

        assert_eq!(engine.piece_state(0), PieceState::Validated);
        let flickers = engine
            .drain_events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::ValidationChanged { .. }))
            .count();
        assert_eq!(flickers, 0);
    }

    #[test]
    fn non_finite_observations_are_normalized() {
        let mut engine = Engine::new(PuzzleLayout::default());

        engine.observe_piece(0, PieceShape::Square, [f64::NAN, 0.0], 0.0, false, 0.0);
        assert_eq!(engine.piece_state(0), PieceState::Unobserved);

        engine.observe_piece(0, PieceShape::Square, [0.2, 0.2], 0.0, false, 0.1);
        engine.observe_piece(
            0,
            PieceShape::Square,
            [f64::INFINITY, 0.5],
            f64::NAN,
            false,
            0.2,
        );
        let piece = engine.piece(0).unwrap();
        assert_eq!(piece.pose.position, [0.2, 0.5]);
        assert_eq!(piece.pose.rotation, 0.0);

        engine.observe_piece(0, PieceShape::Square, [0.2, 0.5], 2.0, false, f64::NAN);
        assert_eq!(engine.piece(0).unwrap().pose.rotation, 0.0);
    }
}

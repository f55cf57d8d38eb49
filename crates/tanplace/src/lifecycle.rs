//! Per-piece lifecycle state machine.
//!
//! Observations arrive as a pose stream with no explicit pick-up/release
//! events, so motion is inferred: an observation that moves a piece beyond
//! the jitter radius marks it in motion, and a motionless observation of a
//! moving piece marks it released, starting the placement debounce.

use crate::config::EngineConfig;
use crate::geometry::{dist, feature_delta, wrap_two_pi, PieceShape, Pose};
use crate::validator::PlacementFault;

/// Identifier of a piece instance.
pub type PieceId = u32;

/// Lifecycle state of one piece.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PieceState {
    /// Never observed since the last puzzle load.
    Unobserved,
    /// Observed at least once, never moved.
    Detected,
    /// Currently in motion.
    Moved,
    /// At rest, placement debounce running.
    Placed,
    /// Debounce elapsed; being validated, not yet decided.
    Validating,
    /// Matched and bound to a target slot.
    Validated,
    /// Rejected after the invalid streak exceeded its threshold.
    Invalid(PlacementFault),
}

impl PieceState {
    /// Whether a validation attempt is permitted in this state.
    /// Validated pieces are not re-examined until they move again.
    pub fn can_validate(self) -> bool {
        matches!(
            self,
            PieceState::Placed | PieceState::Validating | PieceState::Invalid(_)
        )
    }

    /// Whether the piece participates in construction-group clustering.
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            PieceState::Placed
                | PieceState::Validating
                | PieceState::Validated
                | PieceState::Invalid(_)
        )
    }
}

/// One tracked piece: identity, latest sanitized pose, lifecycle state and
/// hysteresis bookkeeping.
#[derive(Debug, Clone)]
pub struct PieceInstance {
    pub id: PieceId,
    pub shape: PieceShape,
    pub pose: Pose,
    pub state: PieceState,
    /// Target bound on first successful match; cleared only on
    /// invalidation or puzzle reset.
    pub bound_target: Option<crate::puzzle::TargetId>,
    /// Pose at the most recent full validation, for the hysteresis band.
    pub last_valid_pose: Option<Pose>,
    /// Consecutive failed validation passes.
    pub invalid_streak: u32,
    /// Time of the last observation that counted as motion.
    pub last_motion_time: f64,
    /// Time of the most recent observation.
    pub last_observed_time: f64,
    /// Pending placement-debounce deadline. At most one per piece; any
    /// motion clears it.
    pub pending_validation: Option<f64>,
}

/// Outcome of feeding one observation through the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationOutcome {
    /// The piece moved beyond the jitter radius.
    pub moved: bool,
    /// State changed (worth an event).
    pub state_changed: bool,
    /// The piece left `Validated` because of this observation.
    pub left_validated: bool,
}

impl PieceInstance {
    pub fn new(id: PieceId, shape: PieceShape, pose: Pose, now: f64) -> Self {
        Self {
            id,
            shape,
            pose,
            state: PieceState::Detected,
            bound_target: None,
            last_valid_pose: None,
            invalid_streak: 0,
            last_motion_time: now,
            last_observed_time: now,
            pending_validation: None,
        }
    }

    /// Sanitize a raw observed pose against this piece's last known pose.
    /// Non-finite components fall back to the previous value; rotation is
    /// wrapped into [0, 2π); flip is coerced off for achiral shapes.
    pub fn sanitize(&self, raw: &Pose) -> Pose {
        sanitize_pose(self.shape, raw, Some(&self.pose))
    }

    /// Apply a sanitized observation at time `now`.
    pub fn apply_observation(
        &mut self,
        pose: Pose,
        now: f64,
        config: &EngineConfig,
    ) -> ObservationOutcome {
        let now = now.max(self.last_observed_time);
        let moved = self.counts_as_motion(&pose, config);
        let prev_state = self.state;
        let mut left_validated = false;

        self.pose = pose;
        self.last_observed_time = now;

        if moved {
            self.last_motion_time = now;
            self.pending_validation = None;
            self.invalid_streak = 0;
            if self.state == PieceState::Validated {
                left_validated = true;
            }
            self.state = PieceState::Moved;
        } else if self.state == PieceState::Moved {
            // Came to rest: arm the debounce.
            self.state = PieceState::Placed;
            self.pending_validation = Some(now + config.placement_delay);
        }

        ObservationOutcome {
            moved,
            state_changed: self.state != prev_state,
            left_validated,
        }
    }

    /// Whether the placement debounce has elapsed, scheduling this piece
    /// for event-driven validation. Pieces already `Validating` or
    /// `Invalid` retry on batch passes instead.
    pub fn debounce_elapsed(&self, now: f64) -> bool {
        self.state == PieceState::Placed
            && self
                .pending_validation
                .is_some_and(|deadline| now >= deadline)
    }

    /// Seconds the piece has been motionless at `now`.
    pub fn still_for(&self, now: f64) -> f64 {
        (now - self.last_motion_time).max(0.0)
    }

    fn counts_as_motion(&self, pose: &Pose, config: &EngineConfig) -> bool {
        if dist(pose.position, self.pose.position) > config.grouping.jitter_radius {
            return true;
        }
        if pose.flip != self.pose.flip {
            return true;
        }
        let angular_jitter = config.rotation_tolerance_rad() * 0.25;
        feature_delta(
            self.shape,
            pose.rotation,
            pose.flip,
            self.pose.rotation,
            self.pose.flip,
        ) > angular_jitter
    }
}

/// Sanitize a pose with no prior observation to fall back on.
pub fn sanitize_pose(shape: PieceShape, raw: &Pose, previous: Option<&Pose>) -> Pose {
    let fallback = previous.copied().unwrap_or(Pose::new(0.0, 0.0, 0.0, false));
    let x = if raw.position[0].is_finite() {
        raw.position[0]
    } else {
        fallback.position[0]
    };
    let y = if raw.position[1].is_finite() {
        raw.position[1]
    } else {
        fallback.position[1]
    };
    let rotation = if raw.rotation.is_finite() {
        wrap_two_pi(raw.rotation)
    } else {
        fallback.rotation
    };
    let flip = raw.flip && shape.is_chiral();
    Pose {
        position: [x, y],
        rotation,
        flip,
    }
}

//! Graduated hint escalation.
//!
//! Consumes validation failures plus group confidence and retry history,
//! and decides whether (and how loudly) to hint. Stateful per piece:
//! cooldowns, an orientation signature for the one-shot "looks correct"
//! acknowledgment, and a buffer holding directed/solution hints until the
//! piece stops moving.

use std::collections::BTreeMap;

use crate::config::NudgeParams;
use crate::geometry::Pose;
use crate::lifecycle::PieceId;
use crate::validator::PlacementFault;

/// Hint intrusiveness, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeLevel {
    None,
    /// Pulse/highlight the piece.
    Visual,
    /// Short encouraging text.
    Gentle,
    /// Orientation-specific text.
    Specific,
    /// Arrow toward the true target.
    Directed,
    /// Ghost overlay of the exact target pose.
    Solution,
}

/// One hint ready for presentation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NudgeContent {
    pub level: NudgeLevel,
    pub message: String,
    /// Unit-ish vector from the piece toward its target, for `Directed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<[f64; 2]>,
    /// Exact target pose, for `Solution`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ghost_pose: Option<Pose>,
    /// Suggested display duration, seconds.
    pub duration: f64,
}

/// Inputs for one escalation decision.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NudgeContext<'a> {
    pub fault: PlacementFault,
    pub piece_pose: &'a Pose,
    /// Pose of the bound or best-candidate target, when one is known.
    pub target_pose: Option<&'a Pose>,
    pub group_confidence: f64,
    pub attempts: u32,
    /// Seconds since the piece last moved.
    pub still_for: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrientationSignature {
    rotation_deg: i32,
    flip: bool,
}

impl OrientationSignature {
    fn of(pose: &Pose) -> Self {
        Self {
            rotation_deg: pose.rotation.to_degrees().round() as i32,
            flip: pose.flip,
        }
    }
}

/// Per-piece escalation state.
#[derive(Debug, Default)]
pub(crate) struct NudgeEscalator {
    last_emitted: BTreeMap<PieceId, f64>,
    acknowledged: BTreeMap<PieceId, OrientationSignature>,
    buffered: BTreeMap<PieceId, NudgeContent>,
}

impl NudgeEscalator {
    /// Evaluate one failed validation. Returns a hint to surface, or `None`
    /// while cooling down, buffering, or below the visual threshold.
    pub(crate) fn evaluate(
        &mut self,
        piece: PieceId,
        ctx: &NudgeContext<'_>,
        params: &NudgeParams,
        now: f64,
    ) -> Option<NudgeContent> {
        if self
            .last_emitted
            .get(&piece)
            .is_some_and(|&t| now - t < params.cooldown)
        {
            return None;
        }

        let level = escalation_level(ctx);
        if level == NudgeLevel::None {
            return None;
        }

        // "Orientation looks right, just slide it" is acknowledged once per
        // orientation; repeating it every pass is noise.
        let signature = OrientationSignature::of(ctx.piece_pose);
        let orientation_correct = matches!(ctx.fault, PlacementFault::WrongPosition { .. });
        if orientation_correct && level < NudgeLevel::Directed {
            if self.acknowledged.get(&piece) == Some(&signature) {
                return None;
            }
            self.acknowledged.insert(piece, signature);
        } else if !orientation_correct {
            self.acknowledged.remove(&piece);
        }

        let content = build_content(ctx, level, params);

        // Directed and solution hints wait for the piece to settle; surface
        // the buffered hint once motion stops.
        if level >= NudgeLevel::Directed && ctx.still_for < params.settle_window {
            self.buffered.insert(piece, content);
            return None;
        }
        self.buffered.remove(&piece);

        self.last_emitted.insert(piece, now);
        tracing::debug!(piece, ?level, "nudge emitted");
        Some(content)
    }

    /// Flush a buffered directed/solution hint once the piece has settled.
    pub(crate) fn take_settled(
        &mut self,
        piece: PieceId,
        still_for: f64,
        params: &NudgeParams,
        now: f64,
    ) -> Option<NudgeContent> {
        if still_for < params.settle_window {
            return None;
        }
        let content = self.buffered.remove(&piece)?;
        self.last_emitted.insert(piece, now);
        Some(content)
    }

    /// Forget all state for a piece (validated, or puzzle reset).
    pub(crate) fn reset_piece(&mut self, piece: PieceId) {
        self.last_emitted.remove(&piece);
        self.acknowledged.remove(&piece);
        self.buffered.remove(&piece);
    }

    pub(crate) fn clear(&mut self) {
        self.last_emitted.clear();
        self.acknowledged.clear();
        self.buffered.clear();
    }
}

/// Level selection: monotonic in confidence-weighted attempts, overridden
/// upward for orientation faults.
fn escalation_level(ctx: &NudgeContext<'_>) -> NudgeLevel {
    let weighted = ctx.attempts as f64 * (0.5 + ctx.group_confidence);
    let base = if weighted < 1.0 {
        NudgeLevel::None
    } else if weighted < 3.0 {
        NudgeLevel::Visual
    } else if weighted < 5.0 {
        NudgeLevel::Gentle
    } else if weighted < 8.0 {
        NudgeLevel::Specific
    } else if weighted < 12.0 {
        NudgeLevel::Directed
    } else {
        NudgeLevel::Solution
    };

    match ctx.fault {
        PlacementFault::WrongRotation { .. } | PlacementFault::NeedsFlip
            if base < NudgeLevel::Specific && ctx.attempts >= 1 =>
        {
            NudgeLevel::Specific
        }
        _ => base,
    }
}

fn build_content(ctx: &NudgeContext<'_>, level: NudgeLevel, params: &NudgeParams) -> NudgeContent {
    let message = match (level, ctx.fault) {
        (NudgeLevel::Visual, _) => "Keep going!".to_string(),
        (NudgeLevel::Gentle, _) => "Almost there, try adjusting that piece.".to_string(),
        (_, PlacementFault::NeedsFlip) => "This piece needs to be flipped over.".to_string(),
        (_, PlacementFault::WrongRotation { degrees_off }) => {
            format!("Try rotating it about {:.0} degrees.", degrees_off.abs())
        }
        (_, PlacementFault::WrongPosition { .. }) if level == NudgeLevel::Specific => {
            "The orientation looks right, slide it into place.".to_string()
        }
        (NudgeLevel::Directed, _) => "Move it toward the highlighted spot.".to_string(),
        (NudgeLevel::Solution, _) => "Here is exactly where it goes.".to_string(),
        (_, PlacementFault::WrongPiece) => "A different piece goes there.".to_string(),
        _ => "Try adjusting that piece.".to_string(),
    };

    let direction = match (level, ctx.target_pose) {
        (NudgeLevel::Directed | NudgeLevel::Solution, Some(target)) => {
            let dx = target.position[0] - ctx.piece_pose.position[0];
            let dy = target.position[1] - ctx.piece_pose.position[1];
            let norm = (dx * dx + dy * dy).sqrt();
            (norm > 1e-9).then(|| [dx / norm, dy / norm])
        }
        _ => None,
    };
    let ghost_pose = match (level, ctx.target_pose) {
        (NudgeLevel::Solution, Some(target)) => Some(*target),
        _ => None,
    };

    NudgeContent {
        level,
        message,
        direction,
        ghost_pose,
        duration: params.display_duration,
    }
}

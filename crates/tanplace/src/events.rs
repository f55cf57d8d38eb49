use crate::lifecycle::{PieceId, PieceState};
use crate::nudge::NudgeContent;
use crate::puzzle::TargetId;

/// Outbound notifications, queued by the engine and drained by the caller.
///
/// No global bus: collaborators poll [`crate::Engine::drain_events`] after
/// each entry-point call, or use the pull-based getters.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    /// A target slot's validated occupancy changed.
    ValidationChanged { target: TargetId, is_valid: bool },
    /// A piece crossed a lifecycle transition.
    PieceStateChanged { piece: PieceId, state: PieceState },
    /// A hint should be displayed for a piece.
    Nudge { piece: PieceId, content: NudgeContent },
    /// Every slot is consumed by a valid, bound piece. Emitted exactly once
    /// per loaded puzzle.
    PuzzleCompleted,
}

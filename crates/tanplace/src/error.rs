use thiserror::Error;

/// Errors surfaced by the engine's configuration and puzzle-loading entry
/// points.
///
/// Steady-state validation never fails with an `Err`; per-piece outcomes are
/// carried in [`crate::validator::PoseCheck`] and the piece lifecycle state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A tolerance or timing parameter is non-finite or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The supplied target set cannot describe a tangram puzzle.
    #[error("malformed puzzle: {0}")]
    MalformedPuzzle(String),

    /// Puzzle layout JSON could not be read or parsed.
    #[error("puzzle io: {0}")]
    PuzzleIo(String),
}

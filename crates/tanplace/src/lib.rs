//! tanplace — placement validation and relative-mapping engine for tangram
//! assembly.
//!
//! The engine consumes already-estimated piece poses (position, rotation,
//! mirror flip) and continuously decides which pieces satisfy which target
//! slots. The stages are:
//!
//! 1. **Lifecycle** — per-piece state machine with motion inference and a
//!    placement debounce.
//! 2. **Validator** — pure pose-vs-target check in feature-angle space with
//!    an edge-contact rescue.
//! 3. **Groups** — contact-graph clustering of resting pieces into
//!    construction groups with a stability confidence.
//! 4. **Mapping** — per-group anchor matching and least-squares rigid
//!    refinement, validating assemblies wherever they sit on the table.
//! 5. **Nudge** — graduated hint escalation fed by validation failures.
//!
//! # Public API
//! The stable surface is intentionally small:
//! - [`Engine`] as the primary entry point
//! - [`PuzzleLayout`] / [`TargetSlot`] for target sets
//! - [`EngineConfig`] and [`Difficulty`] for tuning
//! - [`EngineEvent`] plus the pull-based getters for results
//!
//! [`AnchorMapping`] and [`RigidMap`] are exposed read-only for diagnostics;
//! the low-level polygon and clustering helpers stay private.

mod config;
mod engine;
mod error;
mod events;
mod geometry;
mod groups;
mod lifecycle;
mod mapping;
mod nudge;
mod puzzle;
mod validator;

pub use config::{Difficulty, EngineConfig, GroupingParams, MappingParams, NudgeParams};
pub use engine::{Engine, PassStats};
pub use error::EngineError;
pub use events::EngineEvent;
pub use geometry::{PieceShape, Pose};
pub use groups::ConstructionGroup;
pub use lifecycle::{PieceId, PieceInstance, PieceState};
pub use mapping::{AnchorMapping, RigidMap};
pub use nudge::{NudgeContent, NudgeLevel};
pub use puzzle::{PuzzleLayout, TargetId, TargetSlot};
pub use validator::{validate_pose, PlacementFault, PoseCheck, Tolerances};

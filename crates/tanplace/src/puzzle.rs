//! Puzzle target layout.
//!
//! Puzzle JSON follows a versioned schema (`tanplace.puzzle.v1`): a named
//! list of target slots, each a shape plus canonical pose in puzzle space.
//! Slots are read-only once loaded; consumption state lives in the engine,
//! never here.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_4, PI};
use std::path::Path;

use crate::error::EngineError;
use crate::geometry::{PieceShape, Pose};

const PUZZLE_SCHEMA_V1: &str = "tanplace.puzzle.v1";

/// Identifier of a target slot. Distinct even for same-shape duplicates.
pub type TargetId = u32;

/// A required destination pose for one piece shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetSlot {
    pub id: TargetId,
    pub shape: PieceShape,
    pub pose: Pose,
}

/// Immutable target set for one puzzle.
#[derive(Debug, Clone)]
pub struct PuzzleLayout {
    pub name: String,
    pub slots: Vec<TargetSlot>,

    /// Fast lookup: slot ID -> index into `slots`.
    id_to_idx: HashMap<TargetId, usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct PuzzleSpecV1 {
    schema: String,
    name: String,
    slots: Vec<SlotSpecV1>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotSpecV1 {
    id: TargetId,
    shape: PieceShape,
    position: [f64; 2],
    rotation: f64,
    #[serde(default)]
    flip: bool,
}

impl PuzzleLayout {
    /// Build a layout from already-constructed slots, validating the set.
    pub fn from_slots(name: impl Into<String>, slots: Vec<TargetSlot>) -> Result<Self, EngineError> {
        let name = name.into();
        validate_slots(&name, &slots)?;
        let id_to_idx = slots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        Ok(Self {
            name,
            slots,
            id_to_idx,
        })
    }

    /// Load a puzzle layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| EngineError::PuzzleIo(e.to_string()))?;
        Self::from_json_str(&data)
    }

    /// Parse a puzzle layout from JSON text.
    pub fn from_json_str(data: &str) -> Result<Self, EngineError> {
        let spec: PuzzleSpecV1 =
            serde_json::from_str(data).map_err(|e| EngineError::PuzzleIo(e.to_string()))?;
        if spec.schema != PUZZLE_SCHEMA_V1 {
            return Err(EngineError::MalformedPuzzle(format!(
                "unsupported puzzle schema '{}' (expected '{}')",
                spec.schema, PUZZLE_SCHEMA_V1
            )));
        }
        let slots = spec
            .slots
            .into_iter()
            .map(|s| TargetSlot {
                id: s.id,
                shape: s.shape,
                pose: Pose {
                    position: s.position,
                    rotation: s.rotation,
                    flip: s.flip,
                },
            })
            .collect();
        Self::from_slots(spec.name, slots)
    }

    /// Serialize this layout as schema-v1 JSON.
    pub fn to_json_string(&self) -> String {
        let spec = PuzzleSpecV1 {
            schema: PUZZLE_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            slots: self
                .slots
                .iter()
                .map(|s| SlotSpecV1 {
                    id: s.id,
                    shape: s.shape,
                    position: s.pose.position,
                    rotation: s.pose.rotation,
                    flip: s.pose.flip,
                })
                .collect(),
        };
        serde_json::to_string_pretty(&spec).expect("puzzle spec serializes")
    }

    /// Look up a slot by ID.
    pub fn slot(&self, id: TargetId) -> Option<&TargetSlot> {
        self.id_to_idx.get(&id).map(|&idx| &self.slots[idx])
    }

    /// Total number of target slots.
    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    /// Iterator over slots of one shape, in id order.
    pub fn slots_of_shape(&self, shape: PieceShape) -> impl Iterator<Item = &TargetSlot> + '_ {
        self.slots.iter().filter(move |s| s.shape == shape)
    }

    /// Iterator over all slot IDs.
    pub fn slot_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.slots.iter().map(|s| s.id)
    }
}

impl Default for PuzzleLayout {
    /// The classic square: all seven tans assembled into the unit square
    /// with corners (0,0) and (1,1).
    fn default() -> Self {
        let slots = vec![
            slot(0, PieceShape::LargeTriangle, 1.0 / 6.0, 0.5, 0.75 * PI, false),
            slot(1, PieceShape::LargeTriangle, 0.5, 1.0 / 6.0, 1.25 * PI, false),
            slot(2, PieceShape::MediumTriangle, 5.0 / 6.0, 5.0 / 6.0, PI, false),
            slot(3, PieceShape::Square, 0.75, 0.5, FRAC_PI_4, false),
            slot(4, PieceShape::SmallTriangle, 11.0 / 12.0, 0.25, 1.75 * PI, false),
            slot(5, PieceShape::SmallTriangle, 0.5, 2.0 / 3.0, FRAC_PI_4, false),
            slot(6, PieceShape::Parallelogram, 0.375, 0.875, 0.0, true),
        ];
        Self::from_slots("classic-square", slots).expect("default puzzle must be valid")
    }
}

fn slot(id: TargetId, shape: PieceShape, x: f64, y: f64, rotation: f64, flip: bool) -> TargetSlot {
    TargetSlot {
        id,
        shape,
        pose: Pose::new(x, y, rotation, flip),
    }
}

fn validate_slots(name: &str, slots: &[TargetSlot]) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::MalformedPuzzle(
            "puzzle name must not be empty".to_string(),
        ));
    }
    if slots.is_empty() {
        return Err(EngineError::MalformedPuzzle(
            "puzzle must have at least one slot".to_string(),
        ));
    }

    let mut seen = HashMap::new();
    for s in slots {
        if seen.insert(s.id, ()).is_some() {
            return Err(EngineError::MalformedPuzzle(format!(
                "duplicate slot id {}",
                s.id
            )));
        }
        if !s.pose.position[0].is_finite()
            || !s.pose.position[1].is_finite()
            || !s.pose.rotation.is_finite()
        {
            return Err(EngineError::MalformedPuzzle(format!(
                "slot {} has a non-finite pose",
                s.id
            )));
        }
        if s.pose.flip && !s.shape.is_chiral() {
            return Err(EngineError::MalformedPuzzle(format!(
                "slot {} flips a shape with no flip parity",
                s.id
            )));
        }
    }

    for shape in PieceShape::ALL {
        let n = slots.iter().filter(|s| s.shape == shape).count();
        if n > shape.physical_count() {
            return Err(EngineError::MalformedPuzzle(format!(
                "{n} slots of shape {shape:?} exceed the physical set ({})",
                shape.physical_count()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{polygon_min_distance, transformed_vertices};

    #[test]
    fn default_puzzle_has_seven_slots() {
        let p = PuzzleLayout::default();
        assert_eq!(p.n_slots(), 7);
        assert_eq!(p.slots_of_shape(PieceShape::LargeTriangle).count(), 2);
        assert_eq!(p.slots_of_shape(PieceShape::SmallTriangle).count(), 2);
        assert_eq!(p.slots_of_shape(PieceShape::Parallelogram).count(), 1);
        assert_eq!(p.slot(6).unwrap().shape, PieceShape::Parallelogram);
        assert!(p.slot(6).unwrap().pose.flip);
        assert_eq!(p.slot(99), None);
    }

    #[test]
    fn default_puzzle_pieces_stay_inside_the_unit_square() {
        let p = PuzzleLayout::default();
        for s in &p.slots {
            for v in transformed_vertices(s.shape, &s.pose) {
                assert!(v[0] > -1e-9 && v[0] < 1.0 + 1e-9, "slot {} x {}", s.id, v[0]);
                assert!(v[1] > -1e-9 && v[1] < 1.0 + 1e-9, "slot {} y {}", s.id, v[1]);
            }
        }
    }

    #[test]
    fn default_puzzle_neighbors_touch() {
        // The two large triangles share the full anti-diagonal cut.
        let p = PuzzleLayout::default();
        let a = p.slot(0).unwrap();
        let b = p.slot(1).unwrap();
        let d = polygon_min_distance(
            &transformed_vertices(a.shape, &a.pose),
            &transformed_vertices(b.shape, &b.pose),
        );
        assert!(d < 1e-9, "gap {d}");
    }

    #[test]
    fn json_roundtrip_preserves_slots() {
        let p = PuzzleLayout::default();
        let text = p.to_json_string();
        let q = PuzzleLayout::from_json_str(&text).expect("roundtrip");
        assert_eq!(q.name, p.name);
        assert_eq!(q.n_slots(), p.n_slots());
        for (a, b) in p.slots.iter().zip(&q.slots) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.shape, b.shape);
            assert_eq!(a.pose, b.pose);
        }
    }

    #[test]
    fn rejects_wrong_schema() {
        let raw = r#"{"schema":"tanplace.puzzle.v0","name":"x","slots":[]}"#;
        let err = PuzzleLayout::from_json_str(raw).expect_err("schema");
        assert!(err.to_string().contains("unsupported puzzle schema"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = r#"{"schema":"tanplace.puzzle.v1","name":"x","slots":[],"extra":1}"#;
        assert!(PuzzleLayout::from_json_str(raw).is_err());
    }

    #[test]
    fn rejects_duplicate_slot_ids() {
        let slots = vec![
            slot(0, PieceShape::SmallTriangle, 0.0, 0.0, 0.0, false),
            slot(0, PieceShape::SmallTriangle, 0.5, 0.5, 0.0, false),
        ];
        assert!(PuzzleLayout::from_slots("dup", slots).is_err());
    }

    #[test]
    fn rejects_too_many_slots_of_one_shape() {
        let slots = vec![
            slot(0, PieceShape::Square, 0.0, 0.0, 0.0, false),
            slot(1, PieceShape::Square, 0.5, 0.5, 0.0, false),
        ];
        assert!(PuzzleLayout::from_slots("two-squares", slots).is_err());
    }

    #[test]
    fn rejects_non_finite_pose() {
        let slots = vec![slot(0, PieceShape::Square, f64::NAN, 0.0, 0.0, false)];
        assert!(PuzzleLayout::from_slots("nan", slots).is_err());
    }

    #[test]
    fn rejects_flip_on_achiral_shape() {
        let slots = vec![slot(0, PieceShape::Square, 0.2, 0.2, 0.0, true)];
        assert!(PuzzleLayout::from_slots("flip-square", slots).is_err());
    }
}

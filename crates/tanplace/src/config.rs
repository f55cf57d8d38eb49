use crate::error::EngineError;

/// Clustering and stability parameters for construction groups.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct GroupingParams {
    /// Boundary distance (puzzle units) under which two placed pieces are
    /// considered connected. Slightly larger than the validator's
    /// edge-contact tolerance so pieces about to be nudged into contact
    /// already cluster together.
    pub connection_threshold: f64,
    /// Positional jitter radius: observations moving less than this do not
    /// count as motion.
    pub jitter_radius: f64,
    /// Seconds of member stillness for group confidence to ramp from 0 to 1.
    pub confidence_ramp: f64,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            connection_threshold: 0.05,
            jitter_radius: 0.012,
            confidence_ramp: 3.0,
        }
    }
}

/// Controls for anchor matching and relative-mapping derivation.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MappingParams {
    /// Multiplier on the rotation tolerance when matching an anchor to a
    /// candidate target slot.
    pub relaxed_rotation_mul: f64,
    /// Multiplier on the position tolerance for the anchor-match centroid
    /// proximity precondition.
    pub anchor_proximity_mul: f64,
    /// Group confidence at or above which the adjacency precondition is
    /// waived.
    pub high_confidence: f64,
}

impl Default for MappingParams {
    fn default() -> Self {
        Self {
            relaxed_rotation_mul: 2.0,
            anchor_proximity_mul: 2.5,
            high_confidence: 0.8,
        }
    }
}

/// Timing and presentation parameters for hint escalation.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct NudgeParams {
    /// Minimum seconds between nudges for the same piece.
    pub cooldown: f64,
    /// Seconds a piece must be motionless before directed/solution level
    /// nudges are surfaced.
    pub settle_window: f64,
    /// Suggested display duration of an emitted nudge, in seconds.
    pub display_duration: f64,
}

impl Default for NudgeParams {
    fn default() -> Self {
        Self {
            cooldown: 1.2,
            settle_window: 0.4,
            display_duration: 2.5,
        }
    }
}

/// Difficulty preset selecting how forgiving the validator is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Standard,
    Hard,
}

/// Top-level engine configuration.
///
/// Distances are in puzzle units (the assembled square's side is 1), times
/// in seconds. Build via [`EngineConfig::for_difficulty`] and override
/// individual fields afterwards.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Maximum centroid offset for a position match.
    pub position_tolerance: f64,
    /// Maximum feature-angle error for a rotation match, in degrees.
    pub rotation_tolerance_deg: f64,
    /// Boundary-contact distance that rescues a position check whose
    /// centroids are offset by the piece's own geometry.
    pub edge_contact_tolerance: f64,
    /// Consecutive failed validation passes before a piece is marked
    /// invalid.
    pub invalid_streak_threshold: u32,
    /// Debounce delay between a piece coming to rest and validation,
    /// in seconds.
    pub placement_delay: f64,
    /// Tolerance multiplier for the still-valid hysteresis band around a
    /// previously validated pose.
    pub hysteresis_mul: f64,
    /// Construction-group clustering parameters.
    pub grouping: GroupingParams,
    /// Relative-mapping parameters.
    pub mapping: MappingParams,
    /// Hint escalation parameters.
    pub nudge: NudgeParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.08,
            rotation_tolerance_deg: 10.0,
            edge_contact_tolerance: 0.03,
            invalid_streak_threshold: 5,
            placement_delay: 0.5,
            hysteresis_mul: 1.5,
            grouping: GroupingParams::default(),
            mapping: MappingParams::default(),
            nudge: NudgeParams::default(),
        }
    }
}

impl EngineConfig {
    /// Build a preset for the given difficulty. Harder presets tighten the
    /// position and rotation tolerances and the contact thresholds derived
    /// from them.
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let mut cfg = Self::default();
        match difficulty {
            Difficulty::Easy => {
                cfg.position_tolerance = 0.11;
                cfg.rotation_tolerance_deg = 15.0;
            }
            Difficulty::Standard => {}
            Difficulty::Hard => {
                cfg.position_tolerance = 0.055;
                cfg.rotation_tolerance_deg = 6.0;
            }
        }
        apply_tolerance_scaling(&mut cfg);
        cfg
    }

    /// Rotation tolerance in radians.
    pub fn rotation_tolerance_rad(&self) -> f64 {
        self.rotation_tolerance_deg.to_radians()
    }

    /// Validator tolerances derived from this configuration.
    pub fn tolerances(&self) -> crate::validator::Tolerances {
        crate::validator::Tolerances {
            position: self.position_tolerance,
            rotation: self.rotation_tolerance_rad(),
            edge_contact: self.edge_contact_tolerance,
        }
    }

    /// Reject non-finite or out-of-range parameters.
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("position_tolerance", self.position_tolerance),
            ("rotation_tolerance_deg", self.rotation_tolerance_deg),
            ("edge_contact_tolerance", self.edge_contact_tolerance),
            ("placement_delay", self.placement_delay),
            ("hysteresis_mul", self.hysteresis_mul),
            ("connection_threshold", self.grouping.connection_threshold),
            ("jitter_radius", self.grouping.jitter_radius),
            ("confidence_ramp", self.grouping.confidence_ramp),
            ("nudge.cooldown", self.nudge.cooldown),
            ("nudge.settle_window", self.nudge.settle_window),
            ("nudge.display_duration", self.nudge.display_duration),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        if self.invalid_streak_threshold == 0 {
            return Err(EngineError::InvalidConfig(
                "invalid_streak_threshold must be >= 1".to_string(),
            ));
        }
        if self.grouping.connection_threshold < self.edge_contact_tolerance {
            return Err(EngineError::InvalidConfig(
                "connection_threshold must be >= edge_contact_tolerance".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_tolerance_scaling(cfg: &mut EngineConfig) {
    // Contact thresholds track the position tolerance so presets stay
    // mutually consistent.
    let scale = cfg.position_tolerance / 0.08;
    cfg.edge_contact_tolerance = 0.03 * scale;
    cfg.grouping.connection_threshold = 0.05 * scale;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        for d in [Difficulty::Easy, Difficulty::Standard, Difficulty::Hard] {
            assert!(EngineConfig::for_difficulty(d).validate().is_ok());
        }
    }

    #[test]
    fn hard_preset_is_tighter_than_easy() {
        let easy = EngineConfig::for_difficulty(Difficulty::Easy);
        let hard = EngineConfig::for_difficulty(Difficulty::Hard);
        assert!(hard.position_tolerance < easy.position_tolerance);
        assert!(hard.rotation_tolerance_deg < easy.rotation_tolerance_deg);
        assert!(hard.grouping.connection_threshold < easy.grouping.connection_threshold);
    }

    #[test]
    fn rejects_non_positive_tolerances() {
        let mut cfg = EngineConfig::default();
        cfg.position_tolerance = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.rotation_tolerance_deg = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.invalid_streak_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn connection_threshold_must_cover_edge_contact() {
        let mut cfg = EngineConfig::default();
        cfg.grouping.connection_threshold = cfg.edge_contact_tolerance * 0.5;
        assert!(cfg.validate().is_err());
    }
}

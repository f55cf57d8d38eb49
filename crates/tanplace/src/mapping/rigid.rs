//! Rigid observed-space -> target-space transforms.

use nalgebra::{Rotation2, Vector2};

use crate::geometry::{signed_delta, PieceShape, Pose};

/// A rotation + translation (+ flip parity) taking observed poses into the
/// puzzle's canonical target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidMap {
    /// Rotation delta, radians.
    pub rotation: f64,
    /// Translation applied after rotation.
    pub translation: [f64; 2],
    /// XOR-ed onto observed flip states.
    pub flip_parity: bool,
    /// Mean position residual of the pairs this map was fitted from.
    pub mean_residual: f64,
}

impl RigidMap {
    /// Map an observed pose into target space.
    pub fn apply(&self, pose: &Pose) -> Pose {
        let r = Rotation2::new(self.rotation);
        let p = r * Vector2::new(pose.position[0], pose.position[1]);
        Pose {
            position: [p.x + self.translation[0], p.y + self.translation[1]],
            rotation: pose.rotation + self.rotation,
            flip: pose.flip ^ self.flip_parity,
        }
    }
}

/// Derive a map from a single anchor correspondence.
///
/// The rotation delta is only known modulo the anchor shape's symmetry
/// period; the representative closest to zero is used. Once a second pair
/// is bound, [`fit_pairs`] replaces this single-pair estimate.
pub fn from_anchor(shape: PieceShape, observed: &Pose, target: &Pose) -> RigidMap {
    let theta = signed_delta(target.rotation, observed.rotation, shape.symmetry_period());
    let r = Rotation2::new(theta);
    let rotated = r * Vector2::new(observed.position[0], observed.position[1]);
    let translation = [
        target.position[0] - rotated.x,
        target.position[1] - rotated.y,
    ];
    RigidMap {
        rotation: theta,
        translation,
        flip_parity: target.flip ^ observed.flip,
        mean_residual: 0.0,
    }
}

/// Least-squares rigid fit over observed/target position pairs.
///
/// Standard two-dimensional Kabsch: the rotation comes from the
/// centroid-subtracted cross/dot accumulators, the translation from the
/// rotated centroid difference. Returns `None` for fewer than two pairs or
/// a degenerate (all-coincident) point set.
pub fn fit_pairs(pairs: &[([f64; 2], [f64; 2])], flip_parity: bool) -> Option<RigidMap> {
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mut obs_c = [0.0, 0.0];
    let mut tgt_c = [0.0, 0.0];
    for (obs, tgt) in pairs {
        obs_c[0] += obs[0];
        obs_c[1] += obs[1];
        tgt_c[0] += tgt[0];
        tgt_c[1] += tgt[1];
    }
    obs_c[0] /= n;
    obs_c[1] /= n;
    tgt_c[0] /= n;
    tgt_c[1] /= n;

    let mut dot = 0.0;
    let mut cross = 0.0;
    for (obs, tgt) in pairs {
        let a = [obs[0] - obs_c[0], obs[1] - obs_c[1]];
        let b = [tgt[0] - tgt_c[0], tgt[1] - tgt_c[1]];
        dot += a[0] * b[0] + a[1] * b[1];
        cross += a[0] * b[1] - a[1] * b[0];
    }
    if dot.abs() < 1e-12 && cross.abs() < 1e-12 {
        return None;
    }

    let theta = cross.atan2(dot);
    let r = Rotation2::new(theta);
    let rc = r * Vector2::new(obs_c[0], obs_c[1]);
    let translation = [tgt_c[0] - rc.x, tgt_c[1] - rc.y];

    let mut residual = 0.0;
    for (obs, tgt) in pairs {
        let p = r * Vector2::new(obs[0], obs[1]);
        let dx = p.x + translation[0] - tgt[0];
        let dy = p.y + translation[1] - tgt[1];
        residual += (dx * dx + dy * dy).sqrt();
    }

    Some(RigidMap {
        rotation: theta,
        translation,
        flip_parity,
        mean_residual: residual / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::dist;
    use std::f64::consts::FRAC_PI_3;

    #[test]
    fn anchor_map_sends_anchor_onto_its_target() {
        let observed = Pose::new(2.0, 1.0, 0.4, false);
        let target = Pose::new(0.5, 0.5, 0.9, false);
        let map = from_anchor(PieceShape::LargeTriangle, &observed, &target);
        let mapped = map.apply(&observed);
        assert!(dist(mapped.position, target.position) < 1e-12);
        assert!((map.rotation - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fit_recovers_a_known_transform() {
        let theta = FRAC_PI_3;
        let t = [0.8, -0.3];
        let r = Rotation2::new(theta);
        let obs = [[0.0, 0.0], [1.0, 0.0], [0.3, 0.7]];
        let pairs: Vec<_> = obs
            .iter()
            .map(|o| {
                let p = r * Vector2::new(o[0], o[1]);
                (*o, [p.x + t[0], p.y + t[1]])
            })
            .collect();
        let map = fit_pairs(&pairs, false).expect("fit");
        assert!((map.rotation - theta).abs() < 1e-9);
        assert!(dist(map.translation, t) < 1e-9);
        assert!(map.mean_residual < 1e-9);
    }

    #[test]
    fn fit_resolves_symmetry_ambiguity_a_single_anchor_cannot() {
        // Assembly rotated by 100 degrees: a pi-symmetric anchor alone would
        // pick the -80 degree representative, but two position pairs pin the
        // true rotation.
        let theta = 100f64.to_radians();
        let r = Rotation2::new(theta);
        let obs = [[0.0, 0.0], [0.5, 0.2]];
        let pairs: Vec<_> = obs
            .iter()
            .map(|o| {
                let p = r * Vector2::new(o[0], o[1]);
                (*o, [p.x, p.y])
            })
            .collect();
        let map = fit_pairs(&pairs, false).expect("fit");
        assert!((map.rotation - theta).abs() < 1e-9);
    }

    #[test]
    fn fit_rejects_degenerate_input() {
        assert!(fit_pairs(&[([0.0, 0.0], [1.0, 1.0])], false).is_none());
        let coincident = [([0.2, 0.2], [0.5, 0.5]), ([0.2, 0.2], [0.5, 0.5])];
        assert!(fit_pairs(&coincident, false).is_none());
    }

    #[test]
    fn flip_parity_propagates_through_apply() {
        let map = RigidMap {
            rotation: 0.0,
            translation: [0.0, 0.0],
            flip_parity: true,
            mean_residual: 0.0,
        };
        let pose = Pose::new(0.0, 0.0, 0.0, false);
        assert!(map.apply(&pose).flip);
        let flipped = Pose::new(0.0, 0.0, 0.0, true);
        assert!(!map.apply(&flipped).flip);
    }
}

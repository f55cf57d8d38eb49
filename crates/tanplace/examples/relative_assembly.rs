//! A correctly-assembled cluster validates even when it sits translated and
//! rotated away from the canonical puzzle frame.

use tanplace::{Engine, PuzzleLayout};

fn main() {
    let mut engine = Engine::new(PuzzleLayout::default());
    let slots = engine.puzzle().slots.clone();

    let theta: f64 = 0.7;
    let offset = [2.0, 1.5];

    // The two large triangles, internally consistent but displaced as a whole.
    for id in [0u32, 1] {
        let slot = &slots[id as usize];
        let p = slot.pose.position;
        let moved = [
            theta.cos() * p[0] - theta.sin() * p[1] + offset[0],
            theta.sin() * p[0] + theta.cos() * p[1] + offset[1],
        ];
        let rot = slot.pose.rotation + theta;
        let t = f64::from(id);
        engine.observe_piece(id, slot.shape, [moved[0] + 0.3, moved[1]], rot, slot.pose.flip, t);
        engine.observe_piece(id, slot.shape, moved, rot, slot.pose.flip, t + 0.1);
        engine.observe_piece(id, slot.shape, moved, rot, slot.pose.flip, t + 0.2);
    }

    let stats = engine.request_validation_pass(5.0);
    println!("mapped validations: {}", stats.n_validated_mapped);
    for (piece, target) in engine.bound_pairs() {
        println!("piece {piece} -> target {target}");
    }
    for mapping in engine.current_mappings(5.0) {
        println!(
            "group mapping: rotation {:.3} rad, translation ({:.3}, {:.3}), residual {:.2e}",
            mapping.map.rotation,
            mapping.map.translation[0],
            mapping.map.translation[1],
            mapping.map.mean_residual,
        );
    }
}

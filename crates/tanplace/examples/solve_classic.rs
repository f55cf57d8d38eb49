use tanplace::{Engine, EngineEvent, PuzzleLayout};

fn main() {
    let mut engine = Engine::new(PuzzleLayout::default());
    let slots = engine.puzzle().slots.clone();

    // Pick each piece up away from its target, drag it on, let it rest.
    for (i, slot) in slots.iter().enumerate() {
        let id = i as u32;
        let t = i as f64;
        let pose = slot.pose;
        engine.observe_piece(
            id,
            slot.shape,
            [pose.position[0] + 0.4, pose.position[1] + 0.2],
            pose.rotation,
            pose.flip,
            t,
        );
        engine.observe_piece(id, slot.shape, pose.position, pose.rotation, pose.flip, t + 0.1);
        engine.observe_piece(id, slot.shape, pose.position, pose.rotation, pose.flip, t + 0.2);
    }

    // Final batch pass after the last debounce window.
    engine.request_validation_pass(slots.len() as f64 + 1.0);

    for event in engine.drain_events() {
        match event {
            EngineEvent::ValidationChanged { target, is_valid } => {
                println!("target {target}: valid={is_valid}");
            }
            EngineEvent::PuzzleCompleted => println!("puzzle completed"),
            _ => {}
        }
    }
    println!(
        "validated {}/{} targets",
        engine.validated_targets().len(),
        engine.puzzle().n_slots()
    );
}

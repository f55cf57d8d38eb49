use criterion::{criterion_group, criterion_main, Criterion};

use tanplace::{Engine, PieceShape, PuzzleLayout};

fn settle_all_pieces(engine: &mut Engine, jitter: f64) {
    let slots: Vec<(u32, PieceShape, tanplace::Pose)> = engine
        .puzzle()
        .slots
        .iter()
        .map(|s| (s.id, s.shape, s.pose))
        .collect();
    for (i, (_, shape, pose)) in slots.iter().enumerate() {
        let id = i as u32;
        let t = i as f64 * 0.2;
        engine.observe_piece(
            id,
            *shape,
            [pose.position[0] + 0.4, pose.position[1]],
            pose.rotation,
            pose.flip,
            t,
        );
        engine.observe_piece(
            id,
            *shape,
            [pose.position[0] + jitter, pose.position[1]],
            pose.rotation,
            pose.flip,
            t + 0.05,
        );
        engine.observe_piece(
            id,
            *shape,
            [pose.position[0] + jitter, pose.position[1]],
            pose.rotation,
            pose.flip,
            t + 0.1,
        );
    }
}

fn bench_full_pass(c: &mut Criterion) {
    c.bench_function("validation_pass_seven_pieces", |b| {
        let mut engine = Engine::new(PuzzleLayout::default());
        settle_all_pieces(&mut engine, 0.02);
        let mut now = 10.0;
        b.iter(|| {
            now += 1.0;
            std::hint::black_box(engine.request_validation_pass(now));
            engine.drain_events();
        });
    });
}

fn bench_observation_stream(c: &mut Criterion) {
    c.bench_function("observe_piece_stream", |b| {
        let mut engine = Engine::new(PuzzleLayout::default());
        settle_all_pieces(&mut engine, 0.02);
        let pose = engine.puzzle().slot(3).unwrap().pose;
        let mut now = 10.0;
        b.iter(|| {
            now += 0.03;
            engine.observe_piece(
                3,
                PieceShape::Square,
                [pose.position[0] + 0.001, pose.position[1]],
                pose.rotation,
                false,
                now,
            );
            engine.drain_events();
        });
    });
}

criterion_group!(benches, bench_full_pass, bench_observation_stream);
criterion_main!(benches);

//! # Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use plan_lib::{
    opt::{OptAdapter, QuinticSolver, MAX_HORIZON},
    scene::{CanvasPoint, Inclusion, Scene},
};

fn solve_benchmark(c: &mut Criterion) {
    // ---- Build a scene at full capacity ----

    let mut scene = Scene::default();
    scene.goal.pos = CanvasPoint::new(800.0, -600.0);
    scene.final_time_s = 8.0;
    scene.horizon_length = MAX_HORIZON as u32;

    for i in 0..10 {
        scene
            .add_ellipse(
                CanvasPoint::new(80.0 * i as f64, -60.0 * i as f64 + 30.0),
                25.0,
                Inclusion::KeepOut,
                0,
            )
            .unwrap();
    }

    scene
        .add_polygon(
            vec![
                CanvasPoint::new(-200.0, 200.0),
                CanvasPoint::new(1000.0, 200.0),
                CanvasPoint::new(1000.0, -800.0),
                CanvasPoint::new(-200.0, -800.0),
            ],
            Inclusion::KeepIn,
        )
        .unwrap();

    let mut adapter = OptAdapter::new(QuinticSolver::default());

    c.bench_function("OptAdapter::solve::quintic", |b| {
        b.iter(|| adapter.solve(&scene).unwrap())
    });

    // Marshalling alone, with no obstacles to project onto
    let empty = Scene::fresh_from(&scene);

    c.bench_function("OptAdapter::solve::quintic_empty", |b| {
        b.iter(|| adapter.solve(&empty).unwrap())
    });
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);

use std::hint::black_box;

use criterion::*;

use archon_ecs::engine::component::Bundle;
use archon_ecs::engine::world::EntityWorld;
use archon_ecs::SystemCommands;

mod common;
use common::{init_components, Position, Velocity, AGENTS_MED};

fn spawn_benchmark(c: &mut Criterion) {
    init_components();

    let mut group = c.benchmark_group("spawn");
    group.sample_size(10);

    group.bench_function("spawn_100k_agents", |b| {
        b.iter(|| {
            let mut world = EntityWorld::new().unwrap();
            for i in 0..AGENTS_MED {
                world
                    .spawn(
                        Bundle::new()
                            .with(Position { x: i as f32, y: 0.0 })
                            .unwrap()
                            .with(Velocity { dx: 1.0, dy: 1.0 })
                            .unwrap(),
                    )
                    .unwrap();
            }
            black_box(world.live_count())
        });
    });

    group.bench_function("deferred_spawn_100k_agents", |b| {
        b.iter(|| {
            let world = EntityWorld::new().unwrap();
            let mut commands = SystemCommands::new();
            for i in 0..AGENTS_MED {
                commands.spawn(
                    Bundle::new()
                        .with(Position { x: i as f32, y: 0.0 })
                        .unwrap(),
                );
            }
            world.execute_commands(&mut commands).unwrap();
            black_box(world.live_count())
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);

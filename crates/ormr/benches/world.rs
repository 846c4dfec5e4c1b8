//! World throughput benchmarks.
//!
//! Run with: `cargo bench --package ormr`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ormr::prelude::*;

#[derive(Debug, Default)]
struct Velocity(Vec2);

impl Component for Velocity {}

#[derive(Default)]
struct Movement;

impl System for Movement {
    fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
        requirements.require::<Transform>()?.require::<Velocity>()?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
        ctx.for_each_tracked(|world, object| {
            let Ok(velocity) = world.get_component::<Velocity>(object) else {
                return;
            };
            let delta = velocity.0 * dt;
            let _ = world.translate(object, delta);
        });
    }
}

fn populated(count: usize) -> World {
    let mut world = World::new();
    world.add_system(Movement).unwrap();
    for i in 0..count {
        let f = i as f32;
        let object = world.create_object(Vec2::new(f * 3.0, f * 1.5), 0.0, Vec2::ONE);
        world
            .add_component(object, Velocity(Vec2::new(1.0, -1.0)))
            .unwrap();
    }
    world
}

fn bench_create_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_destroy");
    for count in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                let objects: Vec<_> = (0..count)
                    .map(|i| world.create_object(Vec2::splat(i as f32), 0.0, Vec2::ONE))
                    .collect();
                for object in objects {
                    world.destroy_object(object).unwrap();
                }
                black_box(world.object_count())
            });
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut world = populated(10_000);
    c.bench_function("update_10k_moving", |b| {
        b.iter(|| world.update(black_box(0.016)));
    });
}

fn bench_queries(c: &mut Criterion) {
    let world = populated(10_000);
    c.bench_function("query_radius_500", |b| {
        b.iter(|| {
            let mut hits = 0;
            world.query_radius(black_box(Vec2::new(5_000.0, 2_500.0)), 500.0, |_| hits += 1);
            hits
        });
    });
}

criterion_group!(benches, bench_create_destroy, bench_update, bench_queries);
criterion_main!(benches);

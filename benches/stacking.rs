use criterion::{criterion_group, criterion_main, Criterion};
use glam::Vec3;
use kinetica::{BodySettings, MotionType, ObjectLayer, PhysicsWorld, WorldSettings};

fn build_stack_world(height: usize) -> (PhysicsWorld, ObjectLayer) {
    let (settings, layer) = WorldSettings::single_layer();
    let mut world = PhysicsWorld::new(settings);

    let ground = world
        .shapes_mut()
        .cuboid(Vec3::new(30.0, 0.5, 30.0))
        .unwrap();
    world
        .create_body(
            &BodySettings::new(ground, layer)
                .with_position(Vec3::new(0.0, -0.5, 0.0))
                .with_motion_type(MotionType::Static),
        )
        .unwrap();

    let cube = world.shapes_mut().cuboid(Vec3::splat(0.5)).unwrap();
    for level in 0..height {
        world
            .create_body(
                &BodySettings::new(cube, layer)
                    .with_position(Vec3::new(0.0, 0.5 + level as f32, 0.0)),
            )
            .unwrap();
    }
    (world, layer)
}

fn bench_stack_step(c: &mut Criterion) {
    c.bench_function("step_5_box_stack", |b| {
        let (mut world, _) = build_stack_world(5);
        // Settle first so the benchmark measures the steady state.
        for _ in 0..120 {
            world.step(1.0 / 60.0).unwrap();
        }
        b.iter(|| {
            world.step(1.0 / 60.0).unwrap();
        });
    });

    c.bench_function("step_25_body_pile", |b| {
        let (mut world, layer) = build_stack_world(0);
        let sphere = world.shapes_mut().sphere(0.4).unwrap();
        for i in 0..25 {
            let x = (i % 5) as f32 - 2.0;
            let z = (i / 5) as f32 - 2.0;
            world
                .create_body(
                    &BodySettings::new(sphere, layer)
                        .with_position(Vec3::new(x, 1.0 + (i as f32) * 0.1, z)),
                )
                .unwrap();
        }
        b.iter(|| {
            world.step(1.0 / 60.0).unwrap();
        });
    });
}

criterion_group!(benches, bench_stack_step);
criterion_main!(benches);

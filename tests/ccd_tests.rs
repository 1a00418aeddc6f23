use glam::Vec3;
use kinetica::{
    BodySettings, ContactManifold, ContactSettings, MotionQuality, MotionType, PhysicsListener,
    PhysicsWorld, RigidBody, WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

#[derive(Default)]
struct ContactCounter {
    added: usize,
}

impl PhysicsListener for ContactCounter {
    fn on_contact_added(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _manifold: &ContactManifold,
        _settings: &mut ContactSettings,
    ) {
        self.added += 1;
    }
}

fn wall_world() -> (PhysicsWorld, kinetica::ObjectLayer) {
    let (mut settings, layer) = WorldSettings::single_layer();
    settings.gravity_enabled = false;
    let mut world = PhysicsWorld::new(settings);
    let wall_shape = world
        .shapes_mut()
        .cuboid(Vec3::new(5.0, 5.0, 0.1))
        .unwrap();
    world
        .create_body(
            &BodySettings::new(wall_shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    (world, layer)
}

#[test]
fn linear_cast_bullet_does_not_tunnel_through_a_thin_wall() {
    // Wall occupies z in [-0.1, 0.1]; the bullet sweeps along +z.
    let (mut world, layer) = wall_world();
    let bullet_shape = world.shapes_mut().sphere(0.2).unwrap();
    let bullet = world
        .create_body(
            &BodySettings::new(bullet_shape, layer)
                .with_position(Vec3::new(0.0, 0.0, -10.0))
                .with_velocity(Vec3::new(0.0, 0.0, 200.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::LinearCast),
        )
        .unwrap();

    let mut counter = ContactCounter::default();
    for _ in 0..6 {
        world.update(DT, &mut counter).unwrap();
    }

    let body = world.body(bullet).unwrap();
    assert!(
        body.position.z <= 0.5,
        "bullet tunneled: z = {}",
        body.position.z
    );
    assert!(body.position.z >= -10.0);
    assert!(
        body.velocity.linear.z < 200.0 * 0.5,
        "bullet kept its speed: vz = {}",
        body.velocity.linear.z
    );
    assert!(counter.added > 0, "no contact event fired");
}

#[test]
fn linear_cast_stop_respects_the_penetration_allowance() {
    let (mut world, layer) = wall_world();
    let bullet_shape = world.shapes_mut().sphere(0.2).unwrap();
    let bullet = world
        .create_body(
            &BodySettings::new(bullet_shape, layer)
                .with_position(Vec3::new(0.0, 0.0, -10.0))
                .with_velocity(Vec3::new(0.0, 0.0, 200.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::LinearCast),
        )
        .unwrap();

    for _ in 0..6 {
        world.step(DT).unwrap();
    }

    // Signed distance from the bullet surface to the wall face must stay
    // above the configured allowance.
    let body = world.body(bullet).unwrap();
    let allowance =
        world.settings().ccd.linear_cast_max_penetration * body.inner_radius;
    let surface_z = body.position.z + 0.2;
    let wall_face_z = -0.1;
    assert!(
        surface_z - wall_face_z <= allowance + 0.05,
        "stopped too deep or bounced far: surface at {surface_z}"
    );
}

#[test]
fn discrete_bullet_tunnels_where_linear_cast_would_not() {
    // Velocity chosen so no discrete step lands inside the wall slab.
    let (mut world, layer) = wall_world();
    let bullet_shape = world.shapes_mut().sphere(0.2).unwrap();
    let bullet = world
        .create_body(
            &BodySettings::new(bullet_shape, layer)
                .with_position(Vec3::new(0.0, 0.0, -10.0))
                .with_velocity(Vec3::new(0.0, 0.0, 230.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::Discrete),
        )
        .unwrap();

    for _ in 0..6 {
        world.step(DT).unwrap();
    }

    let body = world.body(bullet).unwrap();
    assert!(
        body.position.z > 0.5,
        "discrete bullet unexpectedly stopped at z = {}",
        body.position.z
    );
}

#[test]
fn slow_linear_cast_bodies_use_the_discrete_path() {
    // Displacement below the activation threshold: no CCD slot is taken and
    // the body integrates normally.
    let (mut settings, layer) = WorldSettings::single_layer();
    settings.gravity_enabled = false;
    let mut world = PhysicsWorld::new(settings);
    let shape = world.shapes_mut().sphere(0.5).unwrap();
    let body = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_velocity(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::LinearCast),
        )
        .unwrap();

    world.step(DT).unwrap();

    let b = world.body(body).unwrap();
    assert_eq!(b.ccd_slot, -1);
    assert!((b.position.x - 1.0 * DT).abs() < 1e-4);
}

#[test]
fn two_fast_bodies_on_a_collision_course_stop_each_other() {
    let (mut settings, layer) = WorldSettings::single_layer();
    settings.gravity_enabled = false;
    let mut world = PhysicsWorld::new(settings);
    let shape = world.shapes_mut().sphere(0.2).unwrap();
    let left = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(-5.0, 0.0, 0.0))
                .with_velocity(Vec3::new(150.0, 0.0, 0.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::LinearCast),
        )
        .unwrap();
    let right = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(5.0, 0.0, 0.0))
                .with_velocity(Vec3::new(-150.0, 0.0, 0.0), Vec3::ZERO)
                .with_motion_quality(MotionQuality::LinearCast),
        )
        .unwrap();

    for _ in 0..4 {
        world.step(DT).unwrap();
    }

    let left_body = world.body(left).unwrap();
    let right_body = world.body(right).unwrap();
    // The spheres never pass through each other.
    assert!(
        left_body.position.x < right_body.position.x,
        "bodies swapped sides: {} vs {}",
        left_body.position.x,
        right_body.position.x
    );
    assert!(left_body.velocity.linear.x < 150.0);
    assert!(right_body.velocity.linear.x > -150.0);
}

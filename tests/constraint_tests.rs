use glam::{Quat, Vec3};
use kinetica::{
    BodySettings, ConstraintSpace, DistanceSettings, HingeSettings, MotionType, MotorSettings,
    MotorState, PhysicsWorld, WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

fn empty_world(gravity: bool) -> (PhysicsWorld, kinetica::ObjectLayer) {
    let (mut settings, layer) = WorldSettings::single_layer();
    settings.gravity_enabled = gravity;
    (PhysicsWorld::new(settings), layer)
}

#[test]
fn hinge_velocity_motor_reaches_its_target_speed() {
    let (mut world, layer) = empty_world(false);
    let anchor_shape = world.shapes_mut().cuboid(Vec3::splat(0.2)).unwrap();
    let wheel_shape = world.shapes_mut().cuboid(Vec3::splat(0.5)).unwrap();

    let anchor = world
        .create_body(
            &BodySettings::new(anchor_shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    let wheel = world
        .create_body(
            &BodySettings::new(wheel_shape, layer).with_position(Vec3::new(2.0, 0.0, 0.0)),
        )
        .unwrap();

    let hinge = world
        .create_hinge_constraint(
            anchor,
            wheel,
            &HingeSettings {
                space: ConstraintSpace::World,
                point_a: Vec3::ZERO,
                point_b: Vec3::ZERO,
                hinge_axis_a: Vec3::Y,
                hinge_axis_b: Vec3::Y,
                motor: MotorSettings {
                    max_force: 1.0e6,
                    position_gain: 2.0,
                },
                ..HingeSettings::default()
            },
        )
        .unwrap();

    {
        let constraint = world.constraint_mut(hinge).unwrap();
        constraint.set_motor_state(MotorState::Velocity);
        constraint.set_target_velocity(7.0);
        constraint.set_torque_limit(1.0e6);
    }

    // Five seconds of simulated drive.
    for _ in 0..300 {
        world.step(DT).unwrap();
    }

    let spin = world.body(wheel).unwrap().velocity.angular.y;
    assert!((spin - 7.0).abs() < 0.5, "hinge spin {spin}");
}

#[test]
fn point_constraint_pendulum_keeps_its_arm_length() {
    let (mut world, layer) = empty_world(true);
    let anchor_shape = world.shapes_mut().sphere(0.05).unwrap();
    let bob_shape = world.shapes_mut().cuboid(Vec3::splat(0.1)).unwrap();

    let anchor = world
        .create_body(
            &BodySettings::new(anchor_shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    let bob = world
        .create_body(
            &BodySettings::new(bob_shape, layer).with_position(Vec3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();

    world
        .create_point_constraint(anchor, bob, ConstraintSpace::World, Vec3::ZERO, Vec3::ZERO)
        .unwrap();

    for _ in 0..240 {
        world.step(DT).unwrap();
        let arm = world.body(bob).unwrap().position.length();
        assert!(
            (arm - 1.0).abs() < 0.1,
            "pendulum arm drifted to {arm}"
        );
    }

    // The bob should have swung downward under gravity.
    assert!(world.body(bob).unwrap().position.y < -0.2);
}

#[test]
fn distance_constraint_limits_separation() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().sphere(0.1).unwrap();

    let anchor = world
        .create_body(
            &BodySettings::new(shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    let satellite = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(1.0, 0.0, 0.0))
                .with_velocity(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO),
        )
        .unwrap();

    world
        .create_distance_constraint(
            anchor,
            satellite,
            &DistanceSettings {
                space: ConstraintSpace::World,
                point_a: Vec3::ZERO,
                point_b: Vec3::new(1.0, 0.0, 0.0),
                min_distance: 0.0,
                max_distance: 2.0,
                spring: None,
            },
        )
        .unwrap();

    for _ in 0..120 {
        world.step(DT).unwrap();
    }
    let distance = world.body(satellite).unwrap().position.length();
    assert!(distance < 2.3, "satellite escaped to {distance}");
}

#[test]
fn fixed_constraint_welds_two_bodies() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().cuboid(Vec3::splat(0.5)).unwrap();

    let base = world
        .create_body(
            &BodySettings::new(shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    let attachment = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(1.5, 0.0, 0.0))
                .with_velocity(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();

    world
        .create_fixed_constraint(
            base,
            attachment,
            ConstraintSpace::World,
            Vec3::new(0.75, 0.0, 0.0),
            Vec3::new(0.75, 0.0, 0.0),
        )
        .unwrap();

    for _ in 0..240 {
        world.step(DT).unwrap();
    }

    let body = world.body(attachment).unwrap();
    assert!(
        (body.position - Vec3::new(1.5, 0.0, 0.0)).length() < 0.1,
        "welded body drifted to {:?}",
        body.position
    );
    assert!(body.velocity.linear.length() < 0.1);
    assert!(body.velocity.angular.length() < 0.1);
}

#[test]
fn constraint_endpoints_must_differ() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().sphere(0.5).unwrap();
    let body = world
        .create_body(&BodySettings::new(shape, layer))
        .unwrap();
    let result =
        world.create_point_constraint(body, body, ConstraintSpace::World, Vec3::ZERO, Vec3::ZERO);
    assert!(matches!(
        result,
        Err(kinetica::PhysicsError::InvalidArgument(_))
    ));
}

#[test]
fn disabled_constraints_do_not_act() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().sphere(0.1).unwrap();

    let anchor = world
        .create_body(
            &BodySettings::new(shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    let free = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(1.0, 0.0, 0.0))
                .with_velocity(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO),
        )
        .unwrap();

    let constraint = world
        .create_point_constraint(anchor, free, ConstraintSpace::World, Vec3::ZERO, Vec3::ZERO)
        .unwrap();
    world.set_constraint_enabled(constraint, false).unwrap();

    for _ in 0..60 {
        world.step(DT).unwrap();
    }
    // With damping only, the body coasts away unrestrained.
    assert!(world.body(free).unwrap().position.x > 1.5);
}

#[test]
fn removing_a_body_detaches_its_constraints() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().sphere(0.1).unwrap();
    let a = world
        .create_body(&BodySettings::new(shape, layer))
        .unwrap();
    let b = world
        .create_body(
            &BodySettings::new(shape, layer).with_position(Vec3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();
    let constraint = world
        .create_point_constraint(a, b, ConstraintSpace::World, Vec3::ZERO, Vec3::ZERO)
        .unwrap();

    world.remove_body(a).unwrap();
    assert!(world.constraint(constraint).is_none());
    assert!(world.body(b).unwrap().constraints.is_empty());
    // Stepping afterwards must not panic or resurrect the constraint.
    world.step(DT).unwrap();
}

#[test]
fn kinematic_bodies_follow_move_kinematic_targets() {
    let (mut world, layer) = empty_world(false);
    let shape = world.shapes_mut().cuboid(Vec3::splat(0.5)).unwrap();
    let platform = world
        .create_body(
            &BodySettings::new(shape, layer).with_motion_type(MotionType::Kinematic),
        )
        .unwrap();

    let target = Vec3::new(0.0, 2.0, 0.0);
    world
        .move_kinematic(platform, target, Quat::IDENTITY, 1.0)
        .unwrap();
    for _ in 0..60 {
        world.step(DT).unwrap();
    }

    let position = world.body(platform).unwrap().position;
    assert!(
        (position - target).length() < 0.05,
        "kinematic body at {position:?}"
    );
}

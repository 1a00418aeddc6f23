use glam::Vec3;
use kinetica::{
    BodySettings, ContactManifold, ContactSettings, MotionType, PendingCommands, PhysicsListener,
    PhysicsWorld, RigidBody, ValidateResult, WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

#[derive(Default)]
struct EventLog {
    added: usize,
    persisted: usize,
    removed: usize,
}

impl PhysicsListener for EventLog {
    fn on_contact_added(
        &mut self,
        _a: &RigidBody,
        _b: &RigidBody,
        _manifold: &ContactManifold,
        _settings: &mut ContactSettings,
    ) {
        self.added += 1;
    }

    fn on_contact_persisted(
        &mut self,
        _a: &RigidBody,
        _b: &RigidBody,
        _manifold: &ContactManifold,
        _settings: &mut ContactSettings,
    ) {
        self.persisted += 1;
    }

    fn on_contact_removed(
        &mut self,
        _a: kinetica::BodyId,
        _b: kinetica::BodyId,
        _sub_a: u32,
        _sub_b: u32,
    ) {
        self.removed += 1;
    }
}

/// Rejects contacts while the dynamic body moves upward, letting bodies jump
/// through the platform from below but rest on it from above.
#[derive(Default)]
struct OneWayPlatform {
    rejected: usize,
    accepted: usize,
}

impl PhysicsListener for OneWayPlatform {
    fn on_contact_validate(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        _base_offset: Vec3,
        _manifold: &ContactManifold,
    ) -> ValidateResult {
        let dynamic = if body_a.is_dynamic() { body_a } else { body_b };
        if dynamic.velocity.linear.y > 0.0 {
            self.rejected += 1;
            ValidateResult::RejectAllContactsForThisBodyPair
        } else {
            self.accepted += 1;
            ValidateResult::AcceptContact
        }
    }
}

fn platform_world() -> (PhysicsWorld, kinetica::ObjectLayer) {
    let (settings, layer) = WorldSettings::single_layer();
    let mut world = PhysicsWorld::new(settings);
    let platform_shape = world
        .shapes_mut()
        .cuboid(Vec3::new(2.0, 0.1, 2.0))
        .unwrap();
    world
        .create_body(
            &BodySettings::new(platform_shape, layer).with_motion_type(MotionType::Static),
        )
        .unwrap();
    (world, layer)
}

#[test]
fn one_way_platform_lets_rising_bodies_pass() {
    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, -1.0, 0.0))
                .with_velocity(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO),
        )
        .unwrap();

    let mut platform = OneWayPlatform::default();
    for _ in 0..20 {
        world.update(DT, &mut platform).unwrap();
    }

    let y = world.body(ball).unwrap().position.y;
    assert!(y > 0.5, "ball should have passed through, y = {y}");
    assert!(platform.rejected > 0, "no upward contact was rejected");
}

#[test]
fn one_way_platform_catches_falling_bodies() {
    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();

    let mut platform = OneWayPlatform::default();
    for _ in 0..240 {
        world.update(DT, &mut platform).unwrap();
    }

    let y = world.body(ball).unwrap().position.y;
    assert!(
        y > 0.1 && y < 0.5,
        "ball should rest on the platform, y = {y}"
    );
    assert!(platform.accepted > 0);
}

#[test]
fn contact_lifecycle_events_fire_in_order() {
    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, 0.5, 0.0)),
        )
        .unwrap();

    let mut log = EventLog::default();
    for _ in 0..60 {
        world.update(DT, &mut log).unwrap();
    }
    assert!(log.added >= 1, "contact never added");
    assert!(log.persisted > 0, "contact never persisted");
    assert_eq!(log.removed, 0);

    // Teleport away; the stale contact is removed on the next step.
    world
        .set_position(ball, Vec3::new(50.0, 50.0, 50.0))
        .unwrap();
    world.update(DT, &mut log).unwrap();
    assert!(log.removed >= 1, "contact never removed");
}

#[test]
fn body_pair_validate_suppresses_all_contact_work() {
    struct RejectEverything;
    impl PhysicsListener for RejectEverything {
        fn on_body_pair_validate(&mut self, _a: &RigidBody, _b: &RigidBody) -> bool {
            false
        }
    }

    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, 0.5, 0.0)),
        )
        .unwrap();

    let mut listener = RejectEverything;
    for _ in 0..120 {
        world.update(DT, &mut listener).unwrap();
    }
    // With every pair rejected the ball falls straight through.
    assert!(world.body(ball).unwrap().position.y < -1.0);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn sensor_flag_from_listener_disables_response_but_keeps_events() {
    struct MakeSensor {
        added: usize,
    }
    impl PhysicsListener for MakeSensor {
        fn on_contact_added(
            &mut self,
            _a: &RigidBody,
            _b: &RigidBody,
            _manifold: &ContactManifold,
            settings: &mut ContactSettings,
        ) {
            settings.is_sensor = true;
            self.added += 1;
        }
        fn on_contact_persisted(
            &mut self,
            _a: &RigidBody,
            _b: &RigidBody,
            _manifold: &ContactManifold,
            settings: &mut ContactSettings,
        ) {
            settings.is_sensor = true;
        }
    }

    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, 1.0, 0.0)),
        )
        .unwrap();

    let mut listener = MakeSensor { added: 0 };
    for _ in 0..120 {
        world.update(DT, &mut listener).unwrap();
    }
    assert!(listener.added > 0);
    // No response: the ball keeps falling through the platform.
    assert!(world.body(ball).unwrap().position.y < -1.0);
}

#[test]
fn pending_commands_apply_after_the_step() {
    let (mut world, layer) = platform_world();
    let ball_shape = world.shapes_mut().sphere(0.2).unwrap();
    let ball = world
        .create_body(
            &BodySettings::new(ball_shape, layer)
                .with_position(Vec3::new(0.0, 0.35, 0.0)),
        )
        .unwrap();

    struct RemoveOnTouch {
        target: kinetica::BodyId,
        commands: PendingCommands,
    }
    impl PhysicsListener for RemoveOnTouch {
        fn on_contact_added(
            &mut self,
            body_a: &RigidBody,
            body_b: &RigidBody,
            _manifold: &ContactManifold,
            _settings: &mut ContactSettings,
        ) {
            let id = if body_a.id == self.target {
                body_a.id
            } else {
                body_b.id
            };
            self.commands.remove_body(id);
        }
    }

    let mut listener = RemoveOnTouch {
        target: ball,
        commands: PendingCommands::new(),
    };
    for _ in 0..30 {
        world.update(DT, &mut listener).unwrap();
        if !listener.commands.is_empty() {
            break;
        }
    }
    assert!(!listener.commands.is_empty(), "ball never touched");

    let results = world.apply_commands(&mut listener.commands);
    assert!(results.iter().all(|r| r.is_ok()));
    assert!(world.body(ball).is_none());
    world.step(DT).unwrap();
}

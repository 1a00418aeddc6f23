use glam::{Quat, Vec3};
use kinetica::{
    AllHitCollector, AnyHitCollector, BodySettings, ClosestHitCollector, CollidePointHit,
    MotionType, PhysicsWorld, QueryFilter, RayCastHit, ShapeCastHit, WorldSettings,
};

fn static_sphere_world() -> (
    PhysicsWorld,
    kinetica::ObjectLayer,
    kinetica::BodyId,
    kinetica::BodyId,
) {
    let (settings, layer) = WorldSettings::single_layer();
    let mut world = PhysicsWorld::new(settings);
    let shape = world.shapes_mut().sphere(1.0).unwrap();
    let near = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(5.0, 0.0, 0.0))
                .with_motion_type(MotionType::Static),
        )
        .unwrap();
    let far = world
        .create_body(
            &BodySettings::new(shape, layer)
                .with_position(Vec3::new(12.0, 0.0, 0.0))
                .with_motion_type(MotionType::Static),
        )
        .unwrap();
    (world, layer, near, far)
}

#[test]
fn closest_ray_hit_picks_the_nearer_body() {
    let (world, _, near, _) = static_sphere_world();
    let mut collector = ClosestHitCollector::<RayCastHit>::default();
    world
        .cast_ray(
            Vec3::ZERO,
            Vec3::X,
            100.0,
            &QueryFilter::default(),
            &mut collector,
        )
        .unwrap();

    let hit = collector.hit.expect("ray should hit");
    assert_eq!(hit.body, near);
    assert!((hit.fraction - 4.0).abs() < 1e-3, "fraction {}", hit.fraction);
    assert!(hit.normal.x < -0.99);
}

#[test]
fn all_hits_collector_sees_both_bodies() {
    let (world, _, _, _) = static_sphere_world();
    let mut collector = AllHitCollector::<RayCastHit>::default();
    world
        .cast_ray(
            Vec3::ZERO,
            Vec3::X,
            100.0,
            &QueryFilter::default(),
            &mut collector,
        )
        .unwrap();
    assert_eq!(collector.hits.len(), 2);
}

#[test]
fn ray_filter_predicate_excludes_bodies() {
    let (world, _, near, far) = static_sphere_world();
    let predicate = |id: kinetica::BodyId, _body: &kinetica::RigidBody| id != near;
    let filter = QueryFilter {
        predicate: Some(&predicate),
        ..QueryFilter::default()
    };
    let mut collector = ClosestHitCollector::<RayCastHit>::default();
    world
        .cast_ray(Vec3::ZERO, Vec3::X, 100.0, &filter, &mut collector)
        .unwrap();
    assert_eq!(collector.hit.unwrap().body, far);
}

#[test]
fn non_unit_ray_directions_are_rejected() {
    let (world, _, _, _) = static_sphere_world();
    let mut collector = ClosestHitCollector::<RayCastHit>::default();
    let result = world.cast_ray(
        Vec3::ZERO,
        Vec3::new(0.0, 2.0, 0.0),
        100.0,
        &QueryFilter::default(),
        &mut collector,
    );
    assert!(matches!(
        result,
        Err(kinetica::PhysicsError::NotNormalised(_))
    ));
}

#[test]
fn collide_point_reports_the_containing_body() {
    let (world, _, near, _) = static_sphere_world();
    let mut collector = AnyHitCollector::<CollidePointHit>::default();
    world.collide_point(
        Vec3::new(5.2, 0.3, 0.0),
        &QueryFilter::default(),
        &mut collector,
    );
    assert_eq!(collector.hit.unwrap().body, near);

    let mut empty = AnyHitCollector::<CollidePointHit>::default();
    world.collide_point(
        Vec3::new(8.0, 0.0, 0.0),
        &QueryFilter::default(),
        &mut empty,
    );
    assert!(empty.hit.is_none());
}

#[test]
fn shape_cast_reports_time_of_impact() {
    let (settings, layer) = WorldSettings::single_layer();
    let mut world = PhysicsWorld::new(settings);
    let wall_shape = world
        .shapes_mut()
        .cuboid(Vec3::new(5.0, 5.0, 0.5))
        .unwrap();
    world
        .create_body(
            &BodySettings::new(wall_shape, layer)
                .with_position(Vec3::new(0.0, 0.0, 10.0))
                .with_motion_type(MotionType::Static),
        )
        .unwrap();
    let probe = world.shapes_mut().sphere(0.5).unwrap();

    let mut collector = ClosestHitCollector::<ShapeCastHit>::default();
    world
        .cast_shape(
            probe,
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::ONE,
            Vec3::new(0.0, 0.0, 20.0),
            &QueryFilter::default(),
            &mut collector,
        )
        .unwrap();

    let hit = collector.hit.expect("sweep should hit the wall");
    // Wall face at z = 9.5, sphere surface reaches it after 9 of 20 units.
    assert!(
        (hit.fraction - 9.0 / 20.0).abs() < 0.01,
        "fraction {}",
        hit.fraction
    );
    assert!(hit.normal.z > 0.9);
}

#[test]
fn collide_shape_produces_manifolds_for_overlaps() {
    let (world, _, near, _) = static_sphere_world();
    // Query with the same sphere shape the bodies use.
    let probe = world.body(near).unwrap().shape;

    let mut collector = AllHitCollector::<kinetica::CollideShapeHit>::default();
    world
        .collide_shape(
            probe,
            Vec3::new(6.5, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ONE,
            &QueryFilter::default(),
            &mut collector,
        )
        .unwrap();

    assert!(!collector.hits.is_empty());
    let hit = &collector.hits[0];
    assert_eq!(hit.body, near);
    assert!(hit.manifold.penetration > 0.0);
    assert!((hit.manifold.normal.length() - 1.0).abs() < 1e-4);
}

#[test]
fn sensors_can_be_filtered_from_queries() {
    let (settings, layer) = WorldSettings::single_layer();
    let mut world = PhysicsWorld::new(settings);
    let shape = world.shapes_mut().sphere(1.0).unwrap();
    let mut body_settings = BodySettings::new(shape, layer)
        .with_position(Vec3::new(3.0, 0.0, 0.0))
        .with_motion_type(MotionType::Static);
    body_settings.is_sensor = true;
    world.create_body(&body_settings).unwrap();

    let filter = QueryFilter {
        ignore_sensors: true,
        ..QueryFilter::default()
    };
    let mut collector = ClosestHitCollector::<RayCastHit>::default();
    world
        .cast_ray(Vec3::ZERO, Vec3::X, 100.0, &filter, &mut collector)
        .unwrap();
    assert!(collector.hit.is_none());
}

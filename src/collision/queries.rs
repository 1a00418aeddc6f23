use glam::Vec3;

use crate::{
    collision::narrowphase::{gjk_closest, GjkResult},
    core::{
        body::{BodyId, RigidBody},
        mesh::ray_triangle,
        shape::{Shape, ShapeKind, ShapeRegistry},
        subshape::SubShapeId,
        support::{ConvexSupport, Support, SupportMode, TransformedSupport},
        types::Transform,
    },
};

/// Result of a ray cast against a body.
#[derive(Debug, Clone, Copy)]
pub struct RayCastHit {
    pub body: BodyId,
    pub sub_shape: SubShapeId,
    /// Distance along the (unit) ray direction.
    pub fraction: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Result of a shape cast against a body.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCastHit {
    pub body: BodyId,
    /// Fraction of the sweep vector travelled at impact.
    pub fraction: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Result of a collide-point query.
#[derive(Debug, Clone, Copy)]
pub struct CollidePointHit {
    pub body: BodyId,
}

/// Hits that can be ranked for closest-hit collection.
pub trait RankedHit {
    fn fraction(&self) -> f32;
}

impl RankedHit for RayCastHit {
    fn fraction(&self) -> f32 {
        self.fraction
    }
}

impl RankedHit for ShapeCastHit {
    fn fraction(&self) -> f32 {
        self.fraction
    }
}

impl RankedHit for CollidePointHit {
    fn fraction(&self) -> f32 {
        0.0
    }
}

/// Caller-supplied hit sink shared by all queries.
pub trait HitCollector<H> {
    fn add_hit(&mut self, hit: H);

    /// Stop the walk entirely once satisfied.
    fn should_early_out(&self) -> bool {
        false
    }

    /// Hits beyond this fraction can be skipped by the walk.
    fn early_out_fraction(&self) -> f32 {
        f32::MAX
    }
}

/// Keeps the first hit and stops.
#[derive(Debug)]
pub struct AnyHitCollector<H> {
    pub hit: Option<H>,
}

impl<H> Default for AnyHitCollector<H> {
    fn default() -> Self {
        Self { hit: None }
    }
}

impl<H> HitCollector<H> for AnyHitCollector<H> {
    fn add_hit(&mut self, hit: H) {
        if self.hit.is_none() {
            self.hit = Some(hit);
        }
    }

    fn should_early_out(&self) -> bool {
        self.hit.is_some()
    }

    fn early_out_fraction(&self) -> f32 {
        if self.hit.is_some() {
            0.0
        } else {
            f32::MAX
        }
    }
}

/// Keeps the hit with the smallest fraction.
#[derive(Debug)]
pub struct ClosestHitCollector<H> {
    pub hit: Option<H>,
}

impl<H> Default for ClosestHitCollector<H> {
    fn default() -> Self {
        Self { hit: None }
    }
}

impl<H: RankedHit> HitCollector<H> for ClosestHitCollector<H> {
    fn add_hit(&mut self, hit: H) {
        if self
            .hit
            .as_ref()
            .map(|h| hit.fraction() < h.fraction())
            .unwrap_or(true)
        {
            self.hit = Some(hit);
        }
    }

    fn early_out_fraction(&self) -> f32 {
        self.hit.as_ref().map(|h| h.fraction()).unwrap_or(f32::MAX)
    }
}

/// Keeps every hit.
#[derive(Debug)]
pub struct AllHitCollector<H> {
    pub hits: Vec<H>,
}

impl<H> Default for AllHitCollector<H> {
    fn default() -> Self {
        Self { hits: Vec::new() }
    }
}

impl<H> HitCollector<H> for AllHitCollector<H> {
    fn add_hit(&mut self, hit: H) {
        self.hits.push(hit);
    }
}

/// Layer mask plus optional per-body predicate applied before narrow tests.
pub struct QueryFilter<'a> {
    /// Bit per object layer index; bodies on cleared layers are skipped.
    pub layer_mask: u32,
    pub ignore_sensors: bool,
    pub predicate: Option<&'a dyn Fn(BodyId, &RigidBody) -> bool>,
}

impl Default for QueryFilter<'_> {
    fn default() -> Self {
        Self {
            layer_mask: u32::MAX,
            ignore_sensors: false,
            predicate: None,
        }
    }
}

impl QueryFilter<'_> {
    pub fn accepts(&self, id: BodyId, body: &RigidBody) -> bool {
        if body.layer.0 < 32 && self.layer_mask & (1 << body.layer.0) == 0 {
            return false;
        }
        if self.ignore_sensors && body.is_sensor {
            return false;
        }
        match self.predicate {
            Some(predicate) => predicate(id, body),
            None => true,
        }
    }
}

/// Shape-level ray cast in world space; `dir` must be unit length.
/// Returns `(t, sub_shape, normal)` for the nearest hit within `max_t`.
pub fn cast_ray_shape(
    registry: &ShapeRegistry,
    shape: &Shape,
    transform: &Transform,
    scale: Vec3,
    sub_shape: SubShapeId,
    origin: Vec3,
    dir: Vec3,
    max_t: f32,
) -> Option<(f32, SubShapeId, Vec3)> {
    match &shape.kind {
        ShapeKind::Sphere { radius } => {
            let r = radius * scale.abs().min_element();
            ray_sphere(origin, dir, transform.position, r, max_t)
                .map(|(t, n)| (t, sub_shape, n))
        }
        ShapeKind::Box { half_extents, .. } => {
            let he = *half_extents * scale.abs();
            let local_origin = transform.point_to_local(origin);
            let local_dir = transform.rotation.conjugate() * dir;
            ray_box_local(local_origin, local_dir, he, max_t)
                .map(|(t, n)| (t, sub_shape, transform.rotation * n))
        }
        ShapeKind::Capsule {
            half_height,
            radius,
        } => {
            let local_origin = transform.point_to_local(origin);
            let local_dir = transform.rotation.conjugate() * dir;
            let r = radius * scale.abs().min_element();
            let hh = half_height * scale.y.abs();
            ray_capsule_local(local_origin, local_dir, hh, r, max_t)
                .map(|(t, n)| (t, sub_shape, transform.rotation * n))
        }
        ShapeKind::Cylinder {
            half_height,
            radius,
            ..
        } => {
            let local_origin = transform.point_to_local(origin);
            let local_dir = transform.rotation.conjugate() * dir;
            let r = radius * scale.x.abs().max(scale.z.abs());
            let hh = half_height * scale.y.abs();
            ray_cylinder_local(local_origin, local_dir, hh, r, max_t)
                .map(|(t, n)| (t, sub_shape, transform.rotation * n))
        }
        ShapeKind::Plane {
            normal, constant, ..
        } => {
            let world_normal = (transform.rotation * (*normal / scale)).normalize_or_zero();
            let base = transform.point_to_world(-*constant * *normal * scale);
            let denom = dir.dot(world_normal);
            if denom.abs() < 1e-8 {
                return None;
            }
            let t = (base - origin).dot(world_normal) / denom;
            if t < 0.0 || t > max_t {
                return None;
            }
            Some((t, sub_shape, world_normal))
        }
        ShapeKind::ConvexHull { .. } => {
            ray_convex_support(&shape.kind, transform, scale, origin, dir, max_t)
                .map(|(t, n)| (t, sub_shape, n))
        }
        ShapeKind::Mesh(mesh) => {
            let local_origin = transform.point_to_local(origin) / scale;
            let local_dir = (transform.rotation.conjugate() * dir / scale).normalize_or_zero();
            if local_dir == Vec3::ZERO {
                return None;
            }
            // Distances in mesh space differ under scale; recompute t from the
            // world-space hit point.
            let (_, tri, _) = mesh.cast_ray(local_origin, local_dir, f32::MAX)?;
            let [v0, v1, v2] = mesh.triangle_vertices(tri);
            let w0 = transform.point_to_world(v0 * scale);
            let w1 = transform.point_to_world(v1 * scale);
            let w2 = transform.point_to_world(v2 * scale);
            let (t, normal) = ray_triangle(origin, dir, w0, w1, w2)?;
            if t > max_t {
                return None;
            }
            let sub = sub_shape.push(tri as u32, mesh.triangle_count() as u32)?;
            Some((t, sub, normal))
        }
        ShapeKind::Compound { children } => {
            let count = children.len() as u32;
            let mut best: Option<(f32, SubShapeId, Vec3)> = None;
            for (index, child) in children.iter().enumerate() {
                let Some(child_shape) = registry.get(child.shape) else {
                    continue;
                };
                let Some(sub) = sub_shape.push(index as u32, count) else {
                    continue;
                };
                let child_transform = transform
                    .combine(&Transform::new(child.position * scale, child.rotation));
                let limit = best.map(|(t, _, _)| t).unwrap_or(max_t);
                if let Some(hit) = cast_ray_shape(
                    registry,
                    child_shape,
                    &child_transform,
                    scale,
                    sub,
                    origin,
                    dir,
                    limit,
                ) {
                    best = Some(hit);
                }
            }
            best
        }
        ShapeKind::Scaled {
            child,
            scale: child_scale,
        } => {
            let child_shape = registry.get(*child)?;
            cast_ray_shape(
                registry,
                child_shape,
                transform,
                scale * *child_scale,
                sub_shape,
                origin,
                dir,
                max_t,
            )
        }
        ShapeKind::Transformed {
            child,
            position,
            rotation,
        } => {
            let child_shape = registry.get(*child)?;
            let child_transform =
                transform.combine(&Transform::new(*position * scale, *rotation));
            cast_ray_shape(
                registry,
                child_shape,
                &child_transform,
                scale,
                sub_shape,
                origin,
                dir,
                max_t,
            )
        }
        ShapeKind::Empty => None,
    }
}

/// Point containment test against a shape.
pub fn collide_point_shape(
    registry: &ShapeRegistry,
    shape: &Shape,
    transform: &Transform,
    scale: Vec3,
    point: Vec3,
) -> bool {
    match &shape.kind {
        ShapeKind::Sphere { radius } => {
            let r = radius * scale.abs().min_element();
            (point - transform.position).length_squared() <= r * r
        }
        ShapeKind::Box { half_extents, .. } => {
            let he = *half_extents * scale.abs();
            let local = transform.point_to_local(point);
            local.abs().cmple(he).all()
        }
        ShapeKind::Capsule {
            half_height,
            radius,
        } => {
            let local = transform.point_to_local(point);
            let hh = half_height * scale.y.abs();
            let r = radius * scale.abs().min_element();
            let clamped_y = local.y.clamp(-hh, hh);
            (local - Vec3::new(0.0, clamped_y, 0.0)).length_squared() <= r * r
        }
        ShapeKind::Cylinder {
            half_height,
            radius,
            ..
        } => {
            let local = transform.point_to_local(point);
            let hh = half_height * scale.y.abs();
            let r = radius * scale.x.abs().max(scale.z.abs());
            local.y.abs() <= hh && (local.x * local.x + local.z * local.z) <= r * r
        }
        ShapeKind::Plane {
            normal, constant, ..
        } => {
            let world_normal = (transform.rotation * (*normal / scale)).normalize_or_zero();
            let base = transform.point_to_world(-*constant * *normal * scale);
            (point - base).dot(world_normal) <= 0.0
        }
        ShapeKind::ConvexHull { .. } => {
            let Some(core) = ConvexSupport::new(&shape.kind, SupportMode::IncludeRadius) else {
                return false;
            };
            let hull = TransformedSupport::new(
                core,
                transform.position,
                transform.rotation,
                scale,
            );
            let point_support = PointSupport(point);
            matches!(
                gjk_closest(&point_support, &hull, transform.position - point),
                GjkResult::Intersecting { .. } | GjkResult::Degenerate
            )
        }
        ShapeKind::Compound { children } => children.iter().any(|child| {
            registry.get(child.shape).is_some_and(|child_shape| {
                let child_transform = transform
                    .combine(&Transform::new(child.position * scale, child.rotation));
                collide_point_shape(registry, child_shape, &child_transform, scale, point)
            })
        }),
        ShapeKind::Scaled {
            child,
            scale: child_scale,
        } => registry.get(*child).is_some_and(|child_shape| {
            collide_point_shape(registry, child_shape, transform, scale * *child_scale, point)
        }),
        ShapeKind::Transformed {
            child,
            position,
            rotation,
        } => registry.get(*child).is_some_and(|child_shape| {
            let child_transform =
                transform.combine(&Transform::new(*position * scale, *rotation));
            collide_point_shape(registry, child_shape, &child_transform, scale, point)
        }),
        // Meshes and planes of zero thickness enclose no volume; empty never hits.
        _ => false,
    }
}

struct PointSupport(Vec3);

impl Support for PointSupport {
    fn support(&self, _direction: Vec3) -> Vec3 {
        self.0
    }

    fn convex_radius(&self) -> f32 {
        0.0
    }
}

fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32, max_t: f32) -> Option<(f32, Vec3)> {
    let oc = origin - center;
    let b = 2.0 * oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - 4.0 * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) * 0.5;
    if t < 0.0 || t > max_t {
        return None;
    }
    let point = origin + dir * t;
    Some((t, (point - center).normalize_or_zero()))
}

fn ray_box_local(origin: Vec3, dir: Vec3, he: Vec3, max_t: f32) -> Option<(f32, Vec3)> {
    let mut t_min = 0.0_f32;
    let mut t_max = max_t;
    let mut normal = Vec3::ZERO;

    for i in 0..3 {
        if dir[i].abs() < 1e-8 {
            if origin[i].abs() > he[i] {
                return None;
            }
        } else {
            let inv = 1.0 / dir[i];
            let mut t1 = (-he[i] - origin[i]) * inv;
            let mut t2 = (he[i] - origin[i]) * inv;
            let mut axis_normal = Vec3::ZERO;
            axis_normal[i] = -dir[i].signum();
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
                axis_normal = -axis_normal;
            }
            if t1 > t_min {
                t_min = t1;
                normal = axis_normal;
            }
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }

    if normal == Vec3::ZERO {
        // Origin inside the box.
        normal = -dir;
    }
    Some((t_min, normal))
}

fn ray_capsule_local(
    origin: Vec3,
    dir: Vec3,
    half_height: f32,
    radius: f32,
    max_t: f32,
) -> Option<(f32, Vec3)> {
    let mut best: Option<(f32, Vec3)> = None;

    // Side tube.
    let a = dir.x * dir.x + dir.z * dir.z;
    if a > 1e-8 {
        let b = 2.0 * (origin.x * dir.x + origin.z * dir.z);
        let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / (2.0 * a);
            if (0.0..=max_t).contains(&t) {
                let y = origin.y + dir.y * t;
                if y.abs() <= half_height {
                    let p = origin + dir * t;
                    best = Some((t, Vec3::new(p.x, 0.0, p.z).normalize_or_zero()));
                }
            }
        }
    }

    // Cap spheres.
    for cap_y in [half_height, -half_height] {
        let center = Vec3::new(0.0, cap_y, 0.0);
        if let Some((t, n)) = ray_sphere(origin, dir, center, radius, max_t) {
            if best.map(|(bt, _)| t < bt).unwrap_or(true) {
                best = Some((t, n));
            }
        }
    }

    best
}

fn ray_cylinder_local(
    origin: Vec3,
    dir: Vec3,
    half_height: f32,
    radius: f32,
    max_t: f32,
) -> Option<(f32, Vec3)> {
    let mut best: Option<(f32, Vec3)> = None;

    let a = dir.x * dir.x + dir.z * dir.z;
    if a > 1e-8 {
        let b = 2.0 * (origin.x * dir.x + origin.z * dir.z);
        let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / (2.0 * a);
            if (0.0..=max_t).contains(&t) {
                let y = origin.y + dir.y * t;
                if y.abs() <= half_height {
                    let p = origin + dir * t;
                    best = Some((t, Vec3::new(p.x, 0.0, p.z).normalize_or_zero()));
                }
            }
        }
    }

    if dir.y.abs() > 1e-8 {
        for cap_y in [half_height, -half_height] {
            let t = (cap_y - origin.y) / dir.y;
            if !(0.0..=max_t).contains(&t) {
                continue;
            }
            let p = origin + dir * t;
            if p.x * p.x + p.z * p.z <= radius * radius {
                if best.map(|(bt, _)| t < bt).unwrap_or(true) {
                    best = Some((t, Vec3::new(0.0, cap_y.signum(), 0.0)));
                }
            }
        }
    }

    best
}

// Ray vs convex support via point advancement: march the ray point forward by
// its current distance to the hull until contact or escape.
fn ray_convex_support(
    kind: &ShapeKind,
    transform: &Transform,
    scale: Vec3,
    origin: Vec3,
    dir: Vec3,
    max_t: f32,
) -> Option<(f32, Vec3)> {
    let core = ConvexSupport::new(kind, SupportMode::IncludeRadius)?;
    let hull = TransformedSupport::new(core, transform.position, transform.rotation, scale);

    let mut t = 0.0_f32;
    let mut normal = -dir;
    for _ in 0..32 {
        let point = PointSupport(origin + dir * t);
        match gjk_closest(&point, &hull, transform.position - origin) {
            GjkResult::Separated { distance, axis, .. } => {
                if distance < 1e-4 {
                    return Some((t, normal));
                }
                normal = -axis;
                t += distance;
                if t > max_t {
                    return None;
                }
            }
            GjkResult::Intersecting { .. } | GjkResult::Degenerate => {
                return Some((t, normal));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::ShapeRegistry;
    use glam::Quat;

    #[test]
    fn ray_hits_sphere_front_face() {
        let mut registry = ShapeRegistry::new();
        let id = registry.sphere(1.0).unwrap();
        let shape = registry.get(id).unwrap().clone();
        let transform = Transform::from_position(Vec3::new(5.0, 0.0, 0.0));

        let (t, _, normal) = cast_ray_shape(
            &registry,
            &shape,
            &transform,
            Vec3::ONE,
            SubShapeId::ROOT,
            Vec3::ZERO,
            Vec3::X,
            100.0,
        )
        .unwrap();
        assert!((t - 4.0).abs() < 1e-4);
        assert!(normal.x < -0.99);
    }

    #[test]
    fn ray_respects_rotated_box_faces() {
        let mut registry = ShapeRegistry::new();
        let id = registry.cuboid(Vec3::new(2.0, 0.5, 0.5)).unwrap();
        let shape = registry.get(id).unwrap().clone();
        let transform = Transform::new(
            Vec3::new(0.0, 3.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );

        // The long axis now points up; a ray down the y axis hits at y = 1.
        let (t, _, _) = cast_ray_shape(
            &registry,
            &shape,
            &transform,
            Vec3::ONE,
            SubShapeId::ROOT,
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::NEG_Y,
            100.0,
        )
        .unwrap();
        assert!((t - 5.0).abs() < 1e-3, "t = {t}");
    }

    #[test]
    fn collide_point_respects_compound_children() {
        let mut registry = ShapeRegistry::new();
        let ball = registry.sphere(0.5).unwrap();
        let compound = registry
            .add(ShapeKind::Compound {
                children: vec![
                    crate::core::shape::CompoundChild {
                        shape: ball,
                        position: Vec3::new(2.0, 0.0, 0.0),
                        rotation: Quat::IDENTITY,
                    },
                    crate::core::shape::CompoundChild {
                        shape: ball,
                        position: Vec3::new(-2.0, 0.0, 0.0),
                        rotation: Quat::IDENTITY,
                    },
                ],
            })
            .unwrap();
        let shape = registry.get(compound).unwrap().clone();
        let transform = Transform::default();

        assert!(collide_point_shape(
            &registry,
            &shape,
            &transform,
            Vec3::ONE,
            Vec3::new(2.1, 0.0, 0.0)
        ));
        assert!(!collide_point_shape(
            &registry,
            &shape,
            &transform,
            Vec3::ONE,
            Vec3::ZERO
        ));
    }

    #[test]
    fn closest_collector_keeps_the_nearest_hit() {
        let mut collector = ClosestHitCollector::<RayCastHit>::default();
        for fraction in [5.0, 2.0, 7.0] {
            collector.add_hit(RayCastHit {
                body: BodyId::default(),
                sub_shape: SubShapeId::ROOT,
                fraction,
                point: Vec3::ZERO,
                normal: Vec3::Y,
            });
        }
        assert_eq!(collector.hit.unwrap().fraction, 2.0);
    }

    #[test]
    fn any_collector_early_outs_after_one_hit() {
        let mut collector = AnyHitCollector::<CollidePointHit>::default();
        assert!(!collector.should_early_out());
        collector.add_hit(CollidePointHit {
            body: BodyId::default(),
        });
        assert!(collector.should_early_out());
    }
}

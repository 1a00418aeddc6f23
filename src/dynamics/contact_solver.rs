use glam::{Quat, Vec3};

use crate::{
    collision::{contact_cache::{CachedImpulse, ContactKey}, manifold::ContactManifold},
    config,
    core::body::{BodyId, RigidBody},
};

/// Per-contact response parameters, mutable from listener callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ContactSettings {
    pub combined_friction: f32,
    pub combined_restitution: f32,
    /// Treat the contact as a sensor overlap: events fire, no response.
    pub is_sensor: bool,
    pub inv_mass_scale_a: f32,
    pub inv_mass_scale_b: f32,
    pub inv_inertia_scale_a: f32,
    pub inv_inertia_scale_b: f32,
}

impl ContactSettings {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            combined_friction: friction,
            combined_restitution: restitution,
            is_sensor: false,
            inv_mass_scale_a: 1.0,
            inv_mass_scale_b: 1.0,
            inv_inertia_scale_a: 1.0,
            inv_inertia_scale_b: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ContactPointState {
    r_a: Vec3,
    r_b: Vec3,
    /// Anchors in body-local space for the position pass.
    local_a: Vec3,
    local_b: Vec3,
    separation: f32,
    normal_mass: f32,
    tangent_mass: [f32; 2],
    restitution_bias: f32,
    normal_impulse: f32,
    tangent_impulse: [f32; 2],
}

/// Solver-side view of one manifold for one step.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub key: ContactKey,
    pub normal: Vec3,
    tangent1: Vec3,
    tangent2: Vec3,
    friction: f32,
    restitution: f32,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_scale_a: f32,
    inv_inertia_scale_b: f32,
    /// Contacts created by CCD resolution skip warm starting.
    pub allow_warm_start: bool,
    points: Vec<ContactPointState>,
}

impl ContactConstraint {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        body_a: &RigidBody,
        body_b: &RigidBody,
        key: ContactKey,
        manifold: &ContactManifold,
        settings: &ContactSettings,
        cached: &[CachedImpulse],
        allow_warm_start: bool,
        min_velocity_for_restitution: f32,
    ) -> Self {
        let normal = manifold.normal;
        let (tangent1, tangent2) = normal.any_orthonormal_pair();

        let inv_mass_a = body_a.inverse_mass() * settings.inv_mass_scale_a;
        let inv_mass_b = body_b.inverse_mass() * settings.inv_mass_scale_b;
        let inv_inertia_a = body_a.inverse_inertia_world() * settings.inv_inertia_scale_a;
        let inv_inertia_b = body_b.inverse_inertia_world() * settings.inv_inertia_scale_b;

        let mut points = Vec::with_capacity(manifold.point_count());
        for i in 0..manifold.point_count() {
            let pa = manifold.world_point_a(i);
            let pb = manifold.world_point_b(i);
            let r_a = pa - body_a.com_position;
            let r_b = pb - body_b.com_position;

            let mass_for = |axis: Vec3| {
                let ra_cross = r_a.cross(axis);
                let rb_cross = r_b.cross(axis);
                let k = inv_mass_a
                    + inv_mass_b
                    + ra_cross.dot(inv_inertia_a * ra_cross)
                    + rb_cross.dot(inv_inertia_b * rb_cross);
                if k > 1e-9 {
                    1.0 / k
                } else {
                    0.0
                }
            };

            // Approach speed at build time decides restitution.
            let v_a = body_a.velocity.point_velocity(r_a);
            let v_b = body_b.velocity.point_velocity(r_b);
            let approach = (v_b - v_a).dot(normal);
            let restitution_bias = if approach < -min_velocity_for_restitution {
                settings.combined_restitution * approach
            } else {
                0.0
            };

            let cached_impulse = cached.get(i).copied().unwrap_or_default();

            points.push(ContactPointState {
                r_a,
                r_b,
                local_a: body_a.rotation.conjugate() * r_a,
                local_b: body_b.rotation.conjugate() * r_b,
                separation: manifold.separation(i),
                normal_mass: mass_for(normal),
                tangent_mass: [mass_for(tangent1), mass_for(tangent2)],
                restitution_bias,
                normal_impulse: cached_impulse.normal,
                tangent_impulse: cached_impulse.tangent,
            });
        }

        Self {
            body_a: body_a.id,
            body_b: body_b.id,
            key,
            normal,
            tangent1,
            tangent2,
            friction: settings.combined_friction,
            restitution: settings.combined_restitution,
            inv_mass_a,
            inv_mass_b,
            inv_inertia_scale_a: settings.inv_inertia_scale_a,
            inv_inertia_scale_b: settings.inv_inertia_scale_b,
            allow_warm_start,
            points,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn max_penetration(&self) -> f32 {
        self.points
            .iter()
            .map(|p| -p.separation)
            .fold(f32::MIN, f32::max)
    }

    /// Final accumulated impulses, for writing back into the contact cache.
    pub fn impulses(&self) -> Vec<CachedImpulse> {
        self.points
            .iter()
            .map(|p| CachedImpulse {
                normal: p.normal_impulse,
                tangent: p.tangent_impulse,
            })
            .collect()
    }

    fn apply_impulse(
        &self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        r_a: Vec3,
        r_b: Vec3,
        impulse: Vec3,
    ) {
        if body_a.is_dynamic() {
            let dofs = body_a.motion.allowed_dofs;
            body_a.velocity.linear -= dofs.filter_linear(impulse * self.inv_mass_a);
            body_a.velocity.angular -= dofs.filter_angular(
                body_a.inverse_inertia_world() * self.inv_inertia_scale_a * r_a.cross(impulse),
            );
        }
        if body_b.is_dynamic() {
            let dofs = body_b.motion.allowed_dofs;
            body_b.velocity.linear += dofs.filter_linear(impulse * self.inv_mass_b);
            body_b.velocity.angular += dofs.filter_angular(
                body_b.inverse_inertia_world() * self.inv_inertia_scale_b * r_b.cross(impulse),
            );
        }
    }

    /// Re-applies last step's impulses scaled by `ratio = Δt / Δt_prev`.
    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        if !self.allow_warm_start || ratio == 0.0 {
            for point in &mut self.points {
                point.normal_impulse = 0.0;
                point.tangent_impulse = [0.0; 2];
            }
            return;
        }
        for i in 0..self.points.len() {
            let point = &mut self.points[i];
            point.normal_impulse *= ratio;
            point.tangent_impulse[0] *= ratio;
            point.tangent_impulse[1] *= ratio;
            let impulse = self.normal * point.normal_impulse
                + self.tangent1 * point.tangent_impulse[0]
                + self.tangent2 * point.tangent_impulse[1];
            let (r_a, r_b) = (point.r_a, point.r_b);
            if impulse.length_squared() > 0.0 {
                self.apply_impulse(body_a, body_b, r_a, r_b, impulse);
            }
        }
    }

    /// One velocity iteration over all points. Returns the summed magnitude of
    /// applied impulses.
    pub fn solve_velocity(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        baumgarte: f32,
        slop: f32,
    ) -> f32 {
        let mut applied = 0.0;

        for i in 0..self.points.len() {
            let point = self.points[i];

            // Normal axis.
            let v_a = body_a.velocity.point_velocity(point.r_a);
            let v_b = body_b.velocity.point_velocity(point.r_b);
            let v_n = (v_b - v_a).dot(self.normal);

            let bias = if point.separation > 0.0 {
                // Speculative contact: allow closing the gap within the step
                // but no faster.
                point.separation / dt + point.restitution_bias
            } else {
                let penetration = -point.separation;
                point.restitution_bias - baumgarte * (penetration - slop).max(0.0) / dt
            };

            let lambda = -point.normal_mass * (v_n + bias);
            let new_total = (point.normal_impulse + lambda).max(0.0);
            let delta = new_total - point.normal_impulse;
            self.points[i].normal_impulse = new_total;
            if delta != 0.0 {
                self.apply_impulse(body_a, body_b, point.r_a, point.r_b, self.normal * delta);
                applied += delta.abs();
            }

            // Friction axes, clamped to the Coulomb cone.
            let max_friction = self.friction * self.points[i].normal_impulse;
            if max_friction > 0.0 {
                let v_a = body_a.velocity.point_velocity(point.r_a);
                let v_b = body_b.velocity.point_velocity(point.r_b);
                let rel = v_b - v_a;

                let mut new_t = [0.0_f32; 2];
                for (axis_index, tangent) in [self.tangent1, self.tangent2].into_iter().enumerate()
                {
                    let v_t = rel.dot(tangent);
                    let lambda = -point.tangent_mass[axis_index] * v_t;
                    new_t[axis_index] = self.points[i].tangent_impulse[axis_index] + lambda;
                }

                // |λt| <= μ·λn as a circular cone on the accumulated impulse.
                let len = (new_t[0] * new_t[0] + new_t[1] * new_t[1]).sqrt();
                if len > max_friction {
                    let scale = max_friction / len;
                    new_t[0] *= scale;
                    new_t[1] *= scale;
                }

                let delta_t = [
                    new_t[0] - self.points[i].tangent_impulse[0],
                    new_t[1] - self.points[i].tangent_impulse[1],
                ];
                self.points[i].tangent_impulse = new_t;
                let impulse = self.tangent1 * delta_t[0] + self.tangent2 * delta_t[1];
                if impulse.length_squared() > 0.0 {
                    self.apply_impulse(body_a, body_b, point.r_a, point.r_b, impulse);
                    applied += impulse.length();
                }
            } else {
                self.points[i].tangent_impulse = [0.0; 2];
            }
        }

        applied
    }

    /// One nonlinear position iteration. Returns the largest correction
    /// applied, which drives per-island early termination.
    pub fn solve_position(
        &self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        baumgarte: f32,
        slop: f32,
    ) -> f32 {
        let mut max_correction = 0.0_f32;

        for point in &self.points {
            // Anchors track the bodies as they are corrected; the anchors are
            // the build-time surface points, so their gap along the normal is
            // the current separation.
            let r_a = body_a.rotation * point.local_a;
            let r_b = body_b.rotation * point.local_b;
            let pa = body_a.com_position + r_a;
            let pb = body_b.com_position + r_b;
            let separation = (pb - pa).dot(self.normal);

            let c = separation + slop;
            if c >= 0.0 {
                continue;
            }

            let lambda = -point.normal_mass * baumgarte * c;
            max_correction = max_correction.max(lambda.abs());
            let impulse = self.normal * lambda;

            if body_a.is_dynamic() {
                let dofs = body_a.motion.allowed_dofs;
                body_a.com_position -= dofs.filter_linear(impulse * self.inv_mass_a);
                let dtheta = dofs.filter_angular(
                    body_a.inverse_inertia_world()
                        * self.inv_inertia_scale_a
                        * r_a.cross(impulse),
                );
                apply_rotation_delta(body_a, -dtheta);
            }
            if body_b.is_dynamic() {
                let dofs = body_b.motion.allowed_dofs;
                body_b.com_position += dofs.filter_linear(impulse * self.inv_mass_b);
                let dtheta = dofs.filter_angular(
                    body_b.inverse_inertia_world()
                        * self.inv_inertia_scale_b
                        * r_b.cross(impulse),
                );
                apply_rotation_delta(body_b, dtheta);
            }
        }

        max_correction
    }
}

/// Applies a small rotation vector to a body's orientation.
pub fn apply_rotation_delta(body: &mut RigidBody, dtheta: Vec3) {
    let angle = dtheta.length();
    if angle < 1e-9 {
        return;
    }
    let delta = Quat::from_axis_angle(dtheta / angle, angle);
    body.rotation = (delta * body.rotation).normalize();
}

/// Sanity cap: manifolds entering the solver obey the reduction bound.
pub const MAX_SOLVER_POINTS: usize = config::MAX_MANIFOLD_POINTS;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        aabb::Aabb,
        body::{BodyId, MotionProperties, MotionType, RigidBody},
        layers::ObjectLayer,
        shape::ShapeId,
        subshape::SubShapeId,
        types::{Material, Velocity},
    };
    use glam::Quat;

    fn body(position: Vec3, motion_type: MotionType) -> RigidBody {
        let mut b = RigidBody {
            id: BodyId::default(),
            shape: ShapeId::default(),
            position,
            com_position: position,
            rotation: Quat::IDENTITY,
            local_com: Vec3::ZERO,
            world_aabb: Aabb::INVALID,
            velocity: Velocity::default(),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            motion_type,
            motion: MotionProperties::default(),
            material: Material::default(),
            layer: ObjectLayer(0),
            collision_group: 0,
            collision_mask: u32::MAX,
            is_sensor: false,
            sleeping: false,
            allow_sleeping: true,
            enhanced_internal_edge_removal: false,
            use_manifold_reduction: true,
            sleep_timer: 0.0,
            constraints: Vec::new(),
            ccd_slot: -1,
            inner_radius: 0.5,
        };
        if motion_type != MotionType::Dynamic {
            b.motion.inverse_mass = 0.0;
        }
        b
    }

    fn touching_manifold() -> ContactManifold {
        ContactManifold {
            base_offset: Vec3::ZERO,
            normal: Vec3::Y,
            penetration: 0.01,
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            // Ground surface at y=0 (A), sphere dipping to y=-0.01 (B).
            points_a: vec![Vec3::ZERO],
            points_b: vec![Vec3::new(0.0, -0.01, 0.0)],
        }
    }

    fn key() -> ContactKey {
        ContactKey::new(
            BodyId::new(0, 0),
            BodyId::new(1, 0),
            SubShapeId::ROOT,
            SubShapeId::ROOT,
        )
    }

    #[test]
    fn normal_impulse_stops_approach() {
        let mut ground = body(Vec3::ZERO, MotionType::Static);
        let mut ball = body(Vec3::new(0.0, 1.0, 0.0), MotionType::Dynamic);
        ball.velocity.linear = Vec3::new(0.0, -3.0, 0.0);

        let settings = ContactSettings::new(0.5, 0.0);
        let mut constraint = ContactConstraint::build(
            &ground,
            &ball,
            key(),
            &touching_manifold(),
            &settings,
            &[],
            true,
            1.0,
        );

        for _ in 0..8 {
            constraint.solve_velocity(&mut ground, &mut ball, 1.0 / 60.0, 0.2, 0.02);
        }
        assert!(ball.velocity.linear.y >= -1e-3, "vy {}", ball.velocity.linear.y);
        assert_eq!(ground.velocity.linear, Vec3::ZERO);
    }

    #[test]
    fn restitution_reverses_fast_approach() {
        let mut ground = body(Vec3::ZERO, MotionType::Static);
        let mut ball = body(Vec3::new(0.0, 1.0, 0.0), MotionType::Dynamic);
        ball.velocity.linear = Vec3::new(0.0, -4.0, 0.0);

        let settings = ContactSettings::new(0.0, 0.5);
        let mut constraint = ContactConstraint::build(
            &ground,
            &ball,
            key(),
            &touching_manifold(),
            &settings,
            &[],
            true,
            1.0,
        );

        for _ in 0..10 {
            constraint.solve_velocity(&mut ground, &mut ball, 1.0 / 60.0, 0.2, 0.02);
        }
        assert!(
            (ball.velocity.linear.y - 2.0).abs() < 0.1,
            "vy {}",
            ball.velocity.linear.y
        );
    }

    #[test]
    fn friction_is_bounded_by_the_cone() {
        let mut ground = body(Vec3::ZERO, MotionType::Static);
        let mut ball = body(Vec3::new(0.0, 1.0, 0.0), MotionType::Dynamic);
        ball.velocity.linear = Vec3::new(5.0, -1.0, 0.0);

        let settings = ContactSettings::new(0.4, 0.0);
        let mut constraint = ContactConstraint::build(
            &ground,
            &ball,
            key(),
            &touching_manifold(),
            &settings,
            &[],
            true,
            1.0,
        );

        for _ in 0..10 {
            constraint.solve_velocity(&mut ground, &mut ball, 1.0 / 60.0, 0.2, 0.02);
        }
        let impulses = constraint.impulses();
        let tangent_len = (impulses[0].tangent[0].powi(2) + impulses[0].tangent[1].powi(2)).sqrt();
        assert!(tangent_len <= 0.4 * impulses[0].normal + 1e-5);
        // Sliding continues; friction alone cannot stop 5 m/s in one step.
        assert!(ball.velocity.linear.x > 0.0);
    }

    #[test]
    fn position_solve_pushes_out_of_penetration() {
        let mut ground = body(Vec3::ZERO, MotionType::Static);
        let mut ball = body(Vec3::new(0.0, 1.0, 0.0), MotionType::Dynamic);

        let manifold = ContactManifold {
            base_offset: Vec3::ZERO,
            normal: Vec3::Y,
            penetration: 0.2,
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            points_a: vec![Vec3::ZERO],
            points_b: vec![Vec3::new(0.0, -0.2, 0.0)],
        };
        let settings = ContactSettings::new(0.0, 0.0);
        let constraint = ContactConstraint::build(
            &ground,
            &ball,
            key(),
            &manifold,
            &settings,
            &[],
            true,
            1.0,
        );

        let before = ball.com_position.y;
        for _ in 0..10 {
            constraint.solve_position(&mut ground, &mut ball, 0.2, 0.02);
        }
        assert!(ball.com_position.y > before + 0.1, "y {}", ball.com_position.y);
    }

    #[test]
    fn sensor_like_zero_mass_scale_applies_nothing() {
        let mut a = body(Vec3::ZERO, MotionType::Dynamic);
        let mut b = body(Vec3::new(0.0, 1.0, 0.0), MotionType::Dynamic);
        b.velocity.linear = Vec3::new(0.0, -3.0, 0.0);

        let mut settings = ContactSettings::new(0.5, 0.0);
        settings.inv_mass_scale_a = 0.0;
        settings.inv_inertia_scale_a = 0.0;
        let mut constraint =
            ContactConstraint::build(&a, &b, key(), &touching_manifold(), &settings, &[], true, 1.0);
        constraint.solve_velocity(&mut a, &mut b, 1.0 / 60.0, 0.2, 0.02);
        // A is shielded by its zero mass scale.
        assert_eq!(a.velocity.linear, Vec3::ZERO);
    }
}

use glam::Quat;

use crate::core::body::{MotionType, RigidBody};

/// Semi-implicit Euler integration of forces into velocities.
///
/// Order per step: accelerations, damping, velocity clamps, DOF locks.
pub fn integrate_velocity(body: &mut RigidBody, gravity: glam::Vec3, dt: f32) {
    if body.motion_type != MotionType::Dynamic || body.sleeping {
        return;
    }
    let motion = body.motion;

    let linear_acceleration =
        body.force * motion.inverse_mass + gravity * motion.gravity_factor;
    body.velocity.linear += linear_acceleration * dt;

    let angular_acceleration = body.inverse_inertia_world() * body.torque;
    body.velocity.angular += angular_acceleration * dt;

    body.velocity.linear *= (1.0 - motion.linear_damping * dt).max(0.0);
    body.velocity.angular *= (1.0 - motion.angular_damping * dt).max(0.0);

    body.velocity.linear = body
        .velocity
        .linear
        .clamp_length_max(motion.max_linear_velocity);
    body.velocity.angular = body
        .velocity
        .angular
        .clamp_length_max(motion.max_angular_velocity);

    body.velocity.linear = motion.allowed_dofs.filter_linear(body.velocity.linear);
    body.velocity.angular = motion.allowed_dofs.filter_angular(body.velocity.angular);
}

/// Integrates linear velocity into the centre-of-mass position.
pub fn integrate_position(body: &mut RigidBody, dt: f32) {
    if body.motion_type == MotionType::Static || body.sleeping {
        return;
    }
    body.com_position += body.velocity.linear * dt;
    integrate_orientation(body, dt);
}

/// Integrates angular velocity into the orientation quaternion and
/// renormalises.
pub fn integrate_orientation(body: &mut RigidBody, dt: f32) {
    let omega = body.velocity.angular;
    let angle = omega.length() * dt;
    if angle > 1e-9 {
        let axis = omega.normalize();
        let delta = Quat::from_axis_angle(axis, angle);
        body.rotation = (delta * body.rotation).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        aabb::Aabb,
        body::{AllowedDofs, BodyId, MotionProperties, RigidBody},
        layers::ObjectLayer,
        shape::ShapeId,
        types::{Material, Velocity},
    };
    use glam::Vec3;

    fn dynamic_body() -> RigidBody {
        RigidBody {
            id: BodyId::default(),
            shape: ShapeId::default(),
            position: Vec3::ZERO,
            com_position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            local_com: Vec3::ZERO,
            world_aabb: Aabb::INVALID,
            velocity: Velocity::default(),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            motion_type: MotionType::Dynamic,
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
        }
    }

    #[test]
    fn gravity_accelerates_dynamic_bodies() {
        let mut body = dynamic_body();
        body.motion.linear_damping = 0.0;
        integrate_velocity(&mut body, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
        assert!((body.velocity.linear.y + 9.81 / 60.0).abs() < 1e-5);
    }

    #[test]
    fn velocity_is_clamped_to_the_configured_maximum() {
        let mut body = dynamic_body();
        body.motion.max_linear_velocity = 10.0;
        body.velocity.linear = Vec3::new(100.0, 0.0, 0.0);
        integrate_velocity(&mut body, Vec3::ZERO, 1.0 / 60.0);
        assert!(body.velocity.linear.length() <= 10.0 + 1e-4);
    }

    #[test]
    fn locked_dofs_stay_zero_through_integration() {
        let mut body = dynamic_body();
        body.motion.allowed_dofs = AllowedDofs::PLANE_2D;
        body.force = Vec3::new(1.0, 1.0, 1.0);
        body.torque = Vec3::new(1.0, 1.0, 1.0);
        integrate_velocity(&mut body, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
        assert_eq!(body.velocity.linear.z, 0.0);
        assert_eq!(body.velocity.angular.x, 0.0);
        assert_eq!(body.velocity.angular.y, 0.0);
    }

    #[test]
    fn zero_angle_integration_preserves_orientation() {
        let mut body = dynamic_body();
        body.rotation = Quat::from_rotation_y(0.5);
        let before = body.rotation;
        integrate_orientation(&mut body, 1.0 / 60.0);
        assert!(body.rotation.dot(before).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn sleeping_bodies_do_not_move() {
        let mut body = dynamic_body();
        body.sleeping = true;
        body.velocity.linear = Vec3::new(1.0, 0.0, 0.0);
        integrate_position(&mut body, 1.0);
        assert_eq!(body.com_position, Vec3::ZERO);
    }
}

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    core::body::{BodyId, ConstraintId, RigidBody},
    dynamics::axis_constraint::{
        angular_effective_mass, apply_angular_impulse, apply_linear_impulse,
        linear_effective_mass, MotorSettings, MotorState, SpringSettings,
    },
    dynamics::contact_solver::apply_rotation_delta,
};

const POSITION_BIAS: f32 = 0.2;
const MAX_LINEAR_BIAS: f32 = 20.0;
const MAX_ANGULAR_BIAS: f32 = 10.0;

/// Whether constraint frames are given in body-local or world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConstraintSpace {
    Local,
    #[default]
    World,
}

/// Per-axis behaviour of a six-DOF constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum AxisMode {
    Free,
    Limited {
        min: f32,
        max: f32,
    },
    #[default]
    Locked,
}

/// Tagged variant data of a user constraint, all frames in body-local space
/// relative to each body's centre of mass.
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    Point {
        anchor_a: Vec3,
        anchor_b: Vec3,
    },
    Distance {
        anchor_a: Vec3,
        anchor_b: Vec3,
        min_distance: f32,
        max_distance: f32,
        spring: Option<SpringSettings>,
    },
    Hinge {
        anchor_a: Vec3,
        anchor_b: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
        /// Reference directions perpendicular to the hinge axis, for angles.
        normal_a: Vec3,
        normal_b: Vec3,
        limits: Option<(f32, f32)>,
        motor: MotorSettings,
        motor_state: MotorState,
        target_velocity: f32,
        target_angle: f32,
    },
    Fixed {
        anchor_a: Vec3,
        anchor_b: Vec3,
        /// Rotation of B's frame relative to A's at attach time.
        reference_rotation: Quat,
    },
    Slider {
        anchor_a: Vec3,
        anchor_b: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
        reference_rotation: Quat,
        limits: Option<(f32, f32)>,
        motor: MotorSettings,
        motor_state: MotorState,
        target_velocity: f32,
        target_position: f32,
    },
    Cone {
        anchor_a: Vec3,
        anchor_b: Vec3,
        twist_axis_a: Vec3,
        twist_axis_b: Vec3,
        half_cone_angle: f32,
    },
    SwingTwist {
        anchor_a: Vec3,
        anchor_b: Vec3,
        twist_axis_a: Vec3,
        twist_axis_b: Vec3,
        plane_axis_a: Vec3,
        swing_y_half_angle: f32,
        swing_z_half_angle: f32,
        twist_min: f32,
        twist_max: f32,
        motor: MotorSettings,
        motor_state: MotorState,
        target_twist_velocity: f32,
    },
    SixDof {
        anchor_a: Vec3,
        anchor_b: Vec3,
        /// Constraint frame of body A (columns: x, y, z axes, local space).
        frame_a: Quat,
        frame_b: Quat,
        translation: [AxisMode; 3],
        rotation: [AxisMode; 3],
        motor: MotorSettings,
        motor_state: MotorState,
        target_velocity: Vec3,
    },
}

/// Impulses carried across steps for warm starting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintWarmStart {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// A user constraint between two bodies.
#[derive(Debug, Clone)]
pub struct UserConstraint {
    pub id: ConstraintId,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub enabled: bool,
    pub kind: ConstraintKind,
    pub warm: ConstraintWarmStart,
    /// Applied linear/angular impulse accumulated this step.
    step_linear: Vec3,
    step_angular: Vec3,
}

impl UserConstraint {
    pub fn new(id: ConstraintId, body_a: BodyId, body_b: BodyId, kind: ConstraintKind) -> Self {
        Self {
            id,
            body_a,
            body_b,
            enabled: true,
            kind,
            warm: ConstraintWarmStart::default(),
            step_linear: Vec3::ZERO,
            step_angular: Vec3::ZERO,
        }
    }

    pub fn set_motor_state(&mut self, state: MotorState) {
        match &mut self.kind {
            ConstraintKind::Hinge { motor_state, .. }
            | ConstraintKind::Slider { motor_state, .. }
            | ConstraintKind::SwingTwist { motor_state, .. }
            | ConstraintKind::SixDof { motor_state, .. } => *motor_state = state,
            _ => {}
        }
    }

    /// Target angular velocity for hinge / swing-twist motors (rad/s) or
    /// linear velocity for slider motors (m/s).
    pub fn set_target_velocity(&mut self, velocity: f32) {
        match &mut self.kind {
            ConstraintKind::Hinge {
                target_velocity, ..
            }
            | ConstraintKind::Slider {
                target_velocity, ..
            }
            | ConstraintKind::SwingTwist {
                target_twist_velocity: target_velocity,
                ..
            } => *target_velocity = velocity,
            _ => {}
        }
    }

    pub fn set_target_position(&mut self, position: f32) {
        match &mut self.kind {
            ConstraintKind::Hinge { target_angle, .. } => *target_angle = position,
            ConstraintKind::Slider {
                target_position, ..
            } => *target_position = position,
            _ => {}
        }
    }

    pub fn set_torque_limit(&mut self, limit: f32) {
        match &mut self.kind {
            ConstraintKind::Hinge { motor, .. }
            | ConstraintKind::Slider { motor, .. }
            | ConstraintKind::SwingTwist { motor, .. }
            | ConstraintKind::SixDof { motor, .. } => motor.max_force = limit,
            _ => {}
        }
    }

    /// Re-applies last step's accumulated impulse scaled by `Δt / Δt_prev`.
    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.step_linear = Vec3::ZERO;
        self.step_angular = Vec3::ZERO;
        if ratio == 0.0 {
            return;
        }
        let (anchor_a, anchor_b) = self.anchors();
        let r_a = body_a.rotation * anchor_a;
        let r_b = body_b.rotation * anchor_b;
        let linear = self.warm.linear * ratio;
        let angular = self.warm.angular * ratio;
        if linear != Vec3::ZERO {
            apply_linear_impulse(body_a, body_b, r_a, r_b, linear);
            self.step_linear = linear;
        }
        if angular != Vec3::ZERO {
            apply_angular_impulse(body_a, body_b, angular);
            self.step_angular = angular;
        }
    }

    /// Stores this step's impulses for the next warm start.
    pub fn finish_step(&mut self) {
        self.warm.linear = self.step_linear;
        self.warm.angular = self.step_angular;
    }

    fn anchors(&self) -> (Vec3, Vec3) {
        match &self.kind {
            ConstraintKind::Point { anchor_a, anchor_b }
            | ConstraintKind::Distance {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::Hinge {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::Fixed {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::Slider {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::Cone {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::SwingTwist {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::SixDof {
                anchor_a, anchor_b, ..
            } => (*anchor_a, *anchor_b),
        }
    }

    /// One velocity iteration.
    pub fn solve_velocity(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        inv_iterations: f32,
    ) {
        match self.kind.clone() {
            ConstraintKind::Point { anchor_a, anchor_b } => {
                let applied = solve_point_lock(body_a, body_b, anchor_a, anchor_b, dt);
                self.step_linear += applied;
            }
            ConstraintKind::Distance {
                anchor_a,
                anchor_b,
                min_distance,
                max_distance,
                spring,
            } => {
                self.solve_distance(
                    body_a,
                    body_b,
                    anchor_a,
                    anchor_b,
                    min_distance,
                    max_distance,
                    spring,
                    dt,
                );
            }
            ConstraintKind::Hinge {
                anchor_a,
                anchor_b,
                axis_a,
                axis_b,
                normal_a,
                normal_b,
                limits,
                motor,
                motor_state,
                target_velocity,
                target_angle,
            } => {
                let applied = solve_point_lock(body_a, body_b, anchor_a, anchor_b, dt);
                self.step_linear += applied;

                let world_axis_a = (body_a.rotation * axis_a).normalize_or_zero();
                let world_axis_b = (body_b.rotation * axis_b).normalize_or_zero();

                // Kill relative rotation perpendicular to the hinge axis.
                let correction_axis = world_axis_b.cross(world_axis_a);
                let perp = {
                    let rel = body_b.velocity.angular - body_a.velocity.angular;
                    rel - world_axis_a * rel.dot(world_axis_a)
                };
                let bias = (correction_axis * (POSITION_BIAS / dt))
                    .clamp_length_max(MAX_ANGULAR_BIAS);
                let k = body_a.inverse_inertia_world() + body_b.inverse_inertia_world();
                if k.determinant().abs() > 1e-9 {
                    let impulse = k.inverse() * -(perp - bias);
                    // Keep the impulse perpendicular to the hinge axis.
                    let impulse = impulse - world_axis_a * impulse.dot(world_axis_a);
                    apply_angular_impulse(body_a, body_b, impulse);
                    self.step_angular += impulse;
                }

                // Motor about the hinge axis.
                let axis_mass = angular_effective_mass(body_a, body_b, world_axis_a);
                if axis_mass > 0.0 {
                    match motor_state {
                        MotorState::Velocity => {
                            let rel = (body_b.velocity.angular - body_a.velocity.angular)
                                .dot(world_axis_a);
                            let impulse_mag = (target_velocity - rel) * axis_mass;
                            let max = motor.impulse_limit(dt, inv_iterations);
                            let clamped = impulse_mag.clamp(-max, max);
                            apply_angular_impulse(body_a, body_b, world_axis_a * clamped);
                            self.step_angular += world_axis_a * clamped;
                        }
                        MotorState::Position => {
                            let angle =
                                hinge_angle(body_a, body_b, world_axis_a, normal_a, normal_b);
                            let error = wrap_angle(target_angle - angle);
                            let rel = (body_b.velocity.angular - body_a.velocity.angular)
                                .dot(world_axis_a);
                            let impulse_mag =
                                (motor.position_gain * error / dt - rel) * axis_mass;
                            let max = motor.impulse_limit(dt, inv_iterations);
                            let clamped = impulse_mag.clamp(-max, max);
                            apply_angular_impulse(body_a, body_b, world_axis_a * clamped);
                            self.step_angular += world_axis_a * clamped;
                        }
                        MotorState::Off => {}
                    }

                    // Rotation limits about the hinge axis.
                    if let Some((lower, upper)) = limits {
                        let angle = hinge_angle(body_a, body_b, world_axis_a, normal_a, normal_b);
                        let rel = (body_b.velocity.angular - body_a.velocity.angular)
                            .dot(world_axis_a);
                        let mut impulse_mag = 0.0;
                        if angle <= lower {
                            let bias = ((lower - angle) * POSITION_BIAS / dt).min(2.0);
                            impulse_mag = ((bias - rel) * axis_mass).max(0.0);
                        } else if angle >= upper {
                            let bias = ((upper - angle) * POSITION_BIAS / dt).max(-2.0);
                            impulse_mag = ((bias - rel) * axis_mass).min(0.0);
                        }
                        if impulse_mag != 0.0 {
                            apply_angular_impulse(body_a, body_b, world_axis_a * impulse_mag);
                            self.step_angular += world_axis_a * impulse_mag;
                        }
                    }
                }
            }
            ConstraintKind::Fixed {
                anchor_a,
                anchor_b,
                reference_rotation,
            } => {
                let applied = solve_point_lock(body_a, body_b, anchor_a, anchor_b, dt);
                self.step_linear += applied;
                let applied =
                    solve_rotation_lock(body_a, body_b, reference_rotation, dt);
                self.step_angular += applied;
            }
            ConstraintKind::Slider {
                anchor_a,
                anchor_b,
                axis_a,
                reference_rotation,
                limits,
                motor,
                motor_state,
                target_velocity,
                target_position,
                ..
            } => {
                let applied = solve_rotation_lock(body_a, body_b, reference_rotation, dt);
                self.step_angular += applied;

                let r_a = body_a.rotation * anchor_a;
                let r_b = body_b.rotation * anchor_b;
                let axis = (body_a.rotation * axis_a).normalize_or_zero();
                let delta = (body_b.com_position + r_b) - (body_a.com_position + r_a);

                // Lock the two directions perpendicular to the slide axis.
                let (u, v) = axis.any_orthonormal_pair();
                for lock_axis in [u, v] {
                    let error = delta.dot(lock_axis);
                    let bias = (error * POSITION_BIAS / dt).clamp(-MAX_LINEAR_BIAS, MAX_LINEAR_BIAS);
                    let mass = linear_effective_mass(body_a, body_b, r_a, r_b, lock_axis);
                    if mass > 0.0 {
                        let v_a = body_a.velocity.point_velocity(r_a);
                        let v_b = body_b.velocity.point_velocity(r_b);
                        let rel = (v_b - v_a).dot(lock_axis);
                        let impulse = lock_axis * (-(rel + bias) * mass);
                        apply_linear_impulse(body_a, body_b, r_a, r_b, impulse);
                        self.step_linear += impulse;
                    }
                }

                // Motor and limits along the axis.
                let mass = linear_effective_mass(body_a, body_b, r_a, r_b, axis);
                if mass > 0.0 {
                    let position = delta.dot(axis);
                    let v_a = body_a.velocity.point_velocity(r_a);
                    let v_b = body_b.velocity.point_velocity(r_b);
                    let rel = (v_b - v_a).dot(axis);

                    match motor_state {
                        MotorState::Velocity => {
                            let impulse_mag = (target_velocity - rel) * mass;
                            let max = motor.impulse_limit(dt, inv_iterations);
                            let clamped = impulse_mag.clamp(-max, max);
                            apply_linear_impulse(body_a, body_b, r_a, r_b, axis * clamped);
                            self.step_linear += axis * clamped;
                        }
                        MotorState::Position => {
                            let error = target_position - position;
                            let impulse_mag = (motor.position_gain * error / dt - rel) * mass;
                            let max = motor.impulse_limit(dt, inv_iterations);
                            let clamped = impulse_mag.clamp(-max, max);
                            apply_linear_impulse(body_a, body_b, r_a, r_b, axis * clamped);
                            self.step_linear += axis * clamped;
                        }
                        MotorState::Off => {}
                    }

                    if let Some((lower, upper)) = limits {
                        let mut impulse_mag = 0.0;
                        if position <= lower {
                            let bias = ((lower - position) * POSITION_BIAS / dt).min(2.0);
                            impulse_mag = ((bias - rel) * mass).max(0.0);
                        } else if position >= upper {
                            let bias = ((upper - position) * POSITION_BIAS / dt).max(-2.0);
                            impulse_mag = ((bias - rel) * mass).min(0.0);
                        }
                        if impulse_mag != 0.0 {
                            apply_linear_impulse(body_a, body_b, r_a, r_b, axis * impulse_mag);
                            self.step_linear += axis * impulse_mag;
                        }
                    }
                }
            }
            ConstraintKind::Cone {
                anchor_a,
                anchor_b,
                twist_axis_a,
                twist_axis_b,
                half_cone_angle,
            } => {
                let applied = solve_point_lock(body_a, body_b, anchor_a, anchor_b, dt);
                self.step_linear += applied;

                let world_a = (body_a.rotation * twist_axis_a).normalize_or_zero();
                let world_b = (body_b.rotation * twist_axis_b).normalize_or_zero();
                let cos_angle = world_a.dot(world_b).clamp(-1.0, 1.0);
                let angle = cos_angle.acos();
                if angle > half_cone_angle {
                    let axis = world_b.cross(world_a).normalize_or_zero();
                    if axis != Vec3::ZERO {
                        let mass = angular_effective_mass(body_a, body_b, axis);
                        let rel = (body_b.velocity.angular - body_a.velocity.angular).dot(axis);
                        let bias =
                            ((angle - half_cone_angle) * POSITION_BIAS / dt).min(MAX_ANGULAR_BIAS);
                        let impulse_mag = ((bias - rel) * mass).max(0.0);
                        apply_angular_impulse(body_a, body_b, axis * impulse_mag);
                        self.step_angular += axis * impulse_mag;
                    }
                }
            }
            ConstraintKind::SwingTwist {
                anchor_a,
                anchor_b,
                twist_axis_a,
                twist_axis_b,
                plane_axis_a,
                swing_y_half_angle,
                swing_z_half_angle,
                twist_min,
                twist_max,
                motor,
                motor_state,
                target_twist_velocity,
            } => {
                let applied = solve_point_lock(body_a, body_b, anchor_a, anchor_b, dt);
                self.step_linear += applied;

                let world_twist_a = (body_a.rotation * twist_axis_a).normalize_or_zero();
                let world_twist_b = (body_b.rotation * twist_axis_b).normalize_or_zero();

                // Swing limits: split the tilt of B's twist axis into the two
                // swing planes of A's frame.
                let world_plane = (body_a.rotation * plane_axis_a).normalize_or_zero();
                let world_normal = world_twist_a.cross(world_plane).normalize_or_zero();

                for (plane_normal, half_angle) in [
                    (world_plane, swing_z_half_angle),
                    (world_normal, swing_y_half_angle),
                ] {
                    // Angle of the twist axis within this swing plane.
                    let in_plane =
                        world_twist_b - plane_normal * world_twist_b.dot(plane_normal);
                    if in_plane.length_squared() < 1e-10 {
                        continue;
                    }
                    let in_plane = in_plane.normalize();
                    let swing = in_plane
                        .cross(world_twist_a)
                        .dot(plane_normal)
                        .clamp(-1.0, 1.0)
                        .asin();
                    let swing_sign = if swing >= 0.0 { 1.0 } else { -1.0 };
                    let over = swing.abs() - half_angle;
                    if over > 0.0 {
                        let axis = plane_normal * swing_sign;
                        let mass = angular_effective_mass(body_a, body_b, axis);
                        let rel = (body_b.velocity.angular - body_a.velocity.angular).dot(axis);
                        let bias = (over * POSITION_BIAS / dt).min(MAX_ANGULAR_BIAS);
                        let impulse_mag = ((-bias - rel) * mass).min(0.0);
                        apply_angular_impulse(body_a, body_b, axis * impulse_mag);
                        self.step_angular += axis * impulse_mag;
                    }
                }

                // Twist limits and motor about the twist axis.
                let rel_rotation = body_a.rotation.conjugate() * body_b.rotation;
                let (_, twist) = swing_twist_decompose(rel_rotation, twist_axis_a);
                let twist_angle = twist_angle_about(twist, twist_axis_a);
                let axis_mass = angular_effective_mass(body_a, body_b, world_twist_a);
                if axis_mass > 0.0 {
                    let rel = (body_b.velocity.angular - body_a.velocity.angular)
                        .dot(world_twist_a);
                    if motor_state == MotorState::Velocity {
                        let impulse_mag = (target_twist_velocity - rel) * axis_mass;
                        let max = motor.impulse_limit(dt, inv_iterations);
                        let clamped = impulse_mag.clamp(-max, max);
                        apply_angular_impulse(body_a, body_b, world_twist_a * clamped);
                        self.step_angular += world_twist_a * clamped;
                    }

                    let mut impulse_mag = 0.0;
                    if twist_angle <= twist_min {
                        let bias = ((twist_min - twist_angle) * POSITION_BIAS / dt).min(2.0);
                        impulse_mag = ((bias - rel) * axis_mass).max(0.0);
                    } else if twist_angle >= twist_max {
                        let bias = ((twist_max - twist_angle) * POSITION_BIAS / dt).max(-2.0);
                        impulse_mag = ((bias - rel) * axis_mass).min(0.0);
                    }
                    if impulse_mag != 0.0 {
                        apply_angular_impulse(body_a, body_b, world_twist_a * impulse_mag);
                        self.step_angular += world_twist_a * impulse_mag;
                    }
                }
            }
            ConstraintKind::SixDof {
                anchor_a,
                anchor_b,
                frame_a,
                frame_b,
                translation,
                rotation,
                motor,
                motor_state,
                target_velocity,
            } => {
                let r_a = body_a.rotation * anchor_a;
                let r_b = body_b.rotation * anchor_b;
                let world_frame = (body_a.rotation * frame_a).normalize();
                let axes = [
                    world_frame * Vec3::X,
                    world_frame * Vec3::Y,
                    world_frame * Vec3::Z,
                ];
                let delta = (body_b.com_position + r_b) - (body_a.com_position + r_a);

                for (i, mode) in translation.iter().enumerate() {
                    let axis = axes[i];
                    let mass = linear_effective_mass(body_a, body_b, r_a, r_b, axis);
                    if mass <= 0.0 {
                        continue;
                    }
                    let position = delta.dot(axis);
                    let v_a = body_a.velocity.point_velocity(r_a);
                    let v_b = body_b.velocity.point_velocity(r_b);
                    let rel = (v_b - v_a).dot(axis);

                    match mode {
                        AxisMode::Locked => {
                            let bias = (position * POSITION_BIAS / dt)
                                .clamp(-MAX_LINEAR_BIAS, MAX_LINEAR_BIAS);
                            let impulse = axis * (-(rel + bias) * mass);
                            apply_linear_impulse(body_a, body_b, r_a, r_b, impulse);
                            self.step_linear += impulse;
                        }
                        AxisMode::Limited { min, max } => {
                            let mut impulse_mag = 0.0;
                            if position <= *min {
                                let bias = ((min - position) * POSITION_BIAS / dt).min(2.0);
                                impulse_mag = ((bias - rel) * mass).max(0.0);
                            } else if position >= *max {
                                let bias = ((max - position) * POSITION_BIAS / dt).max(-2.0);
                                impulse_mag = ((bias - rel) * mass).min(0.0);
                            }
                            if impulse_mag != 0.0 {
                                apply_linear_impulse(
                                    body_a,
                                    body_b,
                                    r_a,
                                    r_b,
                                    axis * impulse_mag,
                                );
                                self.step_linear += axis * impulse_mag;
                            }
                        }
                        AxisMode::Free => {
                            if motor_state == MotorState::Velocity {
                                let impulse_mag = (target_velocity[i] - rel) * mass;
                                let max_impulse = motor.impulse_limit(dt, inv_iterations);
                                let clamped = impulse_mag.clamp(-max_impulse, max_impulse);
                                apply_linear_impulse(body_a, body_b, r_a, r_b, axis * clamped);
                                self.step_linear += axis * clamped;
                            }
                        }
                    }
                }

                // Rotation axes: relative rotation decomposed about A's frame.
                let rel_rotation =
                    (world_frame.conjugate() * (body_b.rotation * frame_b)).normalize();
                let (axis_err, angle_err) = rel_rotation.to_axis_angle();
                let angle_err = wrap_angle(angle_err);
                let rotation_error = axis_err * angle_err;

                for (i, mode) in rotation.iter().enumerate() {
                    let axis = axes[i];
                    let mass = angular_effective_mass(body_a, body_b, axis);
                    if mass <= 0.0 {
                        continue;
                    }
                    // Error about this axis, expressed in A's constraint frame.
                    let local_error = rotation_error[i];
                    let rel = (body_b.velocity.angular - body_a.velocity.angular).dot(axis);

                    match mode {
                        AxisMode::Locked => {
                            let bias = (local_error * POSITION_BIAS / dt)
                                .clamp(-MAX_ANGULAR_BIAS, MAX_ANGULAR_BIAS);
                            let impulse = axis * (-(rel + bias) * mass);
                            apply_angular_impulse(body_a, body_b, impulse);
                            self.step_angular += impulse;
                        }
                        AxisMode::Limited { min, max } => {
                            let mut impulse_mag = 0.0;
                            if local_error <= *min {
                                let bias = ((min - local_error) * POSITION_BIAS / dt).min(2.0);
                                impulse_mag = ((bias - rel) * mass).max(0.0);
                            } else if local_error >= *max {
                                let bias = ((max - local_error) * POSITION_BIAS / dt).max(-2.0);
                                impulse_mag = ((bias - rel) * mass).min(0.0);
                            }
                            if impulse_mag != 0.0 {
                                apply_angular_impulse(body_a, body_b, axis * impulse_mag);
                                self.step_angular += axis * impulse_mag;
                            }
                        }
                        AxisMode::Free => {}
                    }
                }
            }
        }
    }

    fn solve_distance(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        anchor_a: Vec3,
        anchor_b: Vec3,
        min_distance: f32,
        max_distance: f32,
        spring: Option<SpringSettings>,
        dt: f32,
    ) {
        let r_a = body_a.rotation * anchor_a;
        let r_b = body_b.rotation * anchor_b;
        let delta = (body_b.com_position + r_b) - (body_a.com_position + r_a);
        let distance = delta.length();
        if distance < 1e-6 {
            return;
        }
        let axis = delta / distance;

        let error = if distance < min_distance {
            distance - min_distance
        } else if distance > max_distance {
            distance - max_distance
        } else {
            return;
        };

        let mass = linear_effective_mass(body_a, body_b, r_a, r_b, axis);
        if mass <= 0.0 {
            return;
        }
        let v_a = body_a.velocity.point_velocity(r_a);
        let v_b = body_b.velocity.point_velocity(r_b);
        let rel = (v_b - v_a).dot(axis);

        let impulse_mag = match spring {
            Some(spring) => {
                let (bias, softness) = spring.bias_and_softness(error, dt, mass);
                let soft_mass = 1.0 / (1.0 / mass + softness);
                -soft_mass * (rel + bias)
            }
            None => {
                let bias = (error * POSITION_BIAS / dt).clamp(-MAX_LINEAR_BIAS, MAX_LINEAR_BIAS);
                -mass * (rel + bias)
            }
        };

        // Inequality direction: below min only pushes apart, above max only
        // pulls together.
        let impulse_mag = if distance < min_distance {
            impulse_mag.max(0.0)
        } else {
            impulse_mag.min(0.0)
        };

        if impulse_mag != 0.0 {
            apply_linear_impulse(body_a, body_b, r_a, r_b, axis * impulse_mag);
            self.step_linear += axis * impulse_mag;
        }
    }

    /// One position iteration: corrects residual position errors of the
    /// equality parts directly. Limit and motor parts are velocity-only.
    pub fn solve_position(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody) {
        match self.kind.clone() {
            ConstraintKind::Point { anchor_a, anchor_b }
            | ConstraintKind::Cone {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::SwingTwist {
                anchor_a, anchor_b, ..
            }
            | ConstraintKind::Hinge {
                anchor_a, anchor_b, ..
            } => {
                correct_point_lock(body_a, body_b, anchor_a, anchor_b);
            }
            ConstraintKind::Fixed {
                anchor_a,
                anchor_b,
                reference_rotation,
            } => {
                correct_rotation_lock(body_a, body_b, reference_rotation);
                correct_point_lock(body_a, body_b, anchor_a, anchor_b);
            }
            ConstraintKind::Slider {
                reference_rotation, ..
            } => {
                correct_rotation_lock(body_a, body_b, reference_rotation);
            }
            ConstraintKind::Distance { .. } | ConstraintKind::SixDof { .. } => {}
        }
    }
}

/// Removes relative velocity (plus Baumgarte bias) at a ball-socket anchor.
/// Returns the applied impulse.
fn solve_point_lock(
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    anchor_a: Vec3,
    anchor_b: Vec3,
    dt: f32,
) -> Vec3 {
    let r_a = body_a.rotation * anchor_a;
    let r_b = body_b.rotation * anchor_b;

    let delta = (body_b.com_position + r_b) - (body_a.com_position + r_a);
    let bias = (delta * (POSITION_BIAS / dt)).clamp_length_max(MAX_LINEAR_BIAS);

    let v_a = body_a.velocity.point_velocity(r_a);
    let v_b = body_b.velocity.point_velocity(r_b);
    let rel = v_b - v_a;

    let inv_mass = body_a.inverse_mass() + body_b.inverse_mass();
    let i_a = body_a.inverse_inertia_world();
    let i_b = body_b.inverse_inertia_world();
    let ra_skew = skew(r_a);
    let rb_skew = skew(r_b);

    let k = Mat3::IDENTITY * inv_mass - ra_skew * i_a * ra_skew - rb_skew * i_b * rb_skew;
    if k.determinant().abs() < 1e-9 {
        return Vec3::ZERO;
    }
    let impulse = k.inverse() * -(rel + bias);
    apply_linear_impulse(body_a, body_b, r_a, r_b, impulse);
    impulse
}

/// Locks all three relative rotation axes against a reference orientation.
fn solve_rotation_lock(
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    reference_rotation: Quat,
    dt: f32,
) -> Vec3 {
    let q_error =
        body_b.rotation * reference_rotation.conjugate() * body_a.rotation.conjugate();
    let (axis, angle) = q_error.to_axis_angle();
    let angle = wrap_angle(angle);
    let rotation_error = axis * angle;

    let bias = (rotation_error * (POSITION_BIAS / dt)).clamp_length_max(MAX_ANGULAR_BIAS);
    let rel = body_b.velocity.angular - body_a.velocity.angular;

    let k = body_a.inverse_inertia_world() + body_b.inverse_inertia_world();
    if k.determinant().abs() < 1e-9 {
        return Vec3::ZERO;
    }
    let impulse = k.inverse() * -(rel + bias);
    apply_angular_impulse(body_a, body_b, impulse);
    impulse
}

// Direct positional correction of a ball-socket anchor.
fn correct_point_lock(body_a: &mut RigidBody, body_b: &mut RigidBody, anchor_a: Vec3, anchor_b: Vec3) {
    let r_a = body_a.rotation * anchor_a;
    let r_b = body_b.rotation * anchor_b;
    let delta = (body_b.com_position + r_b) - (body_a.com_position + r_a);
    if delta.length_squared() < 1e-10 {
        return;
    }

    let inv_mass = body_a.inverse_mass() + body_b.inverse_mass();
    let i_a = body_a.inverse_inertia_world();
    let i_b = body_b.inverse_inertia_world();
    let ra_skew = skew(r_a);
    let rb_skew = skew(r_b);
    let k = Mat3::IDENTITY * inv_mass - ra_skew * i_a * ra_skew - rb_skew * i_b * rb_skew;
    if k.determinant().abs() < 1e-9 {
        return;
    }
    let impulse = k.inverse() * (-delta * POSITION_BIAS * 2.0);

    if body_a.is_dynamic() {
        body_a.com_position -= impulse * body_a.inverse_mass();
        apply_rotation_delta(body_a, -(i_a * r_a.cross(impulse)));
    }
    if body_b.is_dynamic() {
        body_b.com_position += impulse * body_b.inverse_mass();
        apply_rotation_delta(body_b, i_b * r_b.cross(impulse));
    }
}

// Direct rotational correction toward the reference orientation.
fn correct_rotation_lock(body_a: &mut RigidBody, body_b: &mut RigidBody, reference_rotation: Quat) {
    let q_error =
        body_b.rotation * reference_rotation.conjugate() * body_a.rotation.conjugate();
    let (axis, angle) = q_error.to_axis_angle();
    let angle = wrap_angle(angle);
    if angle.abs() < 1e-6 {
        return;
    }
    let error = axis * angle;

    let k = body_a.inverse_inertia_world() + body_b.inverse_inertia_world();
    if k.determinant().abs() < 1e-9 {
        return;
    }
    let correction = k.inverse() * (-error * POSITION_BIAS * 2.0);
    if body_a.is_dynamic() {
        apply_rotation_delta(body_a, -(body_a.inverse_inertia_world() * correction));
    }
    if body_b.is_dynamic() {
        apply_rotation_delta(body_b, body_b.inverse_inertia_world() * correction);
    }
}

fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

fn wrap_angle(angle: f32) -> f32 {
    if angle > std::f32::consts::PI {
        angle - std::f32::consts::TAU
    } else if angle < -std::f32::consts::PI {
        angle + std::f32::consts::TAU
    } else {
        angle
    }
}

/// Signed hinge angle between the two reference normals about the axis.
fn hinge_angle(
    body_a: &RigidBody,
    body_b: &RigidBody,
    world_axis: Vec3,
    normal_a: Vec3,
    normal_b: Vec3,
) -> f32 {
    let world_normal_a = body_a.rotation * normal_a;
    let world_normal_b = body_b.rotation * normal_b;
    world_normal_a
        .cross(world_normal_b)
        .dot(world_axis)
        .atan2(world_normal_a.dot(world_normal_b))
}

/// Splits `q` into swing and twist about `twist_axis` (unit, local space):
/// `q = swing * twist` where the twist is a pure rotation about the axis.
pub fn swing_twist_decompose(q: Quat, twist_axis: Vec3) -> (Quat, Quat) {
    let r = Vec3::new(q.x, q.y, q.z);
    let proj = twist_axis * r.dot(twist_axis);
    let twist = Quat::from_xyzw(proj.x, proj.y, proj.z, q.w);
    let twist = if twist.length_squared() > 1e-10 {
        twist.normalize()
    } else {
        Quat::IDENTITY
    };
    let swing = q * twist.conjugate();
    (swing, twist)
}

/// Signed twist angle of a twist quaternion about `axis`.
pub fn twist_angle_about(twist: Quat, axis: Vec3) -> f32 {
    let r = Vec3::new(twist.x, twist.y, twist.z);
    wrap_angle(2.0 * r.dot(axis).atan2(twist.w))
}

/// Construction parameters for a distance constraint.
#[derive(Debug, Clone, Copy)]
pub struct DistanceSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    /// Negative values mean "use the attach-time distance".
    pub min_distance: f32,
    pub max_distance: f32,
    pub spring: Option<SpringSettings>,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            min_distance: -1.0,
            max_distance: -1.0,
            spring: None,
        }
    }
}

/// Construction parameters for a hinge constraint.
#[derive(Debug, Clone, Copy)]
pub struct HingeSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub hinge_axis_a: Vec3,
    pub hinge_axis_b: Vec3,
    /// Reference directions perpendicular to the hinge axis; derived
    /// automatically when left at zero.
    pub normal_axis_a: Vec3,
    pub normal_axis_b: Vec3,
    pub limits: Option<(f32, f32)>,
    pub motor: MotorSettings,
}

impl Default for HingeSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            hinge_axis_a: Vec3::Y,
            hinge_axis_b: Vec3::Y,
            normal_axis_a: Vec3::ZERO,
            normal_axis_b: Vec3::ZERO,
            limits: None,
            motor: MotorSettings::default(),
        }
    }
}

/// Construction parameters for a slider constraint.
#[derive(Debug, Clone, Copy)]
pub struct SliderSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub slider_axis_a: Vec3,
    pub slider_axis_b: Vec3,
    pub limits: Option<(f32, f32)>,
    pub motor: MotorSettings,
}

impl Default for SliderSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            slider_axis_a: Vec3::X,
            slider_axis_b: Vec3::X,
            limits: None,
            motor: MotorSettings::default(),
        }
    }
}

/// Construction parameters for a cone constraint.
#[derive(Debug, Clone, Copy)]
pub struct ConeSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub twist_axis_a: Vec3,
    pub twist_axis_b: Vec3,
    pub half_cone_angle: f32,
}

impl Default for ConeSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            twist_axis_a: Vec3::Y,
            twist_axis_b: Vec3::Y,
            half_cone_angle: std::f32::consts::FRAC_PI_4,
        }
    }
}

/// Construction parameters for a swing-twist constraint.
#[derive(Debug, Clone, Copy)]
pub struct SwingTwistSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    pub twist_axis_a: Vec3,
    pub twist_axis_b: Vec3,
    /// Reference direction perpendicular to the twist axis; derived
    /// automatically when left at zero.
    pub plane_axis_a: Vec3,
    pub swing_y_half_angle: f32,
    pub swing_z_half_angle: f32,
    pub twist_min: f32,
    pub twist_max: f32,
    pub motor: MotorSettings,
}

impl Default for SwingTwistSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            twist_axis_a: Vec3::X,
            twist_axis_b: Vec3::X,
            plane_axis_a: Vec3::ZERO,
            swing_y_half_angle: std::f32::consts::FRAC_PI_4,
            swing_z_half_angle: std::f32::consts::FRAC_PI_4,
            twist_min: -std::f32::consts::FRAC_PI_4,
            twist_max: std::f32::consts::FRAC_PI_4,
            motor: MotorSettings::default(),
        }
    }
}

/// Construction parameters for a six-DOF constraint.
#[derive(Debug, Clone, Copy)]
pub struct SixDofSettings {
    pub space: ConstraintSpace,
    pub point_a: Vec3,
    pub point_b: Vec3,
    /// Constraint frame orientation (shared by both bodies in world space).
    pub frame: Quat,
    pub translation: [AxisMode; 3],
    pub rotation: [AxisMode; 3],
    pub motor: MotorSettings,
}

impl Default for SixDofSettings {
    fn default() -> Self {
        Self {
            space: ConstraintSpace::World,
            point_a: Vec3::ZERO,
            point_b: Vec3::ZERO,
            frame: Quat::IDENTITY,
            translation: [AxisMode::Locked; 3],
            rotation: [AxisMode::Locked; 3],
            motor: MotorSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        aabb::Aabb,
        body::{BodyId, MotionProperties, MotionType, RigidBody},
        layers::ObjectLayer,
        shape::ShapeId,
        types::{Material, Velocity},
    };

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

    #[test]
    fn point_constraint_pulls_drifting_bodies_together() {
        let mut a = body(Vec3::ZERO, MotionType::Static);
        let mut b = body(Vec3::new(0.0, -0.1, 0.0), MotionType::Dynamic);
        // Anchored at the same world point originally.
        let mut constraint = UserConstraint::new(
            ConstraintId::default(),
            a.id,
            b.id,
            ConstraintKind::Point {
                anchor_a: Vec3::ZERO,
                anchor_b: Vec3::ZERO,
            },
        );

        let dt = 1.0 / 60.0;
        for _ in 0..10 {
            constraint.solve_velocity(&mut a, &mut b, dt, 0.1);
        }
        // The bias must drive B back toward the anchor.
        assert!(b.velocity.linear.y > 0.0);
    }

    #[test]
    fn hinge_velocity_motor_reaches_target_speed() {
        let mut a = body(Vec3::ZERO, MotionType::Static);
        let mut b = body(Vec3::new(1.0, 0.0, 0.0), MotionType::Dynamic);
        let mut constraint = UserConstraint::new(
            ConstraintId::default(),
            a.id,
            b.id,
            ConstraintKind::Hinge {
                anchor_a: Vec3::ZERO,
                anchor_b: Vec3::new(-1.0, 0.0, 0.0),
                axis_a: Vec3::Y,
                axis_b: Vec3::Y,
                normal_a: Vec3::X,
                normal_b: Vec3::X,
                limits: None,
                motor: MotorSettings {
                    max_force: 1.0e6,
                    position_gain: 2.0,
                },
                motor_state: MotorState::Velocity,
                target_velocity: 7.0,
                target_angle: 0.0,
            },
        );

        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            for _ in 0..4 {
                constraint.solve_velocity(&mut a, &mut b, dt, 0.25);
            }
        }
        let spin = b.velocity.angular.y;
        assert!((spin - 7.0).abs() < 0.5, "spin {spin}");
    }

    #[test]
    fn distance_constraint_enforces_max_distance() {
        let mut a = body(Vec3::ZERO, MotionType::Static);
        let mut b = body(Vec3::new(3.0, 0.0, 0.0), MotionType::Dynamic);
        b.velocity.linear = Vec3::new(1.0, 0.0, 0.0);

        let mut constraint = UserConstraint::new(
            ConstraintId::default(),
            a.id,
            b.id,
            ConstraintKind::Distance {
                anchor_a: Vec3::ZERO,
                anchor_b: Vec3::ZERO,
                min_distance: 0.0,
                max_distance: 2.0,
                spring: None,
            },
        );

        let dt = 1.0 / 60.0;
        for _ in 0..10 {
            constraint.solve_velocity(&mut a, &mut b, dt, 0.1);
        }
        // Outward motion is cancelled and reversed by the bias.
        assert!(b.velocity.linear.x < 0.0);
    }

    #[test]
    fn fixed_constraint_resists_relative_spin() {
        let mut a = body(Vec3::ZERO, MotionType::Static);
        let mut b = body(Vec3::new(1.0, 0.0, 0.0), MotionType::Dynamic);
        b.velocity.angular = Vec3::new(0.0, 4.0, 0.0);

        let mut constraint = UserConstraint::new(
            ConstraintId::default(),
            a.id,
            b.id,
            ConstraintKind::Fixed {
                anchor_a: Vec3::new(0.5, 0.0, 0.0),
                anchor_b: Vec3::new(-0.5, 0.0, 0.0),
                reference_rotation: Quat::IDENTITY,
            },
        );

        let dt = 1.0 / 60.0;
        for _ in 0..10 {
            constraint.solve_velocity(&mut a, &mut b, dt, 0.1);
        }
        assert!(b.velocity.angular.length() < 0.2);
    }

    #[test]
    fn cone_constraint_ignores_motion_inside_the_cone() {
        let mut a = body(Vec3::ZERO, MotionType::Static);
        let mut b = body(Vec3::new(0.0, -1.0, 0.0), MotionType::Dynamic);
        b.velocity.angular = Vec3::new(0.1, 0.0, 0.0);

        let mut constraint = UserConstraint::new(
            ConstraintId::default(),
            a.id,
            b.id,
            ConstraintKind::Cone {
                anchor_a: Vec3::ZERO,
                anchor_b: Vec3::new(0.0, 1.0, 0.0),
                twist_axis_a: Vec3::NEG_Y,
                twist_axis_b: Vec3::NEG_Y,
                half_cone_angle: 0.5,
            },
        );

        let before = b.velocity.angular;
        // Axes aligned, inside the cone: the swing part must not touch
        // angular velocity (only the point lock runs).
        constraint.solve_velocity(&mut a, &mut b, 1.0 / 60.0, 1.0);
        let delta = (b.velocity.angular - before).length();
        assert!(delta < 0.3, "angular delta {delta}");
    }

    #[test]
    fn swing_twist_decomposition_round_trips() {
        let q = Quat::from_euler(glam::EulerRot::XYZ, 0.4, 0.3, -0.2).normalize();
        let (swing, twist) = swing_twist_decompose(q, Vec3::X);
        let recomposed = swing * twist;
        assert!(recomposed.dot(q).abs() > 1.0 - 1e-5);
        // Twist is a pure X rotation.
        assert!(twist.y.abs() < 1e-5 && twist.z.abs() < 1e-5);
    }
}

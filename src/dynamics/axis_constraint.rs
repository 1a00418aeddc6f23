use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::body::RigidBody;

/// Effective mass seen by a 1-DOF linear constraint axis:
/// `1 / (mA⁻¹ + mB⁻¹ + n·(IA⁻¹(rA×n))×rA + n·(IB⁻¹(rB×n))×rB)`.
pub fn linear_effective_mass(
    body_a: &RigidBody,
    body_b: &RigidBody,
    r_a: Vec3,
    r_b: Vec3,
    axis: Vec3,
) -> f32 {
    let inv_mass = body_a.inverse_mass() + body_b.inverse_mass();
    let ra_cross = r_a.cross(axis);
    let rb_cross = r_b.cross(axis);
    let k = inv_mass
        + ra_cross.dot(body_a.inverse_inertia_world() * ra_cross)
        + rb_cross.dot(body_b.inverse_inertia_world() * rb_cross);
    if k > 1e-9 {
        1.0 / k
    } else {
        0.0
    }
}

/// Effective mass of a pure angular axis.
pub fn angular_effective_mass(body_a: &RigidBody, body_b: &RigidBody, axis: Vec3) -> f32 {
    let k = axis.dot(body_a.inverse_inertia_world() * axis)
        + axis.dot(body_b.inverse_inertia_world() * axis);
    if k > 1e-9 {
        1.0 / k
    } else {
        0.0
    }
}

/// Applies a linear impulse at offsets `r_a`/`r_b` from both bodies' centres
/// of mass, respecting DOF locks.
pub fn apply_linear_impulse(
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    r_a: Vec3,
    r_b: Vec3,
    impulse: Vec3,
) {
    if body_a.is_dynamic() {
        let dofs = body_a.motion.allowed_dofs;
        body_a.velocity.linear -= dofs.filter_linear(impulse * body_a.inverse_mass());
        body_a.velocity.angular -=
            dofs.filter_angular(body_a.inverse_inertia_world() * r_a.cross(impulse));
    }
    if body_b.is_dynamic() {
        let dofs = body_b.motion.allowed_dofs;
        body_b.velocity.linear += dofs.filter_linear(impulse * body_b.inverse_mass());
        body_b.velocity.angular +=
            dofs.filter_angular(body_b.inverse_inertia_world() * r_b.cross(impulse));
    }
}

/// Applies a pure angular impulse to both bodies.
pub fn apply_angular_impulse(body_a: &mut RigidBody, body_b: &mut RigidBody, impulse: Vec3) {
    if body_a.is_dynamic() {
        body_a.velocity.angular -= body_a
            .motion
            .allowed_dofs
            .filter_angular(body_a.inverse_inertia_world() * impulse);
    }
    if body_b.is_dynamic() {
        body_b.velocity.angular += body_b
            .motion
            .allowed_dofs
            .filter_angular(body_b.inverse_inertia_world() * impulse);
    }
}

/// One linear constraint axis with accumulated impulse and clamping.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisConstraintPart {
    pub axis: Vec3,
    pub r_a: Vec3,
    pub r_b: Vec3,
    pub effective_mass: f32,
    pub bias: f32,
    pub total_impulse: f32,
}

impl AxisConstraintPart {
    pub fn new(
        body_a: &RigidBody,
        body_b: &RigidBody,
        r_a: Vec3,
        r_b: Vec3,
        axis: Vec3,
        bias: f32,
    ) -> Self {
        Self {
            axis,
            r_a,
            r_b,
            effective_mass: linear_effective_mass(body_a, body_b, r_a, r_b, axis),
            bias,
            total_impulse: 0.0,
        }
    }

    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, impulse: f32) {
        self.total_impulse = impulse;
        if impulse != 0.0 {
            apply_linear_impulse(body_a, body_b, self.r_a, self.r_b, self.axis * impulse);
        }
    }

    /// One Gauss-Seidel update; accumulated impulse is clamped to
    /// `[min_impulse, max_impulse]`. Returns the applied delta.
    pub fn solve(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        min_impulse: f32,
        max_impulse: f32,
    ) -> f32 {
        let v_a = body_a.velocity.point_velocity(self.r_a);
        let v_b = body_b.velocity.point_velocity(self.r_b);
        let rel = (v_b - v_a).dot(self.axis);

        let lambda = -self.effective_mass * (rel + self.bias);
        let new_total = (self.total_impulse + lambda).clamp(min_impulse, max_impulse);
        let delta = new_total - self.total_impulse;
        self.total_impulse = new_total;

        if delta != 0.0 {
            apply_linear_impulse(body_a, body_b, self.r_a, self.r_b, self.axis * delta);
        }
        delta
    }
}

/// One angular constraint axis with accumulated impulse and clamping.
#[derive(Debug, Clone, Copy, Default)]
pub struct AngularConstraintPart {
    pub axis: Vec3,
    pub effective_mass: f32,
    pub bias: f32,
    pub total_impulse: f32,
}

impl AngularConstraintPart {
    pub fn new(body_a: &RigidBody, body_b: &RigidBody, axis: Vec3, bias: f32) -> Self {
        Self {
            axis,
            effective_mass: angular_effective_mass(body_a, body_b, axis),
            bias,
            total_impulse: 0.0,
        }
    }

    pub fn solve(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        min_impulse: f32,
        max_impulse: f32,
    ) -> f32 {
        let rel = (body_b.velocity.angular - body_a.velocity.angular).dot(self.axis);
        let lambda = -self.effective_mass * (rel + self.bias);
        let new_total = (self.total_impulse + lambda).clamp(min_impulse, max_impulse);
        let delta = new_total - self.total_impulse;
        self.total_impulse = new_total;

        if delta != 0.0 {
            apply_angular_impulse(body_a, body_b, self.axis * delta);
        }
        delta
    }
}

/// Spring parameterisation accepted by constraints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SpringSettings {
    /// Oscillation frequency (Hz) and damping ratio.
    FrequencyDamping { frequency: f32, damping: f32 },
    /// Direct spring constant and damping coefficient.
    StiffnessDamping { stiffness: f32, damping: f32 },
}

impl SpringSettings {
    /// Converts the spring into a velocity-constraint `(bias, softness)` pair
    /// for position error `c` over timestep `dt` with unsoftened effective
    /// mass `1/k`. The solver uses `1 / (k + softness)` as the effective mass.
    pub fn bias_and_softness(&self, c: f32, dt: f32, effective_mass: f32) -> (f32, f32) {
        if dt <= 0.0 || effective_mass <= 0.0 {
            return (0.0, 0.0);
        }
        let (stiffness, damping) = match *self {
            SpringSettings::FrequencyDamping { frequency, damping } => {
                let omega = std::f32::consts::TAU * frequency;
                let k = effective_mass * omega * omega;
                (k, 2.0 * effective_mass * damping * omega)
            }
            SpringSettings::StiffnessDamping { stiffness, damping } => (stiffness, damping),
        };

        let denom = damping + dt * stiffness;
        if denom <= 1e-9 {
            return (0.0, 0.0);
        }
        let gamma = 1.0 / (dt * denom);
        let beta = dt * stiffness / denom;
        (beta * c / dt, gamma)
    }
}

/// Drive state of a constraint motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MotorState {
    #[default]
    Off,
    /// Track a target velocity.
    Velocity,
    /// Track a target position/angle.
    Position,
}

/// Motor force/torque budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorSettings {
    /// Maximum force (linear motors) or torque (angular motors).
    pub max_force: f32,
    /// Gain applied to position error when driving to a target position.
    pub position_gain: f32,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            max_force: f32::MAX,
            position_gain: 2.0,
        }
    }
}

impl MotorSettings {
    /// Per-iteration impulse budget for a motor over `dt`.
    pub fn impulse_limit(&self, dt: f32, inv_iterations: f32) -> f32 {
        if self.max_force == f32::MAX {
            f32::MAX
        } else {
            self.max_force * dt * inv_iterations
        }
    }
}

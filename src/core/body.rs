use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config,
    core::{
        aabb::Aabb,
        layers::ObjectLayer,
        shape::ShapeId,
        types::{Material, Transform, Velocity},
    },
    utils::pool::Handle,
};

/// Stable handle to a body in the world.
pub type BodyId = Handle;

/// Stable handle to a user constraint.
pub type ConstraintId = Handle;

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MotionType {
    /// Never moves; zero inverse mass and inertia.
    Static,
    /// Moves by velocity but ignores forces and impulses.
    Kinematic,
    /// Fully simulated.
    #[default]
    Dynamic,
}

impl MotionType {
    /// Ordering used to pick the first body of an unordered pair:
    /// dynamic dominates kinematic dominates static.
    pub fn pair_rank(self) -> u8 {
        match self {
            MotionType::Dynamic => 2,
            MotionType::Kinematic => 1,
            MotionType::Static => 0,
        }
    }
}

/// Collision quality for fast-moving bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MotionQuality {
    /// Position is integrated in one jump; may tunnel at high speed.
    #[default]
    Discrete,
    /// Swept shape cast between old and new position.
    LinearCast,
}

/// Mask of degrees of freedom a dynamic body may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedDofs(pub u8);

impl AllowedDofs {
    pub const TRANSLATION_X: AllowedDofs = AllowedDofs(1);
    pub const TRANSLATION_Y: AllowedDofs = AllowedDofs(2);
    pub const TRANSLATION_Z: AllowedDofs = AllowedDofs(4);
    pub const ROTATION_X: AllowedDofs = AllowedDofs(8);
    pub const ROTATION_Y: AllowedDofs = AllowedDofs(16);
    pub const ROTATION_Z: AllowedDofs = AllowedDofs(32);
    pub const ALL: AllowedDofs = AllowedDofs(63);
    /// 2D-style motion in the XY plane.
    pub const PLANE_2D: AllowedDofs = AllowedDofs(1 | 2 | 32);

    pub fn contains(self, other: AllowedDofs) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: AllowedDofs) -> AllowedDofs {
        AllowedDofs(self.0 | other.0)
    }

    /// Zeroes locked linear components.
    pub fn filter_linear(self, v: Vec3) -> Vec3 {
        Vec3::new(
            if self.0 & 1 != 0 { v.x } else { 0.0 },
            if self.0 & 2 != 0 { v.y } else { 0.0 },
            if self.0 & 4 != 0 { v.z } else { 0.0 },
        )
    }

    /// Zeroes locked angular components.
    pub fn filter_angular(self, v: Vec3) -> Vec3 {
        Vec3::new(
            if self.0 & 8 != 0 { v.x } else { 0.0 },
            if self.0 & 16 != 0 { v.y } else { 0.0 },
            if self.0 & 32 != 0 { v.z } else { 0.0 },
        )
    }
}

impl Default for AllowedDofs {
    fn default() -> Self {
        Self::ALL
    }
}

/// Motion state of a dynamic or kinematic body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionProperties {
    pub inverse_mass: f32,
    /// Inverse inertia tensor in body-local space.
    pub inverse_inertia: Mat3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_factor: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub allowed_dofs: AllowedDofs,
    pub quality: MotionQuality,
}

impl Default for MotionProperties {
    fn default() -> Self {
        Self {
            inverse_mass: 1.0,
            inverse_inertia: Mat3::IDENTITY,
            linear_damping: config::DEFAULT_LINEAR_DAMPING,
            angular_damping: config::DEFAULT_ANGULAR_DAMPING,
            gravity_factor: 1.0,
            max_linear_velocity: config::DEFAULT_MAX_LINEAR_VELOCITY,
            max_angular_velocity: config::DEFAULT_MAX_ANGULAR_VELOCITY,
            allowed_dofs: AllowedDofs::ALL,
            quality: MotionQuality::Discrete,
        }
    }
}

/// A rigid body: pose, motion state, material, and collision filtering.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub id: BodyId,
    pub shape: ShapeId,
    /// World position of the shape origin.
    pub position: Vec3,
    /// World position of the centre of mass; the solver works here.
    pub com_position: Vec3,
    pub rotation: Quat,
    /// Shape COM in body-local space, cached from the shape.
    pub local_com: Vec3,
    pub world_aabb: Aabb,
    pub velocity: Velocity,
    pub force: Vec3,
    pub torque: Vec3,
    pub motion_type: MotionType,
    pub motion: MotionProperties,
    pub material: Material,
    pub layer: ObjectLayer,
    pub collision_group: u32,
    pub collision_mask: u32,
    pub is_sensor: bool,
    pub sleeping: bool,
    pub allow_sleeping: bool,
    pub enhanced_internal_edge_removal: bool,
    pub use_manifold_reduction: bool,
    pub sleep_timer: f32,
    /// Ids of user constraints attached to this body.
    pub constraints: Vec<ConstraintId>,
    /// Index into the per-step CCD array, -1 when not linear casting.
    pub ccd_slot: i32,
    /// Largest inscribed sphere radius of the shape, cached for CCD gating.
    pub inner_radius: f32,
}

impl RigidBody {
    pub fn is_static(&self) -> bool {
        self.motion_type == MotionType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.motion_type == MotionType::Dynamic
    }

    pub fn is_kinematic(&self) -> bool {
        self.motion_type == MotionType::Kinematic
    }

    pub fn is_active(&self) -> bool {
        !self.sleeping && self.motion_type != MotionType::Static
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.rotation)
    }

    /// World-space inverse inertia tensor.
    pub fn inverse_inertia_world(&self) -> Mat3 {
        if self.motion_type != MotionType::Dynamic {
            return Mat3::ZERO;
        }
        let r = Mat3::from_quat(self.rotation);
        r * self.motion.inverse_inertia * r.transpose()
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.motion_type == MotionType::Dynamic {
            self.motion.inverse_mass
        } else {
            0.0
        }
    }

    /// Re-derives the shape-origin position from the COM position.
    pub fn sync_position_from_com(&mut self) {
        self.position = self.com_position - self.rotation * self.local_com;
    }

    /// Re-derives the COM position from the shape-origin position.
    pub fn sync_com_from_position(&mut self) {
        self.com_position = self.position + self.rotation * self.local_com;
    }

    pub fn wake(&mut self) {
        if self.motion_type != MotionType::Static {
            self.sleeping = false;
            self.sleep_timer = 0.0;
        }
    }

    pub fn fall_asleep(&mut self) {
        self.sleeping = true;
        self.velocity = Velocity::default();
    }

    pub fn add_force(&mut self, force: Vec3) {
        if self.is_dynamic() {
            self.force += force;
        }
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.torque += torque;
        }
    }

    pub fn add_force_at(&mut self, force: Vec3, world_point: Vec3) {
        if self.is_dynamic() {
            self.force += force;
            self.torque += (world_point - self.com_position).cross(force);
        }
    }

    pub fn add_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.velocity.linear += impulse * self.motion.inverse_mass;
            self.wake();
        }
    }

    pub fn add_impulse_at(&mut self, impulse: Vec3, world_point: Vec3) {
        if self.is_dynamic() {
            self.velocity.linear += impulse * self.motion.inverse_mass;
            let torque = (world_point - self.com_position).cross(impulse);
            self.velocity.angular += self.inverse_inertia_world() * torque;
            self.wake();
        }
    }

    pub fn add_angular_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.velocity.angular += self.inverse_inertia_world() * impulse;
            self.wake();
        }
    }

    /// Sets velocities so the body reaches the target pose in `dt` seconds.
    pub fn move_kinematic(&mut self, target_position: Vec3, target_rotation: Quat, dt: f32) {
        if dt <= 0.0 || self.is_static() {
            return;
        }
        let target_com = target_position + target_rotation * self.local_com;
        self.velocity.linear = (target_com - self.com_position) / dt;

        let delta = target_rotation * self.rotation.conjugate();
        let (axis, angle) = delta.to_axis_angle();
        let angle = if angle > std::f32::consts::PI {
            angle - std::f32::consts::TAU
        } else {
            angle
        };
        self.velocity.angular = axis * (angle / dt);
        self.wake();
    }
}

/// Construction parameters for [`crate::world::PhysicsWorld::create_body`].
#[derive(Debug, Clone)]
pub struct BodySettings {
    pub shape: ShapeId,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub motion_type: MotionType,
    pub motion_quality: MotionQuality,
    pub layer: ObjectLayer,
    /// Explicit mass; when `None` the mass follows `density` and shape volume.
    pub mass: Option<f32>,
    pub density: f32,
    pub material: Material,
    pub gravity_factor: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub allowed_dofs: AllowedDofs,
    pub collision_group: u32,
    pub collision_mask: u32,
    pub is_sensor: bool,
    pub allow_sleeping: bool,
    pub enhanced_internal_edge_removal: bool,
    pub use_manifold_reduction: bool,
}

impl BodySettings {
    pub fn new(shape: ShapeId, layer: ObjectLayer) -> Self {
        Self {
            shape,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            motion_type: MotionType::Dynamic,
            motion_quality: MotionQuality::Discrete,
            layer,
            mass: None,
            density: 1.0,
            material: Material::default(),
            gravity_factor: 1.0,
            linear_damping: config::DEFAULT_LINEAR_DAMPING,
            angular_damping: config::DEFAULT_ANGULAR_DAMPING,
            max_linear_velocity: config::DEFAULT_MAX_LINEAR_VELOCITY,
            max_angular_velocity: config::DEFAULT_MAX_ANGULAR_VELOCITY,
            allowed_dofs: AllowedDofs::ALL,
            collision_group: 1,
            collision_mask: u32::MAX,
            is_sensor: false,
            allow_sleeping: true,
            enhanced_internal_edge_removal: false,
            use_manifold_reduction: true,
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_motion_type(mut self, motion_type: MotionType) -> Self {
        self.motion_type = motion_type;
        self
    }

    pub fn with_motion_quality(mut self, quality: MotionQuality) -> Self {
        self.motion_quality = quality;
        self
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }
}

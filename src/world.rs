pub mod listener;
pub mod settings;

use glam::{Quat, Vec3};
use log::debug;
use std::time::Instant;

use crate::{
    collision::{
        broadphase::BroadPhase,
        ccd::{resolve_ccd_impulse, sort_for_resolution, CcdBody},
        contact_cache::{CachedImpulse, ContactCache, ContactEvent, ContactKey},
        manifold::{ContactManifold, ManifoldAccumulator},
        narrowphase::{
            cast_shape_vs_shape, collide_shapes, CollideContext, CollideDispatch,
            CollideSettings, ShapeArgs,
        },
        queries::{
            cast_ray_shape, collide_point_shape, CollidePointHit, HitCollector, QueryFilter,
            RankedHit, RayCastHit, ShapeCastHit,
        },
    },
    config,
    core::{
        body::{
            BodyId, BodySettings, ConstraintId, MotionQuality, MotionType, RigidBody,
        },
        shape::{ShapeId, ShapeKind, ShapeRegistry},
        subshape::SubShapeId,
        types::{Material, Transform, Velocity},
    },
    dynamics::{
        constraints::{
            ConeSettings, ConstraintKind, ConstraintSpace, DistanceSettings, HingeSettings,
            SixDofSettings, SliderSettings, SwingTwistSettings, UserConstraint,
        },
        contact_solver::{ContactConstraint, ContactSettings},
        integrator::{integrate_orientation, integrate_position, integrate_velocity},
        island::{collect_islands, Island, IslandBuilder},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        pool::{Arena, FramePool},
        profiling::PhysicsProfiler,
    },
};

pub use listener::{NoListener, PendingCommands, PhysicsListener, ValidateResult, WorldCommand};
pub use settings::WorldSettings;

use crate::dynamics::axis_constraint::MotorState;

/// Result of a collide-shape query: the touched body plus the manifold.
#[derive(Debug, Clone)]
pub struct CollideShapeHit {
    pub body: BodyId,
    pub manifold: ContactManifold,
}

impl RankedHit for CollideShapeHit {
    fn fraction(&self) -> f32 {
        -self.manifold.penetration
    }
}

/// Per-step solver counters, reported at debug level when enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolverMetrics {
    pub islands_solved: usize,
    pub contacts_solved: usize,
    pub constraints_solved: usize,
    pub normal_impulse_sum: f32,
}

/// Central simulation container owning all physics state.
///
/// `update` runs the whole step synchronously on the caller's thread; queries
/// are read-only and may run between steps.
pub struct PhysicsWorld {
    settings: WorldSettings,
    shapes: ShapeRegistry,
    bodies: Arena<RigidBody>,
    broadphase: BroadPhase,
    dispatch: CollideDispatch,
    contact_cache: ContactCache,
    constraints: Arena<UserConstraint>,
    island_builder: IslandBuilder,
    // Per-step contact constraint arena; index stable within the step.
    contact_constraints: Vec<ContactConstraint>,
    contact_endpoints: Vec<(u32, u32, u32)>,
    // Pooled per-step CCD records; reset at the top of each step.
    ccd_pool: FramePool<CcdBody>,
    previous_dt: f32,
    pub profiler: PhysicsProfiler,
    metrics: SolverMetrics,
    metrics_logging: bool,
}

impl PhysicsWorld {
    pub fn new(settings: WorldSettings) -> Self {
        Self {
            settings,
            shapes: ShapeRegistry::new(),
            bodies: Arena::new(),
            broadphase: BroadPhase::new(),
            dispatch: CollideDispatch::with_default_shapes(),
            contact_cache: ContactCache::new(),
            constraints: Arena::new(),
            island_builder: IslandBuilder::new(),
            contact_constraints: Vec::new(),
            contact_endpoints: Vec::new(),
            ccd_pool: FramePool::new(),
            previous_dt: 0.0,
            profiler: PhysicsProfiler::default(),
            metrics: SolverMetrics::default(),
            metrics_logging: false,
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.settings.gravity = gravity;
    }

    pub fn set_metrics_logging(&mut self, enabled: bool) {
        self.metrics_logging = enabled;
    }

    pub fn last_metrics(&self) -> &SolverMetrics {
        &self.metrics
    }

    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    pub fn shapes_mut(&mut self) -> &mut ShapeRegistry {
        &mut self.shapes
    }

    /// Registers a shape and returns its handle.
    pub fn create_shape(&mut self, kind: ShapeKind) -> PhysicsResult<ShapeId> {
        self.shapes.add(kind)
    }

    /// The collision dispatch table, for registering user shape pairings.
    pub fn dispatch_mut(&mut self) -> &mut CollideDispatch {
        &mut self.dispatch
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_cache.len()
    }

    // ---------------------------------------------------------------- bodies

    pub fn create_body(&mut self, settings: &BodySettings) -> PhysicsResult<BodyId> {
        let shape = self
            .shapes
            .get(settings.shape)
            .ok_or(PhysicsError::UnknownShape(settings.shape))?;
        self.settings.layers.broad_phase_layer(settings.layer)?;
        if settings.density <= 0.0 && settings.mass.is_none() {
            return Err(PhysicsError::InvalidArgument(
                "density must be positive when no explicit mass is given",
            ));
        }

        let local_com = shape.center_of_mass;
        let inner_radius = shape.inner_radius;
        let world_aabb = shape
            .local_aabb
            .transformed(settings.position, settings.rotation);

        let mut motion = crate::core::body::MotionProperties {
            linear_damping: settings.linear_damping,
            angular_damping: settings.angular_damping,
            gravity_factor: settings.gravity_factor,
            max_linear_velocity: settings.max_linear_velocity,
            max_angular_velocity: settings.max_angular_velocity,
            allowed_dofs: settings.allowed_dofs,
            quality: settings.motion_quality,
            ..Default::default()
        };

        if settings.motion_type == MotionType::Dynamic {
            let mut props = self.shapes.mass_properties(settings.shape, settings.density);
            if let Some(mass) = settings.mass {
                if mass <= 0.0 {
                    return Err(PhysicsError::InvalidArgument("mass must be positive"));
                }
                props = props.with_mass(mass);
                if props.inertia == glam::Mat3::ZERO {
                    // Degenerate shape with explicit mass: treat as a point mass
                    // with unit gyration radius.
                    props.inertia = glam::Mat3::IDENTITY * mass;
                }
            }
            if props.mass > f32::EPSILON {
                motion.inverse_mass = 1.0 / props.mass;
                motion.inverse_inertia = if props.inertia.determinant().abs() > f32::EPSILON {
                    props.inertia.inverse()
                } else {
                    glam::Mat3::ZERO
                };
            } else {
                // Zero-volume geometry never contributes constraints.
                motion.inverse_mass = 0.0;
                motion.inverse_inertia = glam::Mat3::ZERO;
            }
        } else {
            motion.inverse_mass = 0.0;
            motion.inverse_inertia = glam::Mat3::ZERO;
        }

        let body = RigidBody {
            id: BodyId::default(),
            shape: settings.shape,
            position: settings.position,
            com_position: settings.position + settings.rotation * local_com,
            rotation: settings.rotation,
            local_com,
            world_aabb,
            velocity: Velocity {
                linear: settings.linear_velocity,
                angular: settings.angular_velocity,
            },
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            motion_type: settings.motion_type,
            motion,
            material: settings.material,
            layer: settings.layer,
            collision_group: settings.collision_group,
            collision_mask: settings.collision_mask,
            is_sensor: settings.is_sensor,
            sleeping: false,
            allow_sleeping: settings.allow_sleeping,
            enhanced_internal_edge_removal: settings.enhanced_internal_edge_removal,
            use_manifold_reduction: settings.use_manifold_reduction,
            sleep_timer: 0.0,
            constraints: Vec::new(),
            ccd_slot: -1,
            inner_radius,
        };

        let id = self.bodies.insert(body);
        if let Some(body) = self.bodies.get_mut(id) {
            body.id = id;
        }
        let bp_layer = self.settings.layers.broad_phase_layer(settings.layer)?;
        self.broadphase.add_body(
            id,
            bp_layer,
            world_aabb,
            self.settings.narrowphase.speculative_contact_distance,
        );
        Ok(id)
    }

    /// Removes a body. Its cached contacts are reported removed on the next
    /// step's sweep (with ids only, per the listener contract).
    pub fn remove_body(&mut self, id: BodyId) -> PhysicsResult<()> {
        let body = self
            .bodies
            .remove(id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        self.broadphase.remove_body(id);
        for constraint_id in body.constraints {
            if let Some(constraint) = self.constraints.remove(constraint_id) {
                let other = if constraint.body_a == id {
                    constraint.body_b
                } else {
                    constraint.body_a
                };
                if let Some(other_body) = self.bodies.get_mut(other) {
                    other_body.constraints.retain(|c| *c != constraint_id);
                    other_body.wake();
                }
            }
        }
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn set_position(&mut self, id: BodyId, position: Vec3) -> PhysicsResult<()> {
        self.set_transform(id, position, None)
    }

    pub fn set_rotation(&mut self, id: BodyId, rotation: Quat) -> PhysicsResult<()> {
        let position = self
            .bodies
            .get(id)
            .ok_or(PhysicsError::UnknownBody(id))?
            .position;
        self.set_transform(id, position, Some(rotation))
    }

    /// Teleports a body; the broadphase leaf is reinserted when the new box
    /// escapes the stored fattened one.
    pub fn set_transform(
        &mut self,
        id: BodyId,
        position: Vec3,
        rotation: Option<Quat>,
    ) -> PhysicsResult<()> {
        let shapes = &self.shapes;
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        body.position = position;
        if let Some(rotation) = rotation {
            body.rotation = rotation.normalize();
        }
        body.sync_com_from_position();
        if let Some(shape) = shapes.get(body.shape) {
            body.world_aabb = shape.local_aabb.transformed(body.position, body.rotation);
        }
        body.wake();
        let aabb = body.world_aabb;
        self.broadphase.update_body(
            id,
            aabb,
            self.settings.narrowphase.speculative_contact_distance,
        );
        Ok(())
    }

    pub fn move_kinematic(
        &mut self,
        id: BodyId,
        target_position: Vec3,
        target_rotation: Quat,
        dt: f32,
    ) -> PhysicsResult<()> {
        if dt < 0.0 {
            return Err(PhysicsError::NegativeTimeStep(dt));
        }
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        body.move_kinematic(target_position, target_rotation, dt);
        Ok(())
    }

    pub fn add_force(&mut self, id: BodyId, force: Vec3) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        body.add_force(force);
        body.wake();
        Ok(())
    }

    pub fn add_torque(&mut self, id: BodyId, torque: Vec3) -> PhysicsResult<()> {
        let body = self
            .bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?;
        body.add_torque(torque);
        body.wake();
        Ok(())
    }

    pub fn add_impulse(&mut self, id: BodyId, impulse: Vec3) -> PhysicsResult<()> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?
            .add_impulse(impulse);
        Ok(())
    }

    pub fn add_impulse_at(
        &mut self,
        id: BodyId,
        impulse: Vec3,
        world_point: Vec3,
    ) -> PhysicsResult<()> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?
            .add_impulse_at(impulse, world_point);
        Ok(())
    }

    pub fn wake_body(&mut self, id: BodyId) -> PhysicsResult<()> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::UnknownBody(id))?
            .wake();
        Ok(())
    }

    // ----------------------------------------------------------- constraints

    fn anchor_to_local(body: &RigidBody, space: ConstraintSpace, point: Vec3) -> Vec3 {
        match space {
            ConstraintSpace::World => body.rotation.conjugate() * (point - body.com_position),
            ConstraintSpace::Local => point - body.local_com,
        }
    }

    fn axis_to_local(body: &RigidBody, space: ConstraintSpace, axis: Vec3) -> Vec3 {
        match space {
            ConstraintSpace::World => (body.rotation.conjugate() * axis).normalize_or_zero(),
            ConstraintSpace::Local => axis.normalize_or_zero(),
        }
    }

    fn add_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        kind: ConstraintKind,
    ) -> PhysicsResult<ConstraintId> {
        if body_a == body_b {
            return Err(PhysicsError::InvalidArgument(
                "constraint endpoints must be distinct bodies",
            ));
        }
        if !self.bodies.contains(body_a) {
            return Err(PhysicsError::UnknownBody(body_a));
        }
        if !self.bodies.contains(body_b) {
            return Err(PhysicsError::UnknownBody(body_b));
        }

        let id = self
            .constraints
            .insert(UserConstraint::new(ConstraintId::default(), body_a, body_b, kind));
        if let Some(constraint) = self.constraints.get_mut(id) {
            constraint.id = id;
        }
        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.constraints.push(id);
                body.wake();
            }
        }
        Ok(id)
    }

    fn body_pair(&self, a: BodyId, b: BodyId) -> PhysicsResult<(&RigidBody, &RigidBody)> {
        let body_a = self.bodies.get(a).ok_or(PhysicsError::UnknownBody(a))?;
        let body_b = self.bodies.get(b).ok_or(PhysicsError::UnknownBody(b))?;
        Ok((body_a, body_b))
    }

    pub fn create_point_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        space: ConstraintSpace,
        point_a: Vec3,
        point_b: Vec3,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let kind = ConstraintKind::Point {
            anchor_a: Self::anchor_to_local(a, space, point_a),
            anchor_b: Self::anchor_to_local(b, space, point_b),
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_distance_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &DistanceSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let anchor_a = Self::anchor_to_local(a, settings.space, settings.point_a);
        let anchor_b = Self::anchor_to_local(b, settings.space, settings.point_b);
        let attach_distance = ((b.com_position + b.rotation * anchor_b)
            - (a.com_position + a.rotation * anchor_a))
            .length();
        let min_distance = if settings.min_distance < 0.0 {
            attach_distance
        } else {
            settings.min_distance
        };
        let max_distance = if settings.max_distance < 0.0 {
            attach_distance
        } else {
            settings.max_distance
        };
        if min_distance > max_distance {
            return Err(PhysicsError::InvalidArgument(
                "distance constraint needs min <= max",
            ));
        }
        let kind = ConstraintKind::Distance {
            anchor_a,
            anchor_b,
            min_distance,
            max_distance,
            spring: settings.spring,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_hinge_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &HingeSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let axis_a = Self::axis_to_local(a, settings.space, settings.hinge_axis_a);
        let axis_b = Self::axis_to_local(b, settings.space, settings.hinge_axis_b);
        if axis_a == Vec3::ZERO || axis_b == Vec3::ZERO {
            return Err(PhysicsError::NotNormalised(0.0));
        }
        let normal_a = if settings.normal_axis_a != Vec3::ZERO {
            Self::axis_to_local(a, settings.space, settings.normal_axis_a)
        } else {
            axis_a.any_orthonormal_vector()
        };
        let normal_b = if settings.normal_axis_b != Vec3::ZERO {
            Self::axis_to_local(b, settings.space, settings.normal_axis_b)
        } else {
            // Match A's reference in world space so the attach angle is zero.
            (b.rotation.conjugate() * (a.rotation * normal_a)).normalize_or_zero()
        };
        let kind = ConstraintKind::Hinge {
            anchor_a: Self::anchor_to_local(a, settings.space, settings.point_a),
            anchor_b: Self::anchor_to_local(b, settings.space, settings.point_b),
            axis_a,
            axis_b,
            normal_a,
            normal_b,
            limits: settings.limits,
            motor: settings.motor,
            motor_state: MotorState::Off,
            target_velocity: 0.0,
            target_angle: 0.0,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_fixed_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        space: ConstraintSpace,
        point_a: Vec3,
        point_b: Vec3,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let kind = ConstraintKind::Fixed {
            anchor_a: Self::anchor_to_local(a, space, point_a),
            anchor_b: Self::anchor_to_local(b, space, point_b),
            reference_rotation: a.rotation.conjugate() * b.rotation,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_slider_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &SliderSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let axis_a = Self::axis_to_local(a, settings.space, settings.slider_axis_a);
        let axis_b = Self::axis_to_local(b, settings.space, settings.slider_axis_b);
        if axis_a == Vec3::ZERO || axis_b == Vec3::ZERO {
            return Err(PhysicsError::NotNormalised(0.0));
        }
        let kind = ConstraintKind::Slider {
            anchor_a: Self::anchor_to_local(a, settings.space, settings.point_a),
            anchor_b: Self::anchor_to_local(b, settings.space, settings.point_b),
            axis_a,
            axis_b,
            reference_rotation: a.rotation.conjugate() * b.rotation,
            limits: settings.limits,
            motor: settings.motor,
            motor_state: MotorState::Off,
            target_velocity: 0.0,
            target_position: 0.0,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_cone_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &ConeSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let kind = ConstraintKind::Cone {
            anchor_a: Self::anchor_to_local(a, settings.space, settings.point_a),
            anchor_b: Self::anchor_to_local(b, settings.space, settings.point_b),
            twist_axis_a: Self::axis_to_local(a, settings.space, settings.twist_axis_a),
            twist_axis_b: Self::axis_to_local(b, settings.space, settings.twist_axis_b),
            half_cone_angle: settings.half_cone_angle,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_swing_twist_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &SwingTwistSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let twist_axis_a = Self::axis_to_local(a, settings.space, settings.twist_axis_a);
        if twist_axis_a == Vec3::ZERO {
            return Err(PhysicsError::NotNormalised(0.0));
        }
        let plane_axis_a = if settings.plane_axis_a != Vec3::ZERO {
            Self::axis_to_local(a, settings.space, settings.plane_axis_a)
        } else {
            twist_axis_a.any_orthonormal_vector()
        };
        let kind = ConstraintKind::SwingTwist {
            anchor_a: Self::anchor_to_local(a, settings.space, settings.point_a),
            anchor_b: Self::anchor_to_local(b, settings.space, settings.point_b),
            twist_axis_a,
            twist_axis_b: Self::axis_to_local(b, settings.space, settings.twist_axis_b),
            plane_axis_a,
            swing_y_half_angle: settings.swing_y_half_angle,
            swing_z_half_angle: settings.swing_z_half_angle,
            twist_min: settings.twist_min,
            twist_max: settings.twist_max,
            motor: settings.motor,
            motor_state: MotorState::Off,
            target_twist_velocity: 0.0,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn create_six_dof_constraint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        settings: &SixDofSettings,
    ) -> PhysicsResult<ConstraintId> {
        let (a, b) = self.body_pair(body_a, body_b)?;
        let kind = ConstraintKind::SixDof {
            anchor_a: Self::anchor_to_local(a, settings.space, settings.point_a),
            anchor_b: Self::anchor_to_local(b, settings.space, settings.point_b),
            frame_a: (a.rotation.conjugate() * settings.frame).normalize(),
            frame_b: (b.rotation.conjugate() * settings.frame).normalize(),
            translation: settings.translation,
            rotation: settings.rotation,
            motor: settings.motor,
            motor_state: MotorState::Off,
            target_velocity: Vec3::ZERO,
        };
        self.add_constraint(body_a, body_b, kind)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> PhysicsResult<()> {
        let constraint = self
            .constraints
            .remove(id)
            .ok_or(PhysicsError::UnknownConstraint(id))?;
        for body_id in [constraint.body_a, constraint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.constraints.retain(|c| *c != id);
                body.wake();
            }
        }
        Ok(())
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&UserConstraint> {
        self.constraints.get(id)
    }

    pub fn constraint_mut(&mut self, id: ConstraintId) -> Option<&mut UserConstraint> {
        self.constraints.get_mut(id)
    }

    pub fn set_constraint_enabled(&mut self, id: ConstraintId, enabled: bool) -> PhysicsResult<()> {
        let constraint = self
            .constraints
            .get_mut(id)
            .ok_or(PhysicsError::UnknownConstraint(id))?;
        constraint.enabled = enabled;
        let (a, b) = (constraint.body_a, constraint.body_b);
        for body_id in [a, b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.wake();
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------- commands

    /// Applies mutations queued by listeners during the previous update.
    pub fn apply_commands(&mut self, commands: &mut PendingCommands) -> Vec<PhysicsResult<()>> {
        let queued: Vec<WorldCommand> = commands.drain().collect();
        let mut results = Vec::with_capacity(queued.len());
        for command in queued {
            results.push(match command {
                WorldCommand::None => Ok(()),
                WorldCommand::CreateBody(settings) => self.create_body(&settings).map(|_| ()),
                WorldCommand::RemoveBody(id) => self.remove_body(id),
                WorldCommand::WakeBody(id) => self.wake_body(id),
                WorldCommand::AddImpulse(id, impulse) => self.add_impulse(id, impulse),
                WorldCommand::RemoveConstraint(id) => self.remove_constraint(id),
            });
        }
        results
    }

    // ---------------------------------------------------------------- update

    /// Convenience update without a listener.
    pub fn step(&mut self, dt: f32) -> PhysicsResult<()> {
        self.update(dt, &mut NoListener)
    }

    /// Advances the world by `dt` seconds, invoking listener callbacks
    /// in-step. `dt == 0` runs collision detection only and leaves all poses
    /// unchanged.
    pub fn update(&mut self, dt: f32, listener: &mut dyn PhysicsListener) -> PhysicsResult<()> {
        if dt < 0.0 {
            return Err(PhysicsError::NegativeTimeStep(dt));
        }

        let step_start = Instant::now();
        self.profiler.reset();
        self.profiler.body_count = self.bodies.len();

        // 1. Reset per-step state.
        self.contact_constraints.clear();
        self.contact_endpoints.clear();
        self.contact_cache.mark_all_unprocessed();
        for (_, body) in self.bodies.iter_mut() {
            body.ccd_slot = -1;
        }

        // 2. Forces into velocities.
        {
            let start = Instant::now();
            let gravity = if self.settings.gravity_enabled {
                self.settings.gravity
            } else {
                Vec3::ZERO
            };
            for (_, body) in self.bodies.iter_mut() {
                integrate_velocity(body, gravity, dt);
            }
            self.profiler.integrate_time += start.elapsed();
        }

        // 3. Broadphase pairs.
        let start = Instant::now();
        let pairs = self.collect_pairs(listener);
        self.profiler.broad_phase_time += start.elapsed();
        self.profiler.pair_count = pairs.len();

        // 4. Narrowphase, cache update, contact constraint setup.
        let start = Instant::now();
        self.narrowphase_pairs(&pairs, listener);
        self.profiler.narrow_phase_time += start.elapsed();
        self.profiler.manifold_count = self.contact_constraints.len();

        // 5. Sweep stale cache entries.
        self.sweep_contacts(listener);

        let mut islands = Vec::new();
        if dt > 0.0 {
            // 6. Wake propagation, islands, velocity solve.
            let start = Instant::now();
            self.propagate_wake();
            islands = self.build_islands();
            self.profiler.island_count = islands.len();
            self.solve_velocity(&islands, dt);
            self.profiler.solver_time += start.elapsed();
        }

        // The CCD pool is taken out of the world for the step so body borrows
        // stay disjoint; capacity survives across steps.
        let mut ccd_pool = std::mem::take(&mut self.ccd_pool);
        ccd_pool.reset();
        if dt > 0.0 {
            // 7. Velocity into position; CCD bodies defer.
            let start = Instant::now();
            self.integrate_positions(dt, &mut ccd_pool);
            self.profiler.integrate_time += start.elapsed();
            self.profiler.ccd_body_count = ccd_pool.len();
        }

        if dt > 0.0 && !ccd_pool.is_empty() {
            // 8. CCD: find, sort, resolve.
            let start = Instant::now();
            self.run_ccd(ccd_pool.as_mut_slice(), listener);
            self.profiler.ccd_time += start.elapsed();
        }
        self.ccd_pool = ccd_pool;

        if dt > 0.0 {
            // 9. Position solve.
            let start = Instant::now();
            self.solve_position(&islands);
            self.profiler.solver_time += start.elapsed();

            // 10. Write back derived state.
            self.sync_bodies_after_step();

            // 11. Sleep check per island.
            self.update_sleeping(&islands, dt);
        }

        // 12. Clear forces.
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
        }

        if dt > 0.0 {
            self.previous_dt = dt;
        }

        self.profiler.total_step_time = step_start.elapsed();
        if self.metrics_logging {
            let m = &self.metrics;
            debug!(
                "solver: islands={} contacts={} constraints={} normal_sum={:.4}",
                m.islands_solved, m.contacts_solved, m.constraints_solved, m.normal_impulse_sum
            );
            self.profiler.report();
        }
        Ok(())
    }

    // Canonicalised, deduplicated, sorted candidate pairs.
    fn collect_pairs(&self, listener: &mut dyn PhysicsListener) -> Vec<(BodyId, BodyId)> {
        let bodies = &self.bodies;
        let layers = &self.settings.layers;
        let mut pairs: Vec<(BodyId, BodyId)> = Vec::new();

        self.broadphase.find_colliding_pairs(layers, |a_id, b_id| {
            let (Some(a), Some(b)) = (bodies.get(a_id), bodies.get(b_id)) else {
                return;
            };
            if !a.is_dynamic() && !b.is_dynamic() {
                return;
            }
            // A fully sleeping pair keeps its cached contacts untouched.
            if (a.sleeping || !a.is_dynamic()) && (b.sleeping || !b.is_dynamic()) {
                return;
            }
            if !layers.should_collide(a.layer, b.layer) {
                return;
            }
            if (a.collision_group & b.collision_mask) == 0
                || (b.collision_group & a.collision_mask) == 0
            {
                return;
            }
            // First body of the pair: motion type rank dominates, then id.
            let order_ab = match a.motion_type.pair_rank().cmp(&b.motion_type.pair_rank()) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => a_id < b_id,
            };
            let pair = if order_ab { (a_id, b_id) } else { (b_id, a_id) };
            pairs.push(pair);
        });

        pairs.sort_unstable();
        pairs.dedup();
        pairs.retain(|(a, b)| match (bodies.get(*a), bodies.get(*b)) {
            (Some(body_a), Some(body_b)) => listener.on_body_pair_validate(body_a, body_b),
            _ => false,
        });
        pairs
    }

    fn narrowphase_pairs(&mut self, pairs: &[(BodyId, BodyId)], listener: &mut dyn PhysicsListener) {
        let collide_settings = CollideSettings {
            max_separation: self.settings.narrowphase.speculative_contact_distance,
            manifold_tolerance: self.settings.narrowphase.manifold_tolerance,
            normal_cos_max_delta: self.settings.narrowphase.normal_cos_max_delta_rotation,
        };
        let mut wake_list: Vec<BodyId> = Vec::new();

        for &(first_id, second_id) in pairs {
            let manifolds = {
                let (Some(first), Some(second)) =
                    (self.bodies.get(first_id), self.bodies.get(second_id))
                else {
                    continue;
                };
                let (Some(shape_a), Some(shape_b)) = (
                    self.shapes.get(first.shape),
                    self.shapes.get(second.shape),
                ) else {
                    continue;
                };

                let ctx = CollideContext {
                    registry: &self.shapes,
                    dispatch: &self.dispatch,
                    settings: collide_settings,
                    edge_removal: first.enhanced_internal_edge_removal
                        || second.enhanced_internal_edge_removal,
                };
                let mut accumulator = ManifoldAccumulator::new(
                    first.position,
                    collide_settings.normal_cos_max_delta,
                    collide_settings.max_contact_distance(),
                );
                collide_shapes(
                    &ctx,
                    &ShapeArgs::new(shape_a, first.transform()),
                    &ShapeArgs::new(shape_b, second.transform()),
                    &mut accumulator,
                );
                let reduce = first.use_manifold_reduction && second.use_manifold_reduction;
                accumulator.finalize(reduce)
            };

            if manifolds.is_empty() {
                continue;
            }

            let mut accept_all = false;
            for manifold in manifolds {
                if !accept_all {
                    let (Some(first), Some(second)) =
                        (self.bodies.get(first_id), self.bodies.get(second_id))
                    else {
                        continue;
                    };
                    match listener.on_contact_validate(
                        first,
                        second,
                        manifold.base_offset,
                        &manifold,
                    ) {
                        ValidateResult::AcceptContact => {}
                        ValidateResult::AcceptAllContactsForThisBodyPair => accept_all = true,
                        ValidateResult::RejectContact => continue,
                        ValidateResult::RejectAllContactsForThisBodyPair => break,
                    }
                }

                // Cache keys are ordered by id even when the processing order
                // is rank-based.
                let key = if first_id < second_id {
                    ContactKey::new(
                        first_id,
                        second_id,
                        manifold.sub_shape_a,
                        manifold.sub_shape_b,
                    )
                } else {
                    ContactKey::new(
                        second_id,
                        first_id,
                        manifold.sub_shape_b,
                        manifold.sub_shape_a,
                    )
                };

                let (event, warm_start, mut settings, cached) = {
                    let (Some(first), Some(second)) =
                        (self.bodies.get(first_id), self.bodies.get(second_id))
                    else {
                        continue;
                    };

                    // Contact points in the first body's local frame for
                    // warm-start matching.
                    let inv_rotation = first.rotation.conjugate();
                    let local_points: Vec<Vec3> = (0..manifold.point_count())
                        .map(|i| inv_rotation * (manifold.world_point_a(i) - first.com_position))
                        .collect();
                    let mut cached =
                        vec![CachedImpulse::default(); manifold.point_count()];
                    let (event, warm_start) =
                        self.contact_cache.update(key, &local_points, &mut cached);

                    let pair = Material::combine_pair(&first.material, &second.material);
                    let mut settings = ContactSettings::new(pair.friction, pair.restitution);
                    settings.is_sensor = first.is_sensor || second.is_sensor;
                    (event, warm_start, settings, cached)
                };

                {
                    let (Some(first), Some(second)) =
                        (self.bodies.get(first_id), self.bodies.get(second_id))
                    else {
                        continue;
                    };
                    match event {
                        ContactEvent::Added => {
                            listener.on_contact_added(first, second, &manifold, &mut settings)
                        }
                        ContactEvent::Persisted => {
                            listener.on_contact_persisted(first, second, &manifold, &mut settings)
                        }
                    }
                }

                if settings.is_sensor {
                    continue;
                }

                // Build the solver view with the listener-adjusted settings.
                let constraint = {
                    let (Some(first), Some(second)) =
                        (self.bodies.get(first_id), self.bodies.get(second_id))
                    else {
                        continue;
                    };
                    ContactConstraint::build(
                        first,
                        second,
                        key,
                        &manifold,
                        &settings,
                        &cached,
                        warm_start,
                        self.settings.solver.min_velocity_for_restitution,
                    )
                };

                let index = self.contact_constraints.len() as u32;
                self.contact_constraints.push(constraint);
                self.contact_endpoints
                    .push((index, first_id.index, second_id.index));

                for id in [first_id, second_id] {
                    if let Some(body) = self.bodies.get(id) {
                        if body.is_dynamic() && body.sleeping {
                            wake_list.push(id);
                        }
                    }
                }
            }
        }

        for id in wake_list {
            if let Some(body) = self.bodies.get_mut(id) {
                body.wake();
            }
        }
    }

    fn sweep_contacts(&mut self, listener: &mut dyn PhysicsListener) {
        // Contacts between fully sleeping pairs persist without processing.
        let bodies = &self.bodies;
        let mut keep: Vec<ContactKey> = Vec::new();
        for key in self.contact_cache.keys() {
            let asleep = |id: BodyId| {
                bodies
                    .get(id)
                    .map(|b| b.sleeping || !b.is_dynamic())
                    .unwrap_or(false)
            };
            let both_exist =
                bodies.get(key.body_a).is_some() && bodies.get(key.body_b).is_some();
            if both_exist && asleep(key.body_a) && asleep(key.body_b) {
                keep.push(*key);
            }
        }
        for key in keep {
            // Mark processed by re-registering the cached state untouched.
            self.contact_cache.touch(&key);
        }

        self.contact_cache.sweep_unprocessed(|key| {
            listener.on_contact_removed(key.body_a, key.body_b, key.sub_shape_a, key.sub_shape_b);
        });
    }

    // Wakes sleeping dynamic bodies connected through enabled constraints to
    // awake ones, to a fixpoint.
    fn propagate_wake(&mut self) {
        loop {
            let mut to_wake: Vec<BodyId> = Vec::new();
            for (_, constraint) in self.constraints.iter() {
                if !constraint.enabled {
                    continue;
                }
                let awake = |id: BodyId| {
                    self.bodies
                        .get(id)
                        .map(|b| b.is_dynamic() && !b.sleeping)
                        .unwrap_or(false)
                };
                let sleeping_dynamic = |id: BodyId| {
                    self.bodies
                        .get(id)
                        .map(|b| b.is_dynamic() && b.sleeping)
                        .unwrap_or(false)
                };
                if awake(constraint.body_a) && sleeping_dynamic(constraint.body_b) {
                    to_wake.push(constraint.body_b);
                }
                if awake(constraint.body_b) && sleeping_dynamic(constraint.body_a) {
                    to_wake.push(constraint.body_a);
                }
            }
            if to_wake.is_empty() {
                break;
            }
            for id in to_wake {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.wake();
                }
            }
        }
    }

    fn build_islands(&mut self) -> Vec<Island> {
        let slot_count = self.bodies.slot_capacity();
        let mut active = vec![false; slot_count];
        for (id, body) in self.bodies.iter() {
            active[id.index()] = body.is_dynamic() && !body.sleeping;
        }
        let builder = &mut self.island_builder;
        builder.prepare(slot_count, |slot| active[slot]);

        for &(_, slot_a, slot_b) in &self.contact_endpoints {
            builder.link(slot_a, slot_b);
        }

        let mut constraint_endpoints: Vec<(ConstraintId, u32, u32)> = Vec::new();
        for (id, constraint) in self.constraints.iter() {
            if !constraint.enabled {
                continue;
            }
            let slot_a = constraint.body_a.index;
            let slot_b = constraint.body_b.index;
            if builder.is_active(slot_a as usize) || builder.is_active(slot_b as usize) {
                builder.link(slot_a, slot_b);
                constraint_endpoints.push((id, slot_a, slot_b));
            }
        }

        collect_islands(
            builder,
            slot_count,
            &self.contact_endpoints,
            &constraint_endpoints,
            self.settings.solver.num_velocity_steps,
            self.settings.solver.num_position_steps,
        )
    }

    fn solve_velocity(&mut self, islands: &[Island], dt: f32) {
        let ratio = if self.previous_dt > 0.0 {
            dt / self.previous_dt
        } else {
            0.0
        };
        let solver = self.settings.solver;
        let mut metrics = SolverMetrics::default();

        let bodies = &mut self.bodies;
        let contact_constraints = &mut self.contact_constraints;
        let constraints = &mut self.constraints;

        for island in islands {
            metrics.islands_solved += 1;
            metrics.contacts_solved += island.contacts.len();
            metrics.constraints_solved += island.constraints.len();

            // Warm start.
            for &ci in &island.contacts {
                let constraint = &mut contact_constraints[ci as usize];
                if let Some((a, b)) = bodies.get2_mut(constraint.body_a, constraint.body_b) {
                    constraint.warm_start(a, b, ratio);
                }
            }
            for &cid in &island.constraints {
                if let Some(constraint) = constraints.get_mut(cid) {
                    if let Some((a, b)) = bodies.get2_mut(constraint.body_a, constraint.body_b) {
                        constraint.warm_start(a, b, ratio);
                    }
                }
            }

            let inv_iterations = 1.0 / island.num_velocity_steps.max(1) as f32;
            for _ in 0..island.num_velocity_steps {
                for &ci in &island.contacts {
                    let constraint = &mut contact_constraints[ci as usize];
                    if let Some((a, b)) = bodies.get2_mut(constraint.body_a, constraint.body_b)
                    {
                        constraint.solve_velocity(
                            a,
                            b,
                            dt,
                            solver.baumgarte_factor,
                            solver.penetration_slop,
                        );
                    }
                }
                for &cid in &island.constraints {
                    if let Some(constraint) = constraints.get_mut(cid) {
                        if let Some((a, b)) =
                            bodies.get2_mut(constraint.body_a, constraint.body_b)
                        {
                            constraint.solve_velocity(a, b, dt, inv_iterations);
                        }
                    }
                }
            }

            // Store final impulses for next step's warm start.
            for &ci in &island.contacts {
                let constraint = &contact_constraints[ci as usize];
                let impulses = constraint.impulses();
                for impulse in &impulses {
                    metrics.normal_impulse_sum += impulse.normal.abs();
                }
                self.contact_cache.store_impulses(&constraint.key, &impulses);
            }
            for &cid in &island.constraints {
                if let Some(constraint) = constraints.get_mut(cid) {
                    constraint.finish_step();
                }
            }
        }

        self.metrics = metrics;
    }

    fn integrate_positions(&mut self, dt: f32, ccd_pool: &mut FramePool<CcdBody>) {
        let ccd = self.settings.ccd;

        for (id, body) in self.bodies.iter_mut() {
            if body.motion_type == MotionType::Static || body.sleeping {
                continue;
            }
            if body.is_dynamic() && body.motion.quality == MotionQuality::LinearCast {
                let delta = body.velocity.linear * dt;
                let threshold = ccd.linear_cast_threshold * body.inner_radius;
                if delta.length_squared() > threshold * threshold {
                    // Orientation integrates now; translation waits for the cast.
                    integrate_orientation(body, dt);
                    body.ccd_slot = ccd_pool.acquire(CcdBody::new(
                        id,
                        id.index,
                        delta,
                        threshold * threshold,
                        ccd.linear_cast_max_penetration * body.inner_radius,
                    )) as i32;
                    continue;
                }
            }
            integrate_position(body, dt);
        }
    }

    fn run_ccd(&mut self, ccd_list: &mut [CcdBody], listener: &mut dyn PhysicsListener) {
        let _timer = crate::utils::logging::ScopedTimer::new("ccd");
        let speculative = self.settings.narrowphase.speculative_contact_distance;

        // Find the earliest hit per CCD body.
        for index in 0..ccd_list.len() {
            let (body_id, delta, slot) = {
                let record = &ccd_list[index];
                (record.body, record.delta_position, record.slot)
            };
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            let swept = body.world_aabb.swept(delta).expanded(speculative);

            let mut candidates: Vec<BodyId> = Vec::new();
            self.broadphase.query_aabb(&swept, |candidate| {
                if candidate != body_id {
                    candidates.push(candidate);
                }
                true
            });
            candidates.sort_unstable();
            candidates.dedup();

            for candidate_id in candidates {
                let Some(candidate) = self.bodies.get(candidate_id) else {
                    continue;
                };
                if candidate.is_sensor {
                    continue;
                }
                if !self
                    .settings
                    .layers
                    .should_collide(body.layer, candidate.layer)
                {
                    continue;
                }
                if (body.collision_group & candidate.collision_mask) == 0
                    || (candidate.collision_group & body.collision_mask) == 0
                {
                    continue;
                }

                // Mutual CCD pairs belong to the lower slot owner; the cast
                // then runs on the relative motion.
                let mut cast_delta = delta;
                if candidate.ccd_slot >= 0 {
                    if candidate_id.index < slot {
                        continue;
                    }
                    let responder = &ccd_list[candidate.ccd_slot as usize];
                    cast_delta = delta - responder.delta_position;
                }

                // Cheap reject: ray through the expanded target box.
                let expanded = candidate.world_aabb.expanded(speculative + body.inner_radius);
                if expanded
                    .ray_hit(body.com_position, cast_delta, 1.0)
                    .is_none()
                {
                    continue;
                }

                let (Some(shape_a), Some(shape_b)) = (
                    self.shapes.get(body.shape),
                    self.shapes.get(candidate.shape),
                ) else {
                    continue;
                };
                let hit = cast_shape_vs_shape(
                    &self.shapes,
                    &ShapeArgs::new(shape_a, body.transform()),
                    cast_delta,
                    &ShapeArgs::new(shape_b, candidate.transform()),
                    1.0e-3,
                );
                if let Some(hit) = hit {
                    if hit.fraction < 1.0 {
                        let pair = Material::combine_pair(&body.material, &candidate.material);
                        ccd_list[index].consider_hit(
                            candidate_id,
                            hit.fraction,
                            hit.point,
                            hit.normal,
                            pair.friction,
                            pair.restitution,
                        );
                    }
                }
            }
        }

        // Sort by fraction and resolve in order.
        sort_for_resolution(ccd_list);

        for index in 0..ccd_list.len() {
            let record = ccd_list[index].clone();

            let mut valid = record.has_hit();
            if let Some(hit_body) = record.hit_body {
                // An earlier stop of the responder invalidates this contact.
                if let Some(responder) = ccd_list.iter().find(|c| c.body == hit_body) {
                    if responder.has_hit() && responder.fraction_plus_slop < record.fraction {
                        valid = false;
                    }
                }
            }

            let travel_fraction = if valid { record.fraction_plus_slop } else { 1.0 };
            if let Some(body) = self.bodies.get_mut(record.body) {
                body.com_position += record.delta_position * travel_fraction;
            }

            let Some(hit_body) = record.hit_body.filter(|_| valid) else {
                continue;
            };

            if let Some((a, b)) = self.bodies.get2_mut(record.body, hit_body) {
                resolve_ccd_impulse(
                    a,
                    b,
                    record.contact_point,
                    record.contact_normal,
                    record.combined_friction,
                    record.combined_restitution,
                );
                b.wake();
            }

            // Record in the cache (never warm started) and fire events.
            let (first, second) = (record.body, hit_body);
            let key = if first < second {
                ContactKey::new(first, second, SubShapeId::ROOT, SubShapeId::ROOT)
            } else {
                ContactKey::new(second, first, SubShapeId::ROOT, SubShapeId::ROOT)
            };
            let local_point = self
                .bodies
                .get(first)
                .map(|b| b.rotation.conjugate() * (record.contact_point - b.com_position))
                .unwrap_or(Vec3::ZERO);
            let event = self.contact_cache.record_ccd_contact(key, local_point);

            let manifold = ContactManifold {
                base_offset: record.contact_point,
                normal: record.contact_normal,
                penetration: 0.0,
                sub_shape_a: SubShapeId::ROOT,
                sub_shape_b: SubShapeId::ROOT,
                points_a: vec![Vec3::ZERO],
                points_b: vec![Vec3::ZERO],
            };
            let mut settings = ContactSettings::new(
                record.combined_friction,
                record.combined_restitution,
            );
            let (Some(body_a), Some(body_b)) = (self.bodies.get(first), self.bodies.get(second))
            else {
                continue;
            };
            match event {
                ContactEvent::Added => {
                    listener.on_contact_added(body_a, body_b, &manifold, &mut settings)
                }
                ContactEvent::Persisted => {
                    listener.on_contact_persisted(body_a, body_b, &manifold, &mut settings)
                }
            }
        }
    }

    fn solve_position(&mut self, islands: &[Island]) {
        let solver = self.settings.solver;
        let bodies = &mut self.bodies;
        let contact_constraints = &self.contact_constraints;
        let constraints = &mut self.constraints;

        for island in islands {
            for _ in 0..island.num_position_steps {
                let mut max_correction = 0.0_f32;
                for &ci in &island.contacts {
                    let constraint = &contact_constraints[ci as usize];
                    if let Some((a, b)) = bodies.get2_mut(constraint.body_a, constraint.body_b)
                    {
                        let applied = constraint.solve_position(
                            a,
                            b,
                            solver.baumgarte_factor,
                            solver.penetration_slop,
                        );
                        max_correction = max_correction.max(applied);
                    }
                }
                for &cid in &island.constraints {
                    if let Some(constraint) = constraints.get_mut(cid) {
                        if let Some((a, b)) =
                            bodies.get2_mut(constraint.body_a, constraint.body_b)
                        {
                            constraint.solve_position(a, b);
                        }
                    }
                }
                // A pass that applied no impulses ends the loop for this island.
                if max_correction < 1.0e-6 {
                    break;
                }
            }
        }
    }

    fn sync_bodies_after_step(&mut self) {
        let shapes = &self.shapes;
        let broadphase = &mut self.broadphase;
        let margin = self.settings.narrowphase.speculative_contact_distance;

        for (id, body) in self.bodies.iter_mut() {
            if body.motion_type == MotionType::Static || body.sleeping {
                continue;
            }
            body.sync_position_from_com();
            if let Some(shape) = shapes.get(body.shape) {
                body.world_aabb = shape.local_aabb.transformed(body.position, body.rotation);
            }
            broadphase.update_body(id, body.world_aabb, margin);
        }
    }

    fn update_sleeping(&mut self, islands: &[Island], dt: f32) {
        let sleep = self.settings.sleep;
        let linear_sq = sleep.linear_velocity_threshold * sleep.linear_velocity_threshold;
        let angular_sq = sleep.angular_velocity_threshold * sleep.angular_velocity_threshold;

        let mut slot_ids: Vec<Option<BodyId>> = vec![None; self.bodies.slot_capacity()];
        for id in self.bodies.handles() {
            slot_ids[id.index()] = Some(id);
        }

        for island in islands {
            let mut island_can_sleep = true;
            for &slot in &island.bodies {
                let Some(body) = slot_ids[slot as usize].and_then(|id| self.bodies.get_mut(id))
                else {
                    continue;
                };
                let resting = body.velocity.linear.length_squared() < linear_sq
                    && body.velocity.angular.length_squared() < angular_sq;
                if resting {
                    body.sleep_timer += dt;
                } else {
                    body.sleep_timer = 0.0;
                }
                if !body.allow_sleeping || body.sleep_timer < sleep.time_before_sleep {
                    island_can_sleep = false;
                }
            }

            if island_can_sleep {
                for &slot in &island.bodies {
                    if let Some(body) =
                        slot_ids[slot as usize].and_then(|id| self.bodies.get_mut(id))
                    {
                        body.fall_asleep();
                    }
                }
            }
        }
    }

    // --------------------------------------------------------------- queries

    /// Casts a ray through the world. `direction` must be unit length;
    /// `max_distance` bounds the cast.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &QueryFilter,
        collector: &mut dyn HitCollector<RayCastHit>,
    ) -> PhysicsResult<()> {
        let len = direction.length();
        if (len - 1.0).abs() > 1e-3 {
            return Err(PhysicsError::NotNormalised(len));
        }

        let bodies = &self.bodies;
        let shapes = &self.shapes;
        self.broadphase
            .cast_ray(origin, direction, max_distance, |body_id, _t| {
                if collector.should_early_out() {
                    return 0.0;
                }
                let clip = collector.early_out_fraction().min(max_distance);
                let Some(body) = bodies.get(body_id) else {
                    return clip;
                };
                if !filter.accepts(body_id, body) {
                    return clip;
                }
                let Some(shape) = shapes.get(body.shape) else {
                    return clip;
                };
                if let Some((t, sub_shape, normal)) = cast_ray_shape(
                    shapes,
                    shape,
                    &body.transform(),
                    Vec3::ONE,
                    SubShapeId::ROOT,
                    origin,
                    direction,
                    clip,
                ) {
                    collector.add_hit(RayCastHit {
                        body: body_id,
                        sub_shape,
                        fraction: t,
                        point: origin + direction * t,
                        normal,
                    });
                }
                collector.early_out_fraction().min(max_distance)
            });
        Ok(())
    }

    /// Sweeps a shape along `delta` and collects time-of-impact hits.
    #[allow(clippy::too_many_arguments)]
    pub fn cast_shape(
        &self,
        shape: ShapeId,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
        delta: Vec3,
        filter: &QueryFilter,
        collector: &mut dyn HitCollector<ShapeCastHit>,
    ) -> PhysicsResult<()> {
        let cast_shape = self
            .shapes
            .get(shape)
            .ok_or(PhysicsError::UnknownShape(shape))?;
        let args = ShapeArgs {
            shape: cast_shape,
            transform: Transform::new(position, rotation),
            scale,
            sub_shape: SubShapeId::ROOT,
        };
        let swept = cast_shape
            .local_aabb
            .scaled(scale)
            .transformed(position, rotation)
            .swept(delta)
            .expanded(self.settings.narrowphase.speculative_contact_distance);

        let mut candidates: Vec<BodyId> = Vec::new();
        self.broadphase.query_aabb(&swept, |id| {
            candidates.push(id);
            true
        });
        candidates.sort_unstable();
        candidates.dedup();

        for body_id in candidates {
            if collector.should_early_out() {
                break;
            }
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            if !filter.accepts(body_id, body) {
                continue;
            }
            let Some(target_shape) = self.shapes.get(body.shape) else {
                continue;
            };
            let target_args = ShapeArgs::new(target_shape, body.transform());
            if let Some(hit) =
                cast_shape_vs_shape(&self.shapes, &args, delta, &target_args, 1.0e-3)
            {
                if hit.fraction <= collector.early_out_fraction() {
                    collector.add_hit(ShapeCastHit {
                        body: body_id,
                        fraction: hit.fraction,
                        point: hit.point,
                        normal: hit.normal,
                    });
                }
            }
        }
        Ok(())
    }

    /// Collects all bodies whose shapes contain `point`.
    pub fn collide_point(
        &self,
        point: Vec3,
        filter: &QueryFilter,
        collector: &mut dyn HitCollector<CollidePointHit>,
    ) {
        let bodies = &self.bodies;
        let shapes = &self.shapes;
        let probe = crate::core::aabb::Aabb::from_center_half_extents(point, Vec3::splat(1e-4));
        self.broadphase.query_aabb(&probe, |body_id| {
            if collector.should_early_out() {
                return false;
            }
            let Some(body) = bodies.get(body_id) else {
                return true;
            };
            if !filter.accepts(body_id, body) {
                return true;
            }
            let Some(shape) = shapes.get(body.shape) else {
                return true;
            };
            if collide_point_shape(shapes, shape, &body.transform(), Vec3::ONE, point) {
                collector.add_hit(CollidePointHit { body: body_id });
            }
            true
        });
    }

    /// Collides a shape placed in the world against all bodies, producing
    /// contact manifolds.
    #[allow(clippy::too_many_arguments)]
    pub fn collide_shape(
        &self,
        shape: ShapeId,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
        filter: &QueryFilter,
        collector: &mut dyn HitCollector<CollideShapeHit>,
    ) -> PhysicsResult<()> {
        let query_shape = self
            .shapes
            .get(shape)
            .ok_or(PhysicsError::UnknownShape(shape))?;
        let collide_settings = CollideSettings {
            max_separation: self.settings.narrowphase.speculative_contact_distance,
            manifold_tolerance: self.settings.narrowphase.manifold_tolerance,
            normal_cos_max_delta: self.settings.narrowphase.normal_cos_max_delta_rotation,
        };
        let query_aabb = query_shape
            .local_aabb
            .scaled(scale)
            .transformed(position, rotation)
            .expanded(collide_settings.max_separation);

        let mut candidates: Vec<BodyId> = Vec::new();
        self.broadphase.query_aabb(&query_aabb, |id| {
            candidates.push(id);
            true
        });
        candidates.sort_unstable();
        candidates.dedup();

        for body_id in candidates {
            if collector.should_early_out() {
                break;
            }
            let Some(body) = self.bodies.get(body_id) else {
                continue;
            };
            if !filter.accepts(body_id, body) {
                continue;
            }
            let Some(body_shape) = self.shapes.get(body.shape) else {
                continue;
            };

            let ctx = CollideContext {
                registry: &self.shapes,
                dispatch: &self.dispatch,
                settings: collide_settings,
                edge_removal: body.enhanced_internal_edge_removal,
            };
            let args = ShapeArgs {
                shape: query_shape,
                transform: Transform::new(position, rotation),
                scale,
                sub_shape: SubShapeId::ROOT,
            };
            let mut accumulator = ManifoldAccumulator::new(
                position,
                collide_settings.normal_cos_max_delta,
                collide_settings.max_contact_distance(),
            );
            collide_shapes(
                &ctx,
                &args,
                &ShapeArgs::new(body_shape, body.transform()),
                &mut accumulator,
            );
            for manifold in accumulator.finalize(true) {
                collector.add_hit(CollideShapeHit {
                    body: body_id,
                    manifold,
                });
            }
        }
        Ok(())
    }
}

/// Sanity re-export: manifolds entering the solver never exceed this.
pub const MAX_CONTACT_POINTS: usize = config::MAX_MANIFOLD_POINTS;

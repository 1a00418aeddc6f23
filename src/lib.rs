//! Kinetica – a real-time interactive 3D rigid-body physics core.
//!
//! The crate turns `update(world, Δt)` into a new consistent world state:
//! broadphase pair generation over per-layer AABB trees, GJK/EPA narrowphase
//! with polygon-clipped contact manifolds, a persistent contact cache with
//! warm starting, an island-based iterative constraint solver, and a linear
//! cast pipeline for fast bodies. Rendering, scenes, and asset loading are
//! clients of this library, not part of it.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Mat4, Quat, Vec3};

pub use collision::{
    broadphase::BroadPhase,
    manifold::ContactManifold,
    narrowphase::{CollideDispatch, ShapeCastHit as NarrowphaseShapeCastHit},
    queries::{
        AllHitCollector, AnyHitCollector, ClosestHitCollector, CollidePointHit, HitCollector,
        QueryFilter, RayCastHit, ShapeCastHit,
    },
};
pub use self::core::{
    body::{
        AllowedDofs, BodyId, BodySettings, ConstraintId, MotionQuality, MotionType, RigidBody,
    },
    layers::{BroadPhaseLayer, LayerConfig, ObjectLayer},
    mesh::{MeshBuilder, TriangleMesh},
    shape::{CompoundChild, ShapeId, ShapeKind, ShapeRegistry, ShapeType},
    subshape::SubShapeId,
    types::{CombineMode, MassProperties, Material, Transform, Velocity},
};
pub use dynamics::{
    axis_constraint::{MotorSettings, MotorState, SpringSettings},
    constraints::{
        AxisMode, ConeSettings, ConstraintKind, ConstraintSpace, DistanceSettings, HingeSettings,
        SixDofSettings, SliderSettings, SwingTwistSettings,
    },
    contact_solver::ContactSettings,
};
pub use error::{PhysicsError, PhysicsResult};
pub use world::{
    CollideShapeHit, NoListener, PendingCommands, PhysicsListener, PhysicsWorld, ValidateResult,
    WorldSettings,
};

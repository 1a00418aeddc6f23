//! Global configuration constants for the Kinetica engine.

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of velocity solver iterations performed per step.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 10;

/// Number of position solver iterations performed per step.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 2;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.05;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.05;

/// Contact distance under which the broadphase emits speculative pairs.
pub const DEFAULT_SPECULATIVE_CONTACT_DISTANCE: f32 = 0.02;

/// Penetration depth tolerated before the solver pushes back.
pub const DEFAULT_PENETRATION_SLOP: f32 = 0.02;

/// Baumgarte position-feedback factor for the velocity solver.
pub const DEFAULT_BAUMGARTE_FACTOR: f32 = 0.2;

/// Distance tolerance when merging clipped contact points into a manifold.
pub const DEFAULT_MANIFOLD_TOLERANCE: f32 = 1.0e-3;

/// Cosine of the maximum angle between normals merged into one manifold (~2 degrees).
pub const DEFAULT_NORMAL_COS_MAX_DELTA: f32 = 0.999_4;

/// Convex radius used by shapes that shrink their hull for GJK.
pub const DEFAULT_CONVEX_RADIUS: f32 = 0.05;

/// Fraction of the inner radius a body must travel per step to trigger a linear cast.
pub const DEFAULT_LINEAR_CAST_THRESHOLD: f32 = 0.75;

/// Fraction of the inner radius a linear cast may end up penetrating.
pub const DEFAULT_LINEAR_CAST_MAX_PENETRATION: f32 = 0.25;

/// Normal approach speed above which restitution is applied.
pub const DEFAULT_MIN_VELOCITY_FOR_RESTITUTION: f32 = 1.0;

/// Linear speed below which a body is considered resting.
pub const DEFAULT_SLEEP_LINEAR_THRESHOLD: f32 = 0.03;

/// Angular speed below which a body is considered resting.
pub const DEFAULT_SLEEP_ANGULAR_THRESHOLD: f32 = 0.05;

/// Seconds a whole island must rest before it is put to sleep.
pub const DEFAULT_TIME_BEFORE_SLEEP: f32 = 0.5;

/// Default clamp applied to linear velocity after integration.
pub const DEFAULT_MAX_LINEAR_VELOCITY: f32 = 500.0;

/// Default clamp applied to angular velocity after integration (rad/s).
pub const DEFAULT_MAX_ANGULAR_VELOCITY: f32 = 15.0 * std::f32::consts::PI;

/// Maximum raw contact points collected before manifold reduction.
pub const MAX_RAW_CONTACT_POINTS: usize = 64;

/// Maximum contact points per manifold after reduction.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Maximum manifolds accumulated for a single body pair.
pub const MAX_MANIFOLDS_PER_PAIR: usize = 32;

/// Squared-length floor used when normalising near-degenerate vectors.
pub const EPSILON_SQ: f32 = 1.0e-12;

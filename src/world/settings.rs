use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    config,
    core::layers::{BroadPhaseLayer, LayerConfig, ObjectLayer},
    error::PhysicsResult,
};

/// Narrowphase tolerances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrowphaseSettings {
    /// Distance at which separated shapes still produce speculative contacts.
    pub speculative_contact_distance: f32,
    /// Extra slack when filtering clipped manifold points.
    pub manifold_tolerance: f32,
    /// Cosine of the largest normal delta merged into one manifold.
    pub normal_cos_max_delta_rotation: f32,
}

impl Default for NarrowphaseSettings {
    fn default() -> Self {
        Self {
            speculative_contact_distance: config::DEFAULT_SPECULATIVE_CONTACT_DISTANCE,
            manifold_tolerance: config::DEFAULT_MANIFOLD_TOLERANCE,
            normal_cos_max_delta_rotation: config::DEFAULT_NORMAL_COS_MAX_DELTA,
        }
    }
}

/// Constraint solver configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub num_velocity_steps: u32,
    pub num_position_steps: u32,
    pub baumgarte_factor: f32,
    pub penetration_slop: f32,
    /// Normal approach speed above which restitution applies.
    pub min_velocity_for_restitution: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            num_velocity_steps: config::DEFAULT_VELOCITY_ITERATIONS,
            num_position_steps: config::DEFAULT_POSITION_ITERATIONS,
            baumgarte_factor: config::DEFAULT_BAUMGARTE_FACTOR,
            penetration_slop: config::DEFAULT_PENETRATION_SLOP,
            min_velocity_for_restitution: config::DEFAULT_MIN_VELOCITY_FOR_RESTITUTION,
        }
    }
}

/// Continuous collision detection configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CcdSettings {
    /// Fraction of the inner radius a body must move per step to linear cast.
    pub linear_cast_threshold: f32,
    /// Fraction of the inner radius a stopped cast may still penetrate.
    pub linear_cast_max_penetration: f32,
}

impl Default for CcdSettings {
    fn default() -> Self {
        Self {
            linear_cast_threshold: config::DEFAULT_LINEAR_CAST_THRESHOLD,
            linear_cast_max_penetration: config::DEFAULT_LINEAR_CAST_MAX_PENETRATION,
        }
    }
}

/// Sleeping thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepSettings {
    pub linear_velocity_threshold: f32,
    pub angular_velocity_threshold: f32,
    pub time_before_sleep: f32,
}

impl Default for SleepSettings {
    fn default() -> Self {
        Self {
            linear_velocity_threshold: config::DEFAULT_SLEEP_LINEAR_THRESHOLD,
            angular_velocity_threshold: config::DEFAULT_SLEEP_ANGULAR_THRESHOLD,
            time_before_sleep: config::DEFAULT_TIME_BEFORE_SLEEP,
        }
    }
}

/// Complete configuration for a physics world, layers included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    pub gravity: Vec3,
    pub gravity_enabled: bool,
    pub narrowphase: NarrowphaseSettings,
    pub solver: SolverSettings,
    pub ccd: CcdSettings,
    pub sleep: SleepSettings,
    pub layers: LayerConfig,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_slice(&config::DEFAULT_GRAVITY),
            gravity_enabled: true,
            narrowphase: NarrowphaseSettings::default(),
            solver: SolverSettings::default(),
            ccd: CcdSettings::default(),
            sleep: SleepSettings::default(),
            layers: LayerConfig::new(),
        }
    }
}

impl WorldSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings with a single layer where everything collides; the layer is
    /// returned for body creation.
    pub fn single_layer() -> (Self, ObjectLayer) {
        let (layers, layer) = LayerConfig::single_layer();
        (
            Self {
                layers,
                ..Self::default()
            },
            layer,
        )
    }

    pub fn add_broad_phase_layer(&mut self) -> BroadPhaseLayer {
        self.layers.add_broad_phase_layer()
    }

    pub fn add_object_layer(&mut self, broad_phase: BroadPhaseLayer) -> PhysicsResult<ObjectLayer> {
        self.layers.add_object_layer(broad_phase)
    }

    pub fn enable_collision(&mut self, a: ObjectLayer, b: ObjectLayer) -> PhysicsResult<()> {
        self.layers.enable_collision(a, b)
    }
}

use thiserror::Error;

use crate::utils::pool::Handle;

/// Usage errors reported by the public API.
///
/// Geometric degeneracies are never reported here; they degrade to
/// conservative fallbacks inside the collision pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum PhysicsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unknown shape handle {0:?}")]
    UnknownShape(Handle),

    #[error("unknown body handle {0:?}")]
    UnknownBody(Handle),

    #[error("unknown constraint handle {0:?}")]
    UnknownConstraint(Handle),

    #[error("object layer {0} is not registered")]
    UnknownObjectLayer(u16),

    #[error("broadphase layer {0} is not registered")]
    UnknownBroadPhaseLayer(u8),

    #[error("time step must be non-negative, got {0}")]
    NegativeTimeStep(f32),

    #[error("direction vector must be normalised (|v| = {0})")]
    NotNormalised(f32),
}

/// Convenience alias used by fallible engine entry points.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

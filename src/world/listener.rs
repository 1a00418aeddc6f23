use glam::Vec3;

use crate::{
    collision::manifold::ContactManifold,
    core::body::{BodyId, BodySettings, ConstraintId, RigidBody},
    dynamics::contact_solver::ContactSettings,
};

/// Verdict of `on_contact_validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidateResult {
    #[default]
    AcceptContact,
    /// Accept and stop validating further manifolds of this pair.
    AcceptAllContactsForThisBodyPair,
    RejectContact,
    /// Reject and short-circuit the remaining manifolds of this pair.
    RejectAllContactsForThisBodyPair,
}

/// Contact and pair callbacks invoked inside the step.
///
/// Callbacks may read body state but must not add or remove bodies or
/// constraints; queue such intents into a [`PendingCommands`] and apply them
/// after the update returns.
pub trait PhysicsListener {
    /// Cheapest rejection point, before any narrowphase work.
    fn on_body_pair_validate(&mut self, _body_a: &RigidBody, _body_b: &RigidBody) -> bool {
        true
    }

    /// Per-manifold filter; `base_offset` is the origin of the manifold's
    /// relative contact points.
    fn on_contact_validate(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _base_offset: Vec3,
        _manifold: &ContactManifold,
    ) -> ValidateResult {
        ValidateResult::AcceptContact
    }

    /// First collision of this sub-shape pair. `settings` is mutable: combined
    /// friction/restitution, mass scales, and the sensor flag may be adjusted.
    fn on_contact_added(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _manifold: &ContactManifold,
        _settings: &mut ContactSettings,
    ) {
    }

    /// Pair collided last step too.
    fn on_contact_persisted(
        &mut self,
        _body_a: &RigidBody,
        _body_b: &RigidBody,
        _manifold: &ContactManifold,
        _settings: &mut ContactSettings,
    ) {
    }

    /// Cached contact expired. Only ids are passed; the bodies may already be
    /// gone.
    fn on_contact_removed(
        &mut self,
        _body_a: BodyId,
        _body_b: BodyId,
        _sub_shape_a: u32,
        _sub_shape_b: u32,
    ) {
    }
}

/// Listener that accepts everything and observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoListener;

impl PhysicsListener for NoListener {}

/// Deferred world mutations queued from listener callbacks.
#[derive(Default)]
pub enum WorldCommand {
    #[default]
    None,
    CreateBody(Box<BodySettings>),
    RemoveBody(BodyId),
    WakeBody(BodyId),
    AddImpulse(BodyId, Vec3),
    RemoveConstraint(ConstraintId),
}

/// FIFO buffer of [`WorldCommand`]s for post-step application.
///
/// Listeners cannot mutate the world mid-step (the world is exclusively
/// borrowed by the update), so destructive intent goes through here.
#[derive(Default)]
pub struct PendingCommands {
    commands: Vec<WorldCommand>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_body(&mut self, settings: BodySettings) {
        self.commands.push(WorldCommand::CreateBody(Box::new(settings)));
    }

    pub fn remove_body(&mut self, body: BodyId) {
        self.commands.push(WorldCommand::RemoveBody(body));
    }

    pub fn wake_body(&mut self, body: BodyId) {
        self.commands.push(WorldCommand::WakeBody(body));
    }

    pub fn add_impulse(&mut self, body: BodyId, impulse: Vec3) {
        self.commands.push(WorldCommand::AddImpulse(body, impulse));
    }

    pub fn remove_constraint(&mut self, constraint: ConstraintId) {
        self.commands.push(WorldCommand::RemoveConstraint(constraint));
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = WorldCommand> + '_ {
        self.commands.drain(..)
    }
}

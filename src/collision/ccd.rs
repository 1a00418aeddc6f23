use glam::Vec3;

use crate::core::body::{BodyId, RigidBody};

/// Per-step record for a body in linear-cast motion quality whose step
/// displacement exceeds its activation threshold. Pooled; rebuilt each step.
#[derive(Debug, Clone)]
pub struct CcdBody {
    pub body: BodyId,
    /// Body slot index, used for pair-ownership and tie breaking.
    pub slot: u32,
    /// Linear velocity × Δt; the motion the cast covers.
    pub delta_position: Vec3,
    /// Body hit earliest along the sweep, if any.
    pub hit_body: Option<BodyId>,
    /// Fraction of `delta_position` travelled at first contact (1 = clear).
    pub fraction: f32,
    /// Fraction extended by the penetration slop, where the body is placed.
    pub fraction_plus_slop: f32,
    pub contact_point: Vec3,
    /// Contact normal from this body toward the hit body.
    pub contact_normal: Vec3,
    pub combined_friction: f32,
    pub combined_restitution: f32,
    /// Squared activation threshold (linear-cast threshold × inner radius)².
    pub threshold_sq: f32,
    /// Allowed penetration distance at the stop position.
    pub max_penetration: f32,
}

impl CcdBody {
    pub fn new(
        body: BodyId,
        slot: u32,
        delta_position: Vec3,
        threshold_sq: f32,
        max_penetration: f32,
    ) -> Self {
        Self {
            body,
            slot,
            delta_position,
            hit_body: None,
            fraction: 1.0,
            fraction_plus_slop: 1.0,
            contact_point: Vec3::ZERO,
            contact_normal: Vec3::ZERO,
            combined_friction: 0.0,
            combined_restitution: 0.0,
            threshold_sq,
            max_penetration,
        }
    }

    pub fn has_hit(&self) -> bool {
        self.hit_body.is_some()
    }

    /// Accepts a hit if it is earlier than the current one.
    #[allow(clippy::too_many_arguments)]
    pub fn consider_hit(
        &mut self,
        other: BodyId,
        fraction: f32,
        point: Vec3,
        normal: Vec3,
        friction: f32,
        restitution: f32,
    ) {
        if fraction >= self.fraction {
            return;
        }
        let travel = self.delta_position.length();
        let slop_fraction = if travel > 1e-9 {
            self.max_penetration / travel
        } else {
            0.0
        };
        self.hit_body = Some(other);
        self.fraction = fraction;
        self.fraction_plus_slop = (fraction + slop_fraction).min(1.0);
        self.contact_point = point;
        self.contact_normal = normal;
        self.combined_friction = friction;
        self.combined_restitution = restitution;
    }
}

/// Sort order for CCD resolution: earliest fraction first, ties broken by
/// body slot so the order is deterministic.
pub fn sort_for_resolution(ccd_bodies: &mut [CcdBody]) {
    ccd_bodies.sort_by(|a, b| {
        a.fraction
            .partial_cmp(&b.fraction)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.slot.cmp(&b.slot))
    });
}

/// One Gauss-Seidel iteration of normal plus Coulomb-clamped friction
/// impulses at a CCD contact.
pub fn resolve_ccd_impulse(
    body_a: &mut RigidBody,
    body_b: &mut RigidBody,
    point: Vec3,
    normal: Vec3,
    friction: f32,
    restitution: f32,
) {
    let r_a = point - body_a.com_position;
    let r_b = point - body_b.com_position;

    let v_a = body_a.velocity.point_velocity(r_a);
    let v_b = body_b.velocity.point_velocity(r_b);
    let approach = (v_b - v_a).dot(normal);
    if approach >= 0.0 {
        return;
    }

    fn mass_for(body_a: &RigidBody, body_b: &RigidBody, r_a: Vec3, r_b: Vec3, axis: Vec3) -> f32 {
        let ra_cross = r_a.cross(axis);
        let rb_cross = r_b.cross(axis);
        let k = body_a.inverse_mass()
            + body_b.inverse_mass()
            + ra_cross.dot(body_a.inverse_inertia_world() * ra_cross)
            + rb_cross.dot(body_b.inverse_inertia_world() * rb_cross);
        if k > 1e-9 {
            1.0 / k
        } else {
            0.0
        }
    }

    let normal_mass = mass_for(body_a, body_b, r_a, r_b, normal);
    let normal_impulse = -normal_mass * (1.0 + restitution) * approach;
    apply_pair_impulse(body_a, body_b, r_a, r_b, normal * normal_impulse);

    // Friction clamped to the Coulomb cone against the just-applied impulse.
    let v_a = body_a.velocity.point_velocity(r_a);
    let v_b = body_b.velocity.point_velocity(r_b);
    let rel = v_b - v_a;
    let tangent_vel = rel - normal * rel.dot(normal);
    let speed = tangent_vel.length();
    if speed > 1e-6 {
        let tangent = tangent_vel / speed;
        let tangent_mass = mass_for(body_a, body_b, r_a, r_b, tangent);
        let mut tangent_impulse = -tangent_mass * speed;
        let max_friction = friction * normal_impulse;
        tangent_impulse = tangent_impulse.clamp(-max_friction, max_friction);
        apply_pair_impulse(body_a, body_b, r_a, r_b, tangent * tangent_impulse);
    }
}

fn apply_pair_impulse(
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

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slot: u32, fraction: f32) -> CcdBody {
        let mut ccd = CcdBody::new(BodyId::new(slot, 0), slot, Vec3::X, 1.0, 0.05);
        if fraction < 1.0 {
            ccd.consider_hit(
                BodyId::new(99, 0),
                fraction,
                Vec3::ZERO,
                Vec3::X,
                0.2,
                0.0,
            );
        }
        ccd
    }

    #[test]
    fn hits_keep_only_the_earliest_fraction() {
        let mut ccd = CcdBody::new(BodyId::new(0, 0), 0, Vec3::new(10.0, 0.0, 0.0), 1.0, 0.05);
        ccd.consider_hit(BodyId::new(1, 0), 0.6, Vec3::ZERO, Vec3::X, 0.0, 0.0);
        ccd.consider_hit(BodyId::new(2, 0), 0.3, Vec3::ZERO, Vec3::X, 0.0, 0.0);
        ccd.consider_hit(BodyId::new(3, 0), 0.5, Vec3::ZERO, Vec3::X, 0.0, 0.0);

        assert_eq!(ccd.hit_body, Some(BodyId::new(2, 0)));
        assert!((ccd.fraction - 0.3).abs() < 1e-6);
        // Slop extends the stop fraction slightly past the contact.
        assert!(ccd.fraction_plus_slop > ccd.fraction);
    }

    #[test]
    fn resolution_order_is_by_fraction_then_slot() {
        let mut list = vec![record(2, 0.8), record(0, 0.5), record(1, 0.5)];
        sort_for_resolution(&mut list);
        let order: Vec<u32> = list.iter().map(|c| c.slot).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}

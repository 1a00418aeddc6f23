use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid pose of a body or shape: position plus orientation.
///
/// Non-uniform scale is not part of a pose; scaling is expressed through the
/// `Scaled` shape variant so a body transform is always rigid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Builds a homogeneous matrix representation of the pose.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Applies another pose on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Maps a point from this pose's local space into world space.
    pub fn point_to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Maps a world-space point into this pose's local space.
    pub fn point_to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.conjugate() * (world - self.position)
    }

    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.conjugate();
        Transform {
            position: inv_rotation * -self.position,
            rotation: inv_rotation,
        }
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    /// Velocity of a point offset `r` from the centre of mass.
    pub fn point_velocity(&self, r: Vec3) -> Vec3 {
        self.linear + self.angular.cross(r)
    }
}

/// Mass and local-space inertia tensor data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
        }
    }
}

impl MassProperties {
    /// Zero-mass properties used by static shapes and degenerate geometry.
    pub const ZERO: MassProperties = MassProperties {
        mass: 0.0,
        inertia: Mat3::ZERO,
    };

    /// Rescales the properties so the total mass becomes `mass`.
    pub fn with_mass(mut self, mass: f32) -> Self {
        if self.mass > f32::EPSILON {
            let factor = mass / self.mass;
            self.inertia *= factor;
        }
        self.mass = mass;
        self
    }
}

/// How two materials mix a coefficient at a contact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum CombineMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl CombineMode {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineMode::Average => 0.5 * (a + b),
            CombineMode::Min => a.min(b),
            CombineMode::Max => a.max(b),
            CombineMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
        }
    }

    /// Resolves the mode used for a pair: a non-default mode wins over Average.
    fn resolve(self, other: CombineMode) -> CombineMode {
        if matches!(self, CombineMode::Average) {
            other
        } else {
            self
        }
    }
}

/// Surface coefficients that affect contact response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub friction_combine: CombineMode,
    pub restitution_combine: CombineMode,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
            friction_combine: CombineMode::default(),
            restitution_combine: CombineMode::default(),
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            friction: 1.0,
            restitution: 0.8,
            ..Self::default()
        }
    }

    pub fn steel() -> Self {
        Self {
            density: 7.8,
            friction: 0.5,
            restitution: 0.4,
            ..Self::default()
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            friction: 0.04,
            restitution: 0.05,
            ..Self::default()
        }
    }

    pub fn combine_pair(a: &Self, b: &Self) -> MaterialPair {
        let friction_mode = a.friction_combine.resolve(b.friction_combine);
        let restitution_mode = a.restitution_combine.resolve(b.restitution_combine);
        MaterialPair {
            friction: friction_mode.combine(a.friction, b.friction),
            restitution: restitution_mode.combine(a.restitution, b.restitution),
        }
    }
}

/// Combined coefficients for one contact pair.
#[derive(Debug, Clone, Copy)]
pub struct MaterialPair {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for MaterialPair {
    fn default() -> Self {
        Material::combine_pair(&Material::default(), &Material::default())
    }
}

/// Helper constructors for inertia tensors of primitive solids.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
    fn for_solid_cylinder(half_height: f32, radius: f32, mass: f32) -> Mat3;
    fn for_solid_capsule(half_height: f32, radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }

    fn for_solid_cylinder(half_height: f32, radius: f32, mass: f32) -> Mat3 {
        let h = half_height * 2.0;
        let lateral = mass * (3.0 * radius * radius + h * h) / 12.0;
        let axial = 0.5 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
    }

    fn for_solid_capsule(half_height: f32, radius: f32, mass: f32) -> Mat3 {
        // Cylinder plus two hemispherical caps, masses split by volume.
        let h = half_height * 2.0;
        let r2 = radius * radius;
        let cylinder_volume = std::f32::consts::PI * r2 * h;
        let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * r2 * radius;
        let total = cylinder_volume + sphere_volume;
        if total < f32::EPSILON {
            return Mat3::ZERO;
        }
        let m_cyl = mass * cylinder_volume / total;
        let m_sph = mass * sphere_volume / total;

        let cyl_lateral = m_cyl * (3.0 * r2 + h * h) / 12.0;
        let cyl_axial = 0.5 * m_cyl * r2;
        // Hemispheres: sphere inertia plus parallel-axis shift to the cap centres.
        let sph_about_center = 0.4 * m_sph * r2;
        let shift = half_height + 3.0 / 8.0 * radius;
        let sph_lateral = sph_about_center + m_sph * shift * shift;

        Mat3::from_diagonal(Vec3::new(
            cyl_lateral + sph_lateral,
            cyl_axial + sph_about_center,
            cyl_lateral + sph_lateral,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn combine_modes_produce_expected_values() {
        assert_relative_eq!(CombineMode::Average.combine(0.6, 0.2), 0.4);
        assert_relative_eq!(CombineMode::Min.combine(0.6, 0.2), 0.2);
        assert_relative_eq!(CombineMode::Max.combine(0.6, 0.2), 0.6);
        assert_relative_eq!(
            CombineMode::GeometricMean.combine(0.6, 0.2),
            (0.6_f32 * 0.2).sqrt()
        );
    }

    #[test]
    fn non_default_combine_mode_wins() {
        let mut a = Material::default();
        a.friction = 0.8;
        a.friction_combine = CombineMode::Min;
        let mut b = Material::default();
        b.friction = 0.2;

        let pair = Material::combine_pair(&a, &b);
        assert_relative_eq!(pair.friction, 0.2);
    }

    #[test]
    fn transform_round_trips_points() {
        let t = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.7).normalize(),
        );
        let p = Vec3::new(-4.0, 0.5, 2.0);
        let back = t.point_to_local(t.point_to_world(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn inverse_composes_to_identity() {
        let t = Transform::new(Vec3::new(3.0, -1.0, 0.5), Quat::from_rotation_x(1.2));
        let id = t.combine(&t.inverse());
        assert!(id.position.length() < 1e-5);
        assert!(id.rotation.dot(Quat::IDENTITY).abs() > 1.0 - 1e-5);
    }
}

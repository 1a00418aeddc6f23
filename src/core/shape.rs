use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config,
    core::{
        aabb::Aabb,
        mesh::TriangleMesh,
        subshape::SubShapeId,
        types::{InertiaTensorExt, MassProperties, Transform},
    },
    error::{PhysicsError, PhysicsResult},
    utils::pool::{Arena, Handle},
};

/// Stable handle to a shape in the [`ShapeRegistry`].
pub type ShapeId = Handle;

/// One child of a compound shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundChild {
    pub shape: ShapeId,
    pub position: Vec3,
    pub rotation: Quat,
}

/// The closed set of shape variants.
///
/// Compound, scaled, and transformed shapes reference children by id; children
/// must already exist in the registry when the parent is added, so reference
/// cycles cannot be constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
        convex_radius: f32,
    },
    Capsule {
        half_height: f32,
        radius: f32,
    },
    Cylinder {
        half_height: f32,
        radius: f32,
        convex_radius: f32,
    },
    /// Half-space boundary `normal · p + constant = 0`, collidable on the
    /// `normal` side, bounded to a square patch for broadphase purposes.
    Plane {
        normal: Vec3,
        constant: f32,
        half_extent: f32,
    },
    ConvexHull {
        points: Vec<Vec3>,
        convex_radius: f32,
    },
    Mesh(TriangleMesh),
    Compound {
        children: Vec<CompoundChild>,
    },
    Scaled {
        child: ShapeId,
        scale: Vec3,
    },
    Transformed {
        child: ShapeId,
        position: Vec3,
        rotation: Quat,
    },
    Empty,
}

/// Fieldless discriminant of [`ShapeKind`], used to index dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShapeType {
    Sphere = 0,
    Box,
    Capsule,
    Cylinder,
    Plane,
    ConvexHull,
    Mesh,
    Compound,
    Scaled,
    Transformed,
    Empty,
}

impl ShapeType {
    pub const COUNT: usize = 11;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Shapes whose surface is a single convex solid.
    pub fn is_convex(self) -> bool {
        matches!(
            self,
            ShapeType::Sphere
                | ShapeType::Box
                | ShapeType::Capsule
                | ShapeType::Cylinder
                | ShapeType::ConvexHull
        )
    }

    /// Shapes that decompose into other shapes or triangles.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            ShapeType::Mesh | ShapeType::Compound | ShapeType::Scaled | ShapeType::Transformed
        )
    }
}

impl ShapeKind {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeKind::Sphere { .. } => ShapeType::Sphere,
            ShapeKind::Box { .. } => ShapeType::Box,
            ShapeKind::Capsule { .. } => ShapeType::Capsule,
            ShapeKind::Cylinder { .. } => ShapeType::Cylinder,
            ShapeKind::Plane { .. } => ShapeType::Plane,
            ShapeKind::ConvexHull { .. } => ShapeType::ConvexHull,
            ShapeKind::Mesh(_) => ShapeType::Mesh,
            ShapeKind::Compound { .. } => ShapeType::Compound,
            ShapeKind::Scaled { .. } => ShapeType::Scaled,
            ShapeKind::Transformed { .. } => ShapeType::Transformed,
            ShapeKind::Empty => ShapeType::Empty,
        }
    }
}

/// Immutable shape value with precomputed bounds and mass data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub local_aabb: Aabb,
    pub center_of_mass: Vec3,
    pub volume: f32,
    /// Radius of the largest sphere centred at the centre of mass that fits
    /// inside the shape. Drives the CCD activation threshold.
    pub inner_radius: f32,
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        self.kind.shape_type()
    }
}

/// Arena of immutable shapes shared across bodies.
#[derive(Default)]
pub struct ShapeRegistry {
    shapes: Arena<Shape>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Validates and caches a new shape, returning its handle.
    pub fn add(&mut self, kind: ShapeKind) -> PhysicsResult<ShapeId> {
        self.validate(&kind)?;
        let local_aabb = self.compute_local_aabb(&kind);
        let center_of_mass = self.compute_center_of_mass(&kind);
        let volume = self.compute_volume(&kind);
        let inner_radius = self.compute_inner_radius(&kind);
        Ok(self.shapes.insert(Shape {
            kind,
            local_aabb,
            center_of_mass,
            volume,
            inner_radius,
        }))
    }

    pub fn sphere(&mut self, radius: f32) -> PhysicsResult<ShapeId> {
        self.add(ShapeKind::Sphere { radius })
    }

    pub fn cuboid(&mut self, half_extents: Vec3) -> PhysicsResult<ShapeId> {
        self.add(ShapeKind::Box {
            half_extents,
            convex_radius: config::DEFAULT_CONVEX_RADIUS.min(half_extents.min_element() * 0.5),
        })
    }

    pub fn capsule(&mut self, half_height: f32, radius: f32) -> PhysicsResult<ShapeId> {
        self.add(ShapeKind::Capsule {
            half_height,
            radius,
        })
    }

    fn validate(&self, kind: &ShapeKind) -> PhysicsResult<()> {
        match kind {
            ShapeKind::Sphere { radius } if *radius <= 0.0 => {
                Err(PhysicsError::InvalidArgument("sphere radius must be > 0"))
            }
            ShapeKind::Box { half_extents, .. } if half_extents.min_element() <= 0.0 => Err(
                PhysicsError::InvalidArgument("box half extents must be > 0"),
            ),
            ShapeKind::Capsule {
                half_height,
                radius,
            } if *half_height < 0.0 || *radius <= 0.0 => Err(PhysicsError::InvalidArgument(
                "capsule needs radius > 0 and half height >= 0",
            )),
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } if *half_height <= 0.0 || *radius <= 0.0 => Err(PhysicsError::InvalidArgument(
                "cylinder needs radius > 0 and half height > 0",
            )),
            ShapeKind::Plane { normal, .. } if (normal.length() - 1.0).abs() > 1e-4 => {
                Err(PhysicsError::NotNormalised(normal.length()))
            }
            ShapeKind::ConvexHull { points, .. } if points.len() < 4 => Err(
                PhysicsError::InvalidArgument("convex hull needs at least 4 points"),
            ),
            ShapeKind::Compound { children } => {
                if children.is_empty() {
                    return Err(PhysicsError::InvalidArgument(
                        "compound needs at least one child",
                    ));
                }
                for child in children {
                    if self.shapes.get(child.shape).is_none() {
                        return Err(PhysicsError::UnknownShape(child.shape));
                    }
                }
                Ok(())
            }
            ShapeKind::Scaled { child, scale } => {
                if scale.abs().min_element() <= 1e-6 {
                    return Err(PhysicsError::InvalidArgument(
                        "scale components must be non-zero",
                    ));
                }
                self.shapes
                    .get(*child)
                    .map(|_| ())
                    .ok_or(PhysicsError::UnknownShape(*child))
            }
            ShapeKind::Transformed { child, .. } => self
                .shapes
                .get(*child)
                .map(|_| ())
                .ok_or(PhysicsError::UnknownShape(*child)),
            _ => Ok(()),
        }
    }

    fn compute_local_aabb(&self, kind: &ShapeKind) -> Aabb {
        match kind {
            ShapeKind::Sphere { radius } => {
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(*radius))
            }
            ShapeKind::Box { half_extents, .. } => {
                Aabb::from_center_half_extents(Vec3::ZERO, *half_extents)
            }
            ShapeKind::Capsule {
                half_height,
                radius,
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, half_height + radius, *radius),
            ),
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, *half_height, *radius),
            ),
            ShapeKind::Plane {
                normal,
                constant,
                half_extent,
            } => {
                let base = -*constant * *normal;
                let mut aabb = Aabb::from_center_half_extents(base, Vec3::splat(*half_extent));
                // Extend a little behind the surface so shallow penetration
                // still overlaps in the broadphase.
                aabb.grow(base - *normal * half_extent.min(1.0));
                aabb
            }
            ShapeKind::ConvexHull { points, .. } => {
                let mut aabb = Aabb::INVALID;
                for p in points {
                    aabb.grow(*p);
                }
                aabb
            }
            ShapeKind::Mesh(mesh) => mesh.bounds,
            ShapeKind::Compound { children } => {
                let mut aabb = Aabb::INVALID;
                for child in children {
                    if let Some(shape) = self.shapes.get(child.shape) {
                        aabb = aabb
                            .merge(&shape.local_aabb.transformed(child.position, child.rotation));
                    }
                }
                aabb
            }
            ShapeKind::Scaled { child, scale } => self
                .shapes
                .get(*child)
                .map(|s| s.local_aabb.scaled(*scale))
                .unwrap_or(Aabb::INVALID),
            ShapeKind::Transformed {
                child,
                position,
                rotation,
            } => self
                .shapes
                .get(*child)
                .map(|s| s.local_aabb.transformed(*position, *rotation))
                .unwrap_or(Aabb::INVALID),
            ShapeKind::Empty => Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ZERO),
        }
    }

    fn compute_center_of_mass(&self, kind: &ShapeKind) -> Vec3 {
        match kind {
            ShapeKind::ConvexHull { points, .. } => {
                points.iter().copied().sum::<Vec3>() / points.len().max(1) as f32
            }
            ShapeKind::Mesh(mesh) => mesh.bounds.center(),
            ShapeKind::Plane {
                normal, constant, ..
            } => -*constant * *normal,
            ShapeKind::Compound { children } => {
                let mut weighted = Vec3::ZERO;
                let mut total = 0.0;
                for child in children {
                    if let Some(shape) = self.shapes.get(child.shape) {
                        let w = shape.volume.max(1e-6);
                        weighted += w * (child.position + child.rotation * shape.center_of_mass);
                        total += w;
                    }
                }
                if total > 0.0 {
                    weighted / total
                } else {
                    Vec3::ZERO
                }
            }
            ShapeKind::Scaled { child, scale } => self
                .shapes
                .get(*child)
                .map(|s| s.center_of_mass * *scale)
                .unwrap_or(Vec3::ZERO),
            ShapeKind::Transformed {
                child,
                position,
                rotation,
            } => self
                .shapes
                .get(*child)
                .map(|s| *position + *rotation * s.center_of_mass)
                .unwrap_or(Vec3::ZERO),
            _ => Vec3::ZERO,
        }
    }

    fn compute_volume(&self, kind: &ShapeKind) -> f32 {
        match kind {
            ShapeKind::Sphere { radius } => 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3),
            ShapeKind::Box { half_extents, .. } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            ShapeKind::Capsule {
                half_height,
                radius,
            } => {
                let r2 = radius * radius;
                std::f32::consts::PI * r2 * (2.0 * half_height)
                    + 4.0 / 3.0 * std::f32::consts::PI * r2 * radius
            }
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } => std::f32::consts::PI * radius * radius * 2.0 * half_height,
            ShapeKind::ConvexHull { points, .. } => {
                // Hull faces are not cooked; bound the volume by the point cloud's box.
                let mut aabb = Aabb::INVALID;
                for p in points {
                    aabb.grow(*p);
                }
                let d = aabb.max - aabb.min;
                d.x * d.y * d.z
            }
            ShapeKind::Compound { children } => children
                .iter()
                .filter_map(|c| self.shapes.get(c.shape))
                .map(|s| s.volume)
                .sum(),
            ShapeKind::Scaled { child, scale } => self
                .shapes
                .get(*child)
                .map(|s| s.volume * (scale.x * scale.y * scale.z).abs())
                .unwrap_or(0.0),
            ShapeKind::Transformed { child, .. } => self
                .shapes
                .get(*child)
                .map(|s| s.volume)
                .unwrap_or(0.0),
            // Planes, meshes, and empty shapes enclose no volume.
            _ => 0.0,
        }
    }

    fn compute_inner_radius(&self, kind: &ShapeKind) -> f32 {
        match kind {
            ShapeKind::Sphere { radius } => *radius,
            ShapeKind::Box { half_extents, .. } => half_extents.min_element(),
            ShapeKind::Capsule { radius, .. } => *radius,
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } => radius.min(*half_height),
            ShapeKind::ConvexHull { points, .. } => {
                let com = points.iter().copied().sum::<Vec3>() / points.len().max(1) as f32;
                let mut aabb = Aabb::INVALID;
                for p in points {
                    aabb.grow(*p - com);
                }
                aabb.half_extents().min_element().max(0.0)
            }
            ShapeKind::Compound { children } => children
                .iter()
                .filter_map(|c| self.shapes.get(c.shape))
                .map(|s| s.inner_radius)
                .fold(f32::MAX, f32::min)
                .min(1e6),
            ShapeKind::Scaled { child, scale } => self
                .shapes
                .get(*child)
                .map(|s| s.inner_radius * scale.abs().min_element())
                .unwrap_or(0.0),
            ShapeKind::Transformed { child, .. } => self
                .shapes
                .get(*child)
                .map(|s| s.inner_radius)
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Mass and inertia about the centre of mass, in shape-local orientation.
    ///
    /// Degenerate geometry (no volume) yields [`MassProperties::ZERO`] and the
    /// body behaves as static per the failure semantics.
    pub fn mass_properties(&self, id: ShapeId, density: f32) -> MassProperties {
        let Some(shape) = self.shapes.get(id) else {
            return MassProperties::ZERO;
        };
        match &shape.kind {
            ShapeKind::Sphere { radius } => {
                let mass = density * shape.volume;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_sphere(*radius, mass),
                }
            }
            ShapeKind::Box { half_extents, .. } => {
                let mass = density * shape.volume;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_box(*half_extents, mass),
                }
            }
            ShapeKind::Capsule {
                half_height,
                radius,
            } => {
                let mass = density * shape.volume;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_capsule(*half_height, *radius, mass),
                }
            }
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } => {
                let mass = density * shape.volume;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_cylinder(*half_height, *radius, mass),
                }
            }
            ShapeKind::ConvexHull { .. } => {
                // Box approximation over the hull bounds, recentred on the COM.
                let mass = density * shape.volume;
                MassProperties {
                    mass,
                    inertia: Mat3::for_solid_box(shape.local_aabb.half_extents(), mass),
                }
            }
            ShapeKind::Compound { children } => {
                let com = shape.center_of_mass;
                let mut mass = 0.0;
                let mut inertia = Mat3::ZERO;
                for child in children {
                    let child_props = self.mass_properties(child.shape, density);
                    if child_props.mass <= 0.0 {
                        continue;
                    }
                    let child_shape = self.shapes.get(child.shape).expect("validated child");
                    let rot = Mat3::from_quat(child.rotation);
                    let rotated = rot * child_props.inertia * rot.transpose();
                    let offset =
                        child.position + child.rotation * child_shape.center_of_mass - com;
                    inertia += rotated + parallel_axis_term(child_props.mass, offset);
                    mass += child_props.mass;
                }
                MassProperties { mass, inertia }
            }
            ShapeKind::Scaled { child, scale } => {
                let inner = self.mass_properties(*child, density);
                let factor = (scale.x * scale.y * scale.z).abs();
                // Inertia scaling under non-uniform scale is approximated by
                // scaling the diagonal with the squared per-axis factors.
                let s2 = *scale * *scale;
                let diag = Vec3::new(
                    inner.inertia.x_axis.x * 0.5 * (s2.y + s2.z),
                    inner.inertia.y_axis.y * 0.5 * (s2.x + s2.z),
                    inner.inertia.z_axis.z * 0.5 * (s2.x + s2.y),
                );
                MassProperties {
                    mass: inner.mass * factor,
                    inertia: Mat3::from_diagonal(diag) * factor,
                }
            }
            ShapeKind::Transformed {
                child, rotation, ..
            } => {
                let inner = self.mass_properties(*child, density);
                let rot = Mat3::from_quat(*rotation);
                MassProperties {
                    mass: inner.mass,
                    inertia: rot * inner.inertia * rot.transpose(),
                }
            }
            // Plane, mesh, and empty shapes never contribute dynamic mass.
            _ => MassProperties::ZERO,
        }
    }

    /// Outward surface normal in shape-local space for a point on (or near)
    /// the sub-shape's surface.
    pub fn surface_normal(&self, id: ShapeId, sub_shape: SubShapeId, local_point: Vec3) -> Vec3 {
        let Some(shape) = self.shapes.get(id) else {
            return Vec3::Y;
        };
        match &shape.kind {
            ShapeKind::Sphere { .. } => local_point.normalize_or_zero(),
            ShapeKind::Box { half_extents, .. } => {
                let rel = local_point / half_extents.max(Vec3::splat(1e-6));
                let abs = rel.abs();
                if abs.x >= abs.y && abs.x >= abs.z {
                    Vec3::X * rel.x.signum()
                } else if abs.y >= abs.z {
                    Vec3::Y * rel.y.signum()
                } else {
                    Vec3::Z * rel.z.signum()
                }
            }
            ShapeKind::Capsule { half_height, .. } => {
                let clamped_y = local_point.y.clamp(-half_height, *half_height);
                (local_point - Vec3::new(0.0, clamped_y, 0.0)).normalize_or_zero()
            }
            ShapeKind::Cylinder {
                half_height,
                radius,
                ..
            } => {
                let radial = Vec3::new(local_point.x, 0.0, local_point.z);
                let radial_dist = radial.length();
                // Nearer to a cap than to the side wall -> cap normal.
                if (half_height - local_point.y.abs()) < (radius - radial_dist).abs() {
                    Vec3::Y * local_point.y.signum()
                } else {
                    radial.normalize_or_zero()
                }
            }
            ShapeKind::Plane { normal, .. } => *normal,
            ShapeKind::ConvexHull { points, .. } => {
                let com = shape.center_of_mass;
                // Hull faces are not cooked; fall back to the support direction
                // of the nearest vertex blended with the radial direction.
                let radial = (local_point - com).normalize_or_zero();
                if radial == Vec3::ZERO {
                    Vec3::Y
                } else {
                    let mut best = radial;
                    let mut best_dot = f32::MIN;
                    for p in points {
                        let d = (*p - com).normalize_or_zero();
                        let dot = d.dot(radial);
                        if dot > best_dot {
                            best_dot = dot;
                            best = d;
                        }
                    }
                    (0.5 * (best + radial)).normalize_or_zero()
                }
            }
            ShapeKind::Mesh(mesh) => {
                let (tri, _) = sub_shape.pop(mesh.triangle_count() as u32);
                if (tri as usize) < mesh.triangle_count() {
                    mesh.triangle_normal(tri as usize)
                } else {
                    Vec3::Y
                }
            }
            ShapeKind::Compound { children } => {
                let (index, rest) = sub_shape.pop(children.len() as u32);
                let Some(child) = children.get(index as usize) else {
                    return Vec3::Y;
                };
                let child_point = child.rotation.conjugate() * (local_point - child.position);
                child.rotation * self.surface_normal(child.shape, rest, child_point)
            }
            ShapeKind::Scaled { child, scale } => {
                let child_point = local_point / *scale;
                let n = self.surface_normal(*child, sub_shape, child_point);
                // Normals transform with the inverse-transpose scale.
                (n / *scale).normalize_or_zero()
            }
            ShapeKind::Transformed {
                child,
                position,
                rotation,
            } => {
                let child_point = rotation.conjugate() * (local_point - *position);
                *rotation * self.surface_normal(*child, sub_shape, child_point)
            }
            ShapeKind::Empty => Vec3::Y,
        }
    }

    /// Resolves the convex leaf addressed by `sub_shape`, returning its id,
    /// the leaf-relative transform of the body pose, and accumulated scale.
    pub fn resolve_leaf(
        &self,
        id: ShapeId,
        sub_shape: SubShapeId,
        transform: Transform,
        scale: Vec3,
    ) -> Option<(ShapeId, Transform, Vec3)> {
        let shape = self.shapes.get(id)?;
        match &shape.kind {
            ShapeKind::Compound { children } => {
                let (index, rest) = sub_shape.pop(children.len() as u32);
                let child = children.get(index as usize)?;
                let child_transform = transform.combine(&Transform::new(
                    child.position * scale,
                    child.rotation,
                ));
                self.resolve_leaf(child.shape, rest, child_transform, scale)
            }
            ShapeKind::Scaled {
                child,
                scale: child_scale,
            } => self.resolve_leaf(*child, sub_shape, transform, scale * *child_scale),
            ShapeKind::Transformed {
                child,
                position,
                rotation,
            } => {
                let child_transform =
                    transform.combine(&Transform::new(*position * scale, *rotation));
                self.resolve_leaf(*child, sub_shape, child_transform, scale)
            }
            _ => Some((id, transform, scale)),
        }
    }
}

fn parallel_axis_term(mass: f32, offset: Vec3) -> Mat3 {
    let d2 = offset.length_squared();
    let outer = Mat3::from_cols(
        offset * offset.x,
        offset * offset.y,
        offset * offset.z,
    );
    (Mat3::IDENTITY * d2 - outer) * mass
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_mass_matches_analytic_volume() {
        let mut registry = ShapeRegistry::new();
        let id = registry.sphere(2.0).unwrap();
        let props = registry.mass_properties(id, 1.0);
        assert_relative_eq!(
            props.mass,
            4.0 / 3.0 * std::f32::consts::PI * 8.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn compound_children_must_exist() {
        let mut registry = ShapeRegistry::new();
        let err = registry.add(ShapeKind::Compound {
            children: vec![CompoundChild {
                shape: ShapeId::default(),
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
            }],
        });
        assert!(matches!(err, Err(PhysicsError::UnknownShape(_))));
    }

    #[test]
    fn compound_aabb_covers_offset_children() {
        let mut registry = ShapeRegistry::new();
        let ball = registry.sphere(1.0).unwrap();
        let id = registry
            .add(ShapeKind::Compound {
                children: vec![
                    CompoundChild {
                        shape: ball,
                        position: Vec3::new(-3.0, 0.0, 0.0),
                        rotation: Quat::IDENTITY,
                    },
                    CompoundChild {
                        shape: ball,
                        position: Vec3::new(3.0, 0.0, 0.0),
                        rotation: Quat::IDENTITY,
                    },
                ],
            })
            .unwrap();

        let aabb = registry.get(id).unwrap().local_aabb;
        assert_relative_eq!(aabb.min.x, -4.0);
        assert_relative_eq!(aabb.max.x, 4.0);
    }

    #[test]
    fn box_surface_normal_picks_dominant_face() {
        let mut registry = ShapeRegistry::new();
        let id = registry.cuboid(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let n = registry.surface_normal(id, SubShapeId::ROOT, Vec3::new(0.99, 0.5, -1.0));
        assert_eq!(n, Vec3::X);
    }

    #[test]
    fn degenerate_shapes_have_zero_mass() {
        let mut registry = ShapeRegistry::new();
        let plane = registry
            .add(ShapeKind::Plane {
                normal: Vec3::Y,
                constant: 0.0,
                half_extent: 100.0,
            })
            .unwrap();
        let props = registry.mass_properties(plane, 1.0);
        assert_eq!(props.mass, 0.0);
    }

    #[test]
    fn zero_timestep_shapes_report_inner_radius() {
        let mut registry = ShapeRegistry::new();
        let capsule = registry.capsule(1.0, 0.4).unwrap();
        assert_relative_eq!(registry.get(capsule).unwrap().inner_radius, 0.4);
    }
}

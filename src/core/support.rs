use glam::{Mat3, Quat, Vec3};

use crate::{config, core::shape::ShapeKind};

/// How a convex support treats its convex radius.
///
/// `ExcludeRadius` shrinks the geometry to a strict interior core and reports
/// the excluded amount separately, which lets GJK measure distances between
/// smooth surfaces without sampling them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportMode {
    IncludeRadius,
    ExcludeRadius,
    Default,
}

/// Farthest-point query in world space.
pub trait Support {
    /// Farthest point of the core geometry along `direction` (need not be
    /// normalised; zero direction yields an arbitrary surface point).
    fn support(&self, direction: Vec3) -> Vec3;

    /// Radius excluded from the reported points; the true surface lies this
    /// far outward along the query direction.
    fn convex_radius(&self) -> f32;
}

/// Local-space core geometry of a convex shape.
#[derive(Debug, Clone, Copy)]
pub enum LocalSupport<'a> {
    Point(Vec3),
    Segment(Vec3, Vec3),
    Box(Vec3),
    Cylinder { half_height: f32, radius: f32 },
    Points(&'a [Vec3]),
}

impl LocalSupport<'_> {
    pub fn support(&self, dir: Vec3) -> Vec3 {
        match self {
            LocalSupport::Point(p) => *p,
            LocalSupport::Segment(a, b) => {
                if dir.dot(*b - *a) >= 0.0 {
                    *b
                } else {
                    *a
                }
            }
            LocalSupport::Box(half_extents) => Vec3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            ),
            LocalSupport::Cylinder {
                half_height,
                radius,
            } => {
                let lateral = Vec3::new(dir.x, 0.0, dir.z);
                let radial = lateral.normalize_or_zero() * *radius;
                radial + Vec3::new(0.0, half_height.copysign(dir.y), 0.0)
            }
            LocalSupport::Points(points) => {
                let mut best = points.first().copied().unwrap_or(Vec3::ZERO);
                let mut best_dot = f32::MIN;
                for p in points.iter() {
                    let dot = p.dot(dir);
                    if dot > best_dot {
                        best_dot = dot;
                        best = *p;
                    }
                }
                best
            }
        }
    }
}

/// Convex support with its radius bookkeeping resolved for a given mode.
#[derive(Debug, Clone, Copy)]
pub struct ConvexSupport<'a> {
    pub core: LocalSupport<'a>,
    /// Radius baked into the reported points.
    applied_radius: f32,
    /// Radius excluded from the reported points.
    excluded_radius: f32,
}

impl<'a> ConvexSupport<'a> {
    /// Builds the support for a convex shape variant; `None` for non-convex
    /// variants (plane, mesh, compound, decorators, empty).
    pub fn new(kind: &'a ShapeKind, mode: SupportMode) -> Option<Self> {
        match kind {
            ShapeKind::Sphere { radius } => Some(match mode {
                SupportMode::IncludeRadius => Self {
                    core: LocalSupport::Point(Vec3::ZERO),
                    applied_radius: *radius,
                    excluded_radius: 0.0,
                },
                _ => Self {
                    core: LocalSupport::Point(Vec3::ZERO),
                    applied_radius: 0.0,
                    excluded_radius: *radius,
                },
            }),
            ShapeKind::Capsule {
                half_height,
                radius,
            } => {
                let core = LocalSupport::Segment(
                    Vec3::new(0.0, -half_height, 0.0),
                    Vec3::new(0.0, *half_height, 0.0),
                );
                Some(match mode {
                    SupportMode::IncludeRadius => Self {
                        core,
                        applied_radius: *radius,
                        excluded_radius: 0.0,
                    },
                    _ => Self {
                        core,
                        applied_radius: 0.0,
                        excluded_radius: *radius,
                    },
                })
            }
            ShapeKind::Box {
                half_extents,
                convex_radius,
            } => Some(match mode {
                SupportMode::ExcludeRadius => {
                    // The shrink is clamped to the engine default radius so the
                    // remaining core can never collapse to a degenerate slab.
                    let shrink = convex_radius
                        .min(config::DEFAULT_CONVEX_RADIUS)
                        .min(half_extents.min_element() * 0.5);
                    Self {
                        core: LocalSupport::Box(*half_extents - Vec3::splat(shrink)),
                        applied_radius: 0.0,
                        excluded_radius: shrink,
                    }
                }
                _ => Self {
                    core: LocalSupport::Box(*half_extents),
                    applied_radius: 0.0,
                    excluded_radius: 0.0,
                },
            }),
            ShapeKind::Cylinder {
                half_height,
                radius,
                convex_radius,
            } => Some(match mode {
                SupportMode::ExcludeRadius => {
                    let shrink = convex_radius
                        .min(half_height * 0.5)
                        .min(radius * 0.5);
                    Self {
                        core: LocalSupport::Cylinder {
                            half_height: half_height - shrink,
                            radius: radius - shrink,
                        },
                        applied_radius: 0.0,
                        excluded_radius: shrink,
                    }
                }
                _ => Self {
                    core: LocalSupport::Cylinder {
                        half_height: *half_height,
                        radius: *radius,
                    },
                    applied_radius: 0.0,
                    excluded_radius: 0.0,
                },
            }),
            // Hull points are not shrinkable without cooked faces; the radius
            // stays zero in every mode.
            ShapeKind::ConvexHull { points, .. } => Some(Self {
                core: LocalSupport::Points(points),
                applied_radius: 0.0,
                excluded_radius: 0.0,
            }),
            _ => None,
        }
    }

    pub fn local_support(&self, dir: Vec3) -> Vec3 {
        let p = self.core.support(dir);
        if self.applied_radius > 0.0 {
            p + self.applied_radius * dir.normalize_or_zero()
        } else {
            p
        }
    }

    pub fn excluded_radius(&self) -> f32 {
        self.excluded_radius
    }
}

/// Universal adapter placing a convex support in world space with an optional
/// non-uniform scale applied in the shape's local frame.
///
/// Rotations go through a 3×3 matrix so the inverse rotation of the query
/// direction is a cheap transpose-multiply.
#[derive(Debug, Clone, Copy)]
pub struct TransformedSupport<'a> {
    rotation: Mat3,
    translation: Vec3,
    scale: Vec3,
    radius_scale: f32,
    inner: ConvexSupport<'a>,
}

impl<'a> TransformedSupport<'a> {
    pub fn new(inner: ConvexSupport<'a>, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            rotation: Mat3::from_quat(rotation),
            translation: position,
            scale,
            radius_scale: scale.abs().min_element(),
            inner,
        }
    }
}

impl Support for TransformedSupport<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        let local_dir = self.rotation.transpose() * direction;
        // Support of a scaled convex body: scale the direction into the
        // unscaled frame, query the core, then scale the point back out. Any
        // applied radius is re-added against the scaled surface.
        let core = self.inner.core.support(local_dir * self.scale) * self.scale;
        let with_radius = core
            + self.inner.applied_radius * self.radius_scale * local_dir.normalize_or_zero();
        self.rotation * with_radius + self.translation
    }

    fn convex_radius(&self) -> f32 {
        self.inner.excluded_radius * self.radius_scale
    }
}

/// Adapter re-adding a convex radius to a wrapped support, pairing with
/// exclude-mode cores when inclusive geometry is required.
#[derive(Debug, Clone, Copy)]
pub struct AddRadiusSupport<S> {
    inner: S,
    radius: f32,
}

impl<S: Support> AddRadiusSupport<S> {
    pub fn new(inner: S, radius: f32) -> Self {
        Self { inner, radius }
    }
}

impl<S: Support> Support for AddRadiusSupport<S> {
    fn support(&self, direction: Vec3) -> Vec3 {
        self.inner.support(direction) + self.radius * direction.normalize_or_zero()
    }

    fn convex_radius(&self) -> f32 {
        (self.inner.convex_radius() - self.radius).max(0.0)
    }
}

/// Support over an explicit world-space point set: clipped faces, triangles.
#[derive(Debug, Clone, Copy)]
pub struct PolygonSupport<'a> {
    points: &'a [Vec3],
}

impl<'a> PolygonSupport<'a> {
    pub fn new(points: &'a [Vec3]) -> Self {
        Self { points }
    }
}

impl Support for PolygonSupport<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        LocalSupport::Points(self.points).support(direction)
    }

    fn convex_radius(&self) -> f32 {
        0.0
    }
}

/// Number of segments used to approximate a cylinder cap face.
const CAP_SEGMENTS: usize = 12;

/// Face of the shape most facing `local_dir` (shape-local space, scaled by
/// `scale`), for use as a clipping polygon. Shapes that contact through a
/// single point (spheres, capsule caps) return an empty face.
pub fn supporting_face(kind: &ShapeKind, local_dir: Vec3, scale: Vec3) -> Vec<Vec3> {
    let dir = (local_dir * scale).normalize_or_zero();
    if dir == Vec3::ZERO {
        return Vec::new();
    }
    match kind {
        ShapeKind::Box { half_extents, .. } => {
            let he = *half_extents * scale;
            let abs = dir.abs();
            let (axis, u_axis, v_axis) = if abs.x >= abs.y && abs.x >= abs.z {
                (0, 1, 2)
            } else if abs.y >= abs.z {
                (1, 0, 2)
            } else {
                (2, 0, 1)
            };
            let sign = dir[axis].signum();
            let mut center = Vec3::ZERO;
            center[axis] = he[axis] * sign;
            let mut u = Vec3::ZERO;
            u[u_axis] = he[u_axis];
            let mut v = Vec3::ZERO;
            v[v_axis] = he[v_axis];
            vec![
                center + u + v,
                center - u + v,
                center - u - v,
                center + u - v,
            ]
        }
        ShapeKind::Capsule {
            half_height,
            radius,
        } => {
            if dir.y.abs() > 0.9 {
                return Vec::new();
            }
            let radial = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero();
            let r = radius * scale.abs().min_element();
            let h = half_height * scale.y.abs();
            vec![
                Vec3::new(0.0, -h, 0.0) + radial * r,
                Vec3::new(0.0, h, 0.0) + radial * r,
            ]
        }
        ShapeKind::Cylinder {
            half_height,
            radius,
            ..
        } => {
            let r = radius * scale.x.abs().max(scale.z.abs());
            let h = half_height * scale.y.abs();
            if dir.y.abs() > 0.7 {
                let y = h.copysign(dir.y);
                (0..CAP_SEGMENTS)
                    .map(|i| {
                        let angle = i as f32 / CAP_SEGMENTS as f32 * std::f32::consts::TAU;
                        Vec3::new(r * angle.cos(), y, r * angle.sin())
                    })
                    .collect()
            } else {
                let radial = Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero() * r;
                vec![radial + Vec3::new(0.0, -h, 0.0), radial + Vec3::new(0.0, h, 0.0)]
            }
        }
        ShapeKind::ConvexHull { points, .. } => {
            let mut max_dot = f32::MIN;
            for p in points {
                max_dot = max_dot.max((*p * scale).dot(dir));
            }
            let tolerance = 1e-3 * max_dot.abs().max(1.0);
            let mut face: Vec<Vec3> = points
                .iter()
                .map(|p| *p * scale)
                .filter(|p| p.dot(dir) > max_dot - tolerance)
                .collect();
            if face.len() > 2 {
                sort_polygon_winding(&mut face, dir);
            }
            face
        }
        ShapeKind::Plane {
            normal,
            constant,
            half_extent,
        } => {
            let base = -*constant * *normal;
            let (u, v) = normal.any_orthonormal_pair();
            let e = *half_extent;
            vec![
                base + u * e + v * e,
                base - u * e + v * e,
                base - u * e - v * e,
                base + u * e - v * e,
            ]
        }
        _ => Vec::new(),
    }
}

/// Orders coplanar points counter-clockwise around `axis` about their centroid.
fn sort_polygon_winding(points: &mut [Vec3], axis: Vec3) {
    let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    let (u, v) = axis.any_orthonormal_pair();
    points.sort_by(|a, b| {
        let pa = *a - centroid;
        let pb = *b - centroid;
        let angle_a = pa.dot(v).atan2(pa.dot(u));
        let angle_b = pb.dot(v).atan2(pb.dot(u));
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_exclude_mode_reports_radius_separately() {
        let kind = ShapeKind::Sphere { radius: 2.0 };
        let support = ConvexSupport::new(&kind, SupportMode::ExcludeRadius).unwrap();
        assert_eq!(support.local_support(Vec3::X), Vec3::ZERO);
        assert_relative_eq!(support.excluded_radius(), 2.0);

        let inclusive = ConvexSupport::new(&kind, SupportMode::IncludeRadius).unwrap();
        assert_relative_eq!(inclusive.local_support(Vec3::X).x, 2.0);
        assert_relative_eq!(inclusive.excluded_radius(), 0.0);
    }

    #[test]
    fn box_exclude_shrink_clamps_to_default_radius() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::splat(1.0),
            convex_radius: 10.0,
        };
        let support = ConvexSupport::new(&kind, SupportMode::ExcludeRadius).unwrap();
        assert_relative_eq!(support.excluded_radius(), config::DEFAULT_CONVEX_RADIUS);
        let p = support.local_support(Vec3::ONE);
        assert_relative_eq!(p.x, 1.0 - config::DEFAULT_CONVEX_RADIUS);
    }

    #[test]
    fn transformed_support_rotates_and_translates() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::new(2.0, 1.0, 1.0),
            convex_radius: 0.0,
        };
        let inner = ConvexSupport::new(&kind, SupportMode::IncludeRadius).unwrap();
        let support = TransformedSupport::new(
            inner,
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        );
        // The long axis now points along +Y; zero-direction components may
        // pick either corner of the top face.
        let top = support.support(Vec3::Y);
        assert_relative_eq!(top.y, 2.0, epsilon = 1e-5);
        assert!((top.x - 10.0).abs() <= 1.0 + 1e-5);
    }

    #[test]
    fn scaled_support_scales_the_surface() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::ONE,
            convex_radius: 0.0,
        };
        let inner = ConvexSupport::new(&kind, SupportMode::IncludeRadius).unwrap();
        let support = TransformedSupport::new(
            inner,
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::new(3.0, 1.0, 1.0),
        );
        assert_relative_eq!(support.support(Vec3::X).x, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn box_supporting_face_has_four_corners() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
            convex_radius: 0.0,
        };
        let face = supporting_face(&kind, Vec3::Y, Vec3::ONE);
        assert_eq!(face.len(), 4);
        for p in &face {
            assert_relative_eq!(p.y, 2.0);
        }
    }

    #[test]
    fn sphere_has_no_supporting_face() {
        let kind = ShapeKind::Sphere { radius: 1.0 };
        assert!(supporting_face(&kind, Vec3::Y, Vec3::ONE).is_empty());
    }
}

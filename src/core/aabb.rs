use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Aabb {
    /// Empty box; merging anything into it yields that thing.
    pub const INVALID: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn half_extents(&self) -> Vec3 {
        0.5 * (self.max - self.min)
    }

    pub fn surface_area(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Union of this box and itself translated by `delta` (swept bounds).
    pub fn swept(&self, delta: Vec3) -> Aabb {
        Aabb {
            min: self.min + delta.min(Vec3::ZERO),
            max: self.max + delta.max(Vec3::ZERO),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Slab test returning the entry parameter along `origin + t * dir`,
    /// restricted to `[0, t_max]`.
    pub fn ray_hit(&self, origin: Vec3, dir: Vec3, t_max: f32) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_far = t_max;

        for i in 0..3 {
            if dir[i].abs() < 1e-8 {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
            } else {
                let inv = 1.0 / dir[i];
                let mut t1 = (self.min[i] - origin[i]) * inv;
                let mut t2 = (self.max[i] - origin[i]) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_far = t_far.min(t2);
                if t_min > t_far {
                    return None;
                }
            }
        }

        Some(t_min)
    }

    /// Bounds of this box after a rigid transform.
    pub fn transformed(&self, position: Vec3, rotation: Quat) -> Aabb {
        if !self.is_valid() {
            return *self;
        }
        let center = rotation * self.center() + position;
        let he = self.half_extents();
        // Extent of a rotated box along each world axis.
        let m = glam::Mat3::from_quat(rotation);
        let world_he = Vec3::new(
            m.x_axis.x.abs() * he.x + m.y_axis.x.abs() * he.y + m.z_axis.x.abs() * he.z,
            m.x_axis.y.abs() * he.x + m.y_axis.y.abs() * he.y + m.z_axis.y.abs() * he.z,
            m.x_axis.z.abs() * he.x + m.y_axis.z.abs() * he.y + m.z_axis.z.abs() * he.z,
        );
        Aabb::from_center_half_extents(center, world_he)
    }

    /// Bounds of this box under a non-uniform scale applied in local space.
    pub fn scaled(&self, scale: Vec3) -> Aabb {
        let a = self.min * scale;
        let b = self.max * scale;
        Aabb {
            min: a.min(b),
            max: a.max(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_and_overlap() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        assert!(a.overlaps(&b));
        let m = a.merge(&b);
        assert_eq!(m.min, Vec3::ZERO);
        assert_eq!(m.max, Vec3::splat(2.0));
    }

    #[test]
    fn ray_hits_box_from_outside() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = b.ray_hit(Vec3::new(-5.0, 0.0, 0.0), Vec3::X, 100.0).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!(b.ray_hit(Vec3::new(-5.0, 2.0, 0.0), Vec3::X, 100.0).is_none());
    }

    #[test]
    fn swept_covers_both_ends() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let s = b.swept(Vec3::new(3.0, -2.0, 0.0));
        assert_eq!(s.min, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(s.max, Vec3::new(4.0, 1.0, 1.0));
    }
}

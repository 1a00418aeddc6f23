use glam::Vec3;

use crate::{config, core::subshape::SubShapeId};

/// Geometric result of one sub-shape pair at one time step.
///
/// Contact points are stored for both surfaces relative to `base_offset`
/// (shape A's world position) so large world coordinates do not eat the
/// mantissa. The normal points from A to B.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub base_offset: Vec3,
    pub normal: Vec3,
    /// Deepest penetration over all points; negative for speculative contacts.
    pub penetration: f32,
    pub sub_shape_a: SubShapeId,
    pub sub_shape_b: SubShapeId,
    pub points_a: Vec<Vec3>,
    pub points_b: Vec<Vec3>,
}

impl ContactManifold {
    pub fn point_count(&self) -> usize {
        self.points_a.len()
    }

    pub fn world_point_a(&self, index: usize) -> Vec3 {
        self.base_offset + self.points_a[index]
    }

    pub fn world_point_b(&self, index: usize) -> Vec3 {
        self.base_offset + self.points_b[index]
    }

    /// Gap along the normal for one point; negative when penetrating.
    pub fn separation(&self, index: usize) -> f32 {
        (self.points_b[index] - self.points_a[index]).dot(self.normal)
    }

    /// Swaps the roles of A and B in place.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        std::mem::swap(&mut self.points_a, &mut self.points_b);
        std::mem::swap(&mut self.sub_shape_a, &mut self.sub_shape_b);
    }

    /// Reduces the manifold to at most [`config::MAX_MANIFOLD_POINTS`] points.
    pub fn reduce(&mut self) {
        let kept = reduce_points(&self.points_a, &self.points_b, self.normal);
        if let Some(order) = kept {
            self.points_a = order.iter().map(|&i| self.points_a[i]).collect();
            self.points_b = order.iter().map(|&i| self.points_b[i]).collect();
        }
    }
}

/// Deterministic greedy selection of up to four points maximising coverage of
/// the contact plane weighted by penetration depth.
///
/// Returns `None` when the input already fits (pruning a manifold with four
/// or fewer points is a no-op); otherwise the indices to keep, ordered
/// `[p1, p3, p2, p4]` so the quad winds consistently.
fn reduce_points(points_a: &[Vec3], points_b: &[Vec3], normal: Vec3) -> Option<Vec<usize>> {
    let n = points_a.len();
    if n <= config::MAX_MANIFOLD_POINTS {
        return None;
    }

    let depth = |i: usize| -> f32 {
        let d = -(points_b[i] - points_a[i]).dot(normal);
        // Speculative points still deserve a small weight.
        d.max(1e-3)
    };
    let in_plane = |v: Vec3| v - normal * v.dot(normal);

    let centroid = points_a.iter().copied().sum::<Vec3>() / n as f32;

    // Point 1: farthest from the centroid in the contact plane, weighted by
    // squared depth.
    let score1 = |i: usize| {
        let d = in_plane(points_a[i] - centroid).length_squared();
        d.max(1e-6) * depth(i) * depth(i)
    };
    let p1 = select_max(n, &[], score1);

    // Point 2: same metric relative to point 1.
    let score2 = |i: usize| {
        let d = in_plane(points_a[i] - points_a[p1]).length_squared();
        d * depth(i) * depth(i)
    };
    let p2 = select_max(n, &[p1], score2);

    // Points 3 and 4: farthest on either side of the 1-2 edge.
    let edge = in_plane(points_a[p2] - points_a[p1]);
    let perp = normal.cross(edge);
    let side = |i: usize| in_plane(points_a[i] - points_a[p1]).dot(perp);

    let p3 = select_max(n, &[p1, p2], |i| side(i).max(0.0));
    let p4 = select_max(n, &[p1, p2, p3], |i| (-side(i)).max(0.0));

    let mut kept = vec![p1, p3, p2, p4];
    kept.dedup();
    Some(kept)
}

// Index with the highest score, skipping `taken`; ties resolve to the lowest
// index so the choice is order independent.
fn select_max(n: usize, taken: &[usize], score: impl Fn(usize) -> f32) -> usize {
    let mut best = usize::MAX;
    let mut best_score = f32::MIN;
    for i in 0..n {
        if taken.contains(&i) {
            continue;
        }
        let s = score(i);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

/// Accumulates the manifolds of one body pair across sub-shape hits.
///
/// Hits whose normals agree within the configured tolerance merge into one
/// manifold; otherwise a new manifold starts. When the buffer is full the
/// shallowest manifold is replaced only by a deeper hit.
pub struct ManifoldAccumulator {
    pub base_offset: Vec3,
    normal_cos_max: f32,
    max_contact_distance: f32,
    manifolds: Vec<ContactManifold>,
}

impl ManifoldAccumulator {
    pub fn new(base_offset: Vec3, normal_cos_max: f32, max_contact_distance: f32) -> Self {
        Self {
            base_offset,
            normal_cos_max,
            max_contact_distance,
            manifolds: Vec::new(),
        }
    }

    pub fn max_contact_distance(&self) -> f32 {
        self.max_contact_distance
    }

    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    /// Adds one narrowphase hit. Points are world-space pairs on surface A/B.
    pub fn add_hit(
        &mut self,
        normal: Vec3,
        penetration: f32,
        sub_shape_a: SubShapeId,
        sub_shape_b: SubShapeId,
        points: impl Iterator<Item = (Vec3, Vec3)>,
    ) {
        let mut points_a = Vec::new();
        let mut points_b = Vec::new();
        for (pa, pb) in points {
            if points_a.len() >= config::MAX_RAW_CONTACT_POINTS {
                break;
            }
            points_a.push(pa - self.base_offset);
            points_b.push(pb - self.base_offset);
        }
        if points_a.is_empty() {
            return;
        }

        // Merge into an existing manifold when the normals agree; the merged
        // manifold keeps the sub-shape ids of its first hit.
        for manifold in &mut self.manifolds {
            if manifold.normal.dot(normal) >= self.normal_cos_max {
                manifold.normal = (manifold.normal + normal).normalize_or_zero();
                manifold.penetration = manifold.penetration.max(penetration);
                for (pa, pb) in points_a.into_iter().zip(points_b) {
                    if manifold.points_a.len() < config::MAX_RAW_CONTACT_POINTS {
                        manifold.points_a.push(pa);
                        manifold.points_b.push(pb);
                    }
                }
                return;
            }
        }

        let manifold = ContactManifold {
            base_offset: self.base_offset,
            normal,
            penetration,
            sub_shape_a,
            sub_shape_b,
            points_a,
            points_b,
        };

        if self.manifolds.len() < config::MAX_MANIFOLDS_PER_PAIR {
            self.manifolds.push(manifold);
            return;
        }

        // Full: replace the shallowest entry if the new hit is deeper.
        let (shallowest, depth) = self
            .manifolds
            .iter()
            .enumerate()
            .map(|(i, m)| (i, m.penetration))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .expect("buffer is non-empty");
        if manifold.penetration > depth {
            self.manifolds[shallowest] = manifold;
        }
    }

    /// Runs final per-manifold pruning and returns the manifolds.
    pub fn finalize(mut self, reduce: bool) -> Vec<ContactManifold> {
        for manifold in &mut self.manifolds {
            if reduce {
                manifold.reduce();
            }
        }
        self.manifolds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold_from_grid(count: usize) -> ContactManifold {
        let mut points_a = Vec::new();
        let mut points_b = Vec::new();
        for i in 0..count {
            let x = (i % 8) as f32;
            let z = (i / 8) as f32;
            points_a.push(Vec3::new(x, 0.0, z));
            points_b.push(Vec3::new(x, -0.01 - 0.001 * x, z));
        }
        ContactManifold {
            base_offset: Vec3::ZERO,
            normal: Vec3::Y,
            penetration: 0.01,
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            points_a,
            points_b,
        }
    }

    #[test]
    fn pruning_small_manifolds_is_a_no_op() {
        for count in 1..=4 {
            let mut manifold = manifold_from_grid(count);
            let before = manifold.points_a.clone();
            manifold.reduce();
            assert_eq!(manifold.points_a, before);
        }
    }

    #[test]
    fn reduction_keeps_at_most_four_spread_points() {
        let mut manifold = manifold_from_grid(40);
        manifold.reduce();
        assert!(manifold.point_count() >= 3 && manifold.point_count() <= 4);

        // The kept points should span most of the original footprint.
        let min_x = manifold.points_a.iter().map(|p| p.x).fold(f32::MAX, f32::min);
        let max_x = manifold.points_a.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert!(max_x - min_x >= 5.0);
    }

    #[test]
    fn reduction_is_deterministic() {
        let mut a = manifold_from_grid(64);
        let mut b = manifold_from_grid(64);
        a.reduce();
        b.reduce();
        assert_eq!(a.points_a, b.points_a);
    }

    #[test]
    fn separation_is_negative_when_penetrating() {
        let manifold = ContactManifold {
            base_offset: Vec3::ZERO,
            normal: Vec3::Y,
            penetration: 0.1,
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            points_a: vec![Vec3::new(0.0, 0.0, 0.0)],
            points_b: vec![Vec3::new(0.0, -0.1, 0.0)],
        };
        assert!(manifold.separation(0) < 0.0);
    }

    #[test]
    fn hits_with_agreeing_normals_merge() {
        let mut acc = ManifoldAccumulator::new(Vec3::ZERO, 0.999, 0.05);
        let near_y = Vec3::new(0.0, 1.0, 1.0e-3).normalize();
        acc.add_hit(
            Vec3::Y,
            0.01,
            SubShapeId::ROOT,
            SubShapeId::ROOT,
            std::iter::once((Vec3::ZERO, Vec3::ZERO)),
        );
        acc.add_hit(
            near_y,
            0.02,
            SubShapeId::ROOT,
            SubShapeId::ROOT,
            std::iter::once((Vec3::X, Vec3::X)),
        );
        let manifolds = acc.finalize(true);
        assert_eq!(manifolds.len(), 1);
        assert_eq!(manifolds[0].point_count(), 2);
        assert!((manifolds[0].penetration - 0.02).abs() < 1e-6);
    }

    #[test]
    fn divergent_normals_stay_separate() {
        let mut acc = ManifoldAccumulator::new(Vec3::ZERO, 0.999, 0.05);
        acc.add_hit(
            Vec3::Y,
            0.01,
            SubShapeId::ROOT,
            SubShapeId::ROOT,
            std::iter::once((Vec3::ZERO, Vec3::ZERO)),
        );
        acc.add_hit(
            Vec3::X,
            0.01,
            SubShapeId::ROOT,
            SubShapeId::ROOT,
            std::iter::once((Vec3::ZERO, Vec3::ZERO)),
        );
        assert_eq!(acc.finalize(true).len(), 2);
    }
}

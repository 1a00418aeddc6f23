use std::collections::HashSet;

use glam::Vec3;

use crate::core::subshape::SubShapeId;

/// One triangle hit awaiting internal-edge filtering.
#[derive(Debug, Clone)]
pub struct EdgeHit {
    pub normal: Vec3,
    pub penetration: f32,
    /// World-space point pairs (on mesh, on convex).
    pub points: Vec<(Vec3, Vec3)>,
    pub sub_shape_a: SubShapeId,
    pub sub_shape_b: SubShapeId,
    pub face_normal: Vec3,
    pub face_vertices: [Vec3; 3],
}

const KEY_SCALE: f32 = 1.0e4;

fn vertex_key(v: Vec3) -> (i64, i64, i64) {
    (
        (v.x * KEY_SCALE).round() as i64,
        (v.y * KEY_SCALE).round() as i64,
        (v.z * KEY_SCALE).round() as i64,
    )
}

/// Removes ghost contacts on internal edges of a triangle surface.
///
/// Face hits (contact normal within `face_cos` of the triangle normal) pass
/// through immediately and void their triangle's vertices. The remaining edge
/// and vertex hits are replayed deepest first; each is forwarded only when its
/// closest feature on the triangle has not been voided by an accepted hit.
pub fn filter_internal_edges(hits: Vec<EdgeHit>, face_cos: f32) -> Vec<EdgeHit> {
    let mut voided: HashSet<(i64, i64, i64)> = HashSet::new();
    let mut accepted = Vec::with_capacity(hits.len());
    let mut buffered = Vec::new();

    for hit in hits {
        if hit.normal.dot(hit.face_normal).abs() >= face_cos {
            for v in hit.face_vertices {
                voided.insert(vertex_key(v));
            }
            accepted.push(hit);
        } else {
            buffered.push(hit);
        }
    }

    buffered.sort_by(|a, b| {
        b.penetration
            .partial_cmp(&a.penetration)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for hit in buffered {
        let Some(contact) = deepest_point(&hit) else {
            continue;
        };
        let feature = closest_feature(&hit.face_vertices, contact);
        let is_voided = feature.iter().all(|v| voided.contains(&vertex_key(*v)));
        if is_voided {
            continue;
        }
        for v in feature {
            voided.insert(vertex_key(v));
        }
        accepted.push(hit);
    }

    accepted
}

fn deepest_point(hit: &EdgeHit) -> Option<Vec3> {
    hit.points
        .iter()
        .map(|(pa, pb)| (*pa, (*pb - *pa).dot(hit.normal)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(p, _)| p)
}

// Closest vertex or edge of the triangle to `point`: one vertex when a corner
// region wins, two when an edge does.
fn closest_feature(triangle: &[Vec3; 3], point: Vec3) -> Vec<Vec3> {
    let mut best_vertex = 0;
    let mut best_vertex_dist = f32::MAX;
    for (i, v) in triangle.iter().enumerate() {
        let d = (*v - point).length_squared();
        if d < best_vertex_dist {
            best_vertex_dist = d;
            best_vertex = i;
        }
    }

    let mut best_edge = 0;
    let mut best_edge_dist = f32::MAX;
    let mut best_edge_t = 0.0;
    for i in 0..3 {
        let a = triangle[i];
        let b = triangle[(i + 1) % 3];
        let ab = b - a;
        let denom = ab.length_squared();
        if denom < 1e-12 {
            continue;
        }
        let t = ((point - a).dot(ab) / denom).clamp(0.0, 1.0);
        let d = (a + ab * t - point).length_squared();
        if d < best_edge_dist {
            best_edge_dist = d;
            best_edge = i;
            best_edge_t = t;
        }
    }

    // Interior of an edge beats its endpoints; endpoints collapse to vertices.
    if best_edge_dist < best_vertex_dist - 1e-12 && best_edge_t > 1e-3 && best_edge_t < 1.0 - 1e-3
    {
        vec![triangle[best_edge], triangle[(best_edge + 1) % 3]]
    } else {
        vec![triangle[best_vertex]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACE_COS: f32 = 0.999_85;

    fn face_hit(tri: [Vec3; 3], depth: f32) -> EdgeHit {
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();
        EdgeHit {
            normal,
            penetration: depth,
            points: vec![(tri[0], tri[0] - normal * depth)],
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            face_normal: normal,
            face_vertices: tri,
        }
    }

    fn edge_hit(tri: [Vec3; 3], normal: Vec3, at: Vec3, depth: f32) -> EdgeHit {
        EdgeHit {
            normal,
            penetration: depth,
            points: vec![(at, at - normal * depth)],
            sub_shape_a: SubShapeId::ROOT,
            sub_shape_b: SubShapeId::ROOT,
            face_normal: (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize(),
            face_vertices: tri,
        }
    }

    #[test]
    fn edge_hit_on_a_shared_voided_edge_is_dropped() {
        // Two coplanar triangles forming a quad in the y = 0 plane.
        let t0 = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let t1 = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
        ];

        // A clean face hit on t0 and a slanted ghost hit on the diagonal of t1.
        let ghost_normal = Vec3::new(0.5, 0.8, 0.0).normalize();
        let on_diagonal = Vec3::new(0.5, 0.0, 0.5);
        let hits = vec![
            face_hit(t0, 0.02),
            edge_hit(t1, ghost_normal, on_diagonal, 0.01),
        ];

        let filtered = filter_internal_edges(hits, FACE_COS);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].normal.dot(Vec3::Y).abs() > 0.99);
    }

    #[test]
    fn edge_hit_on_an_unvoided_border_survives() {
        let t0 = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let ghost_normal = Vec3::new(0.5, 0.8, 0.0).normalize();
        // No face hit voids anything, so the edge contact stands.
        let hits = vec![edge_hit(t0, ghost_normal, Vec3::new(0.5, 0.0, 0.0), 0.01)];
        let filtered = filter_internal_edges(hits, FACE_COS);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn deeper_buffered_hits_win_feature_claims() {
        let t0 = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let n1 = Vec3::new(0.6, 0.8, 0.0).normalize();
        let n2 = Vec3::new(-0.6, 0.8, 0.0).normalize();
        let at = Vec3::new(0.5, 0.0, 0.0);
        let shallow = edge_hit(t0, n1, at, 0.01);
        let deep = edge_hit(t0, n2, at, 0.05);

        let filtered = filter_internal_edges(vec![shallow, deep], FACE_COS);
        assert_eq!(filtered.len(), 1);
        assert!((filtered[0].penetration - 0.05).abs() < 1e-6);
    }
}

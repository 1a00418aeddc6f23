use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::aabb::Aabb;

const LEAF_TRIANGLES: usize = 4;

/// Internal node of the static triangle BVH. Leaves reference a contiguous
/// run of the (reordered) triangle array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshBvhNode {
    pub bounds: Aabb,
    pub left: u32,
    pub right: u32,
    pub start: u32,
    pub count: u32,
}

impl MeshBvhNode {
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Triangle mesh collision data: vertices, triangles, a median-split AABB
/// tree, and shared-edge adjacency used by internal-edge removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub bounds: Aabb,
    nodes: Vec<MeshBvhNode>,
    // For each triangle edge (v[i], v[i+1]), whether another triangle shares it.
    shared_edges: Vec<[bool; 3]>,
}

impl TriangleMesh {
    pub fn builder(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> MeshBuilder {
        MeshBuilder::new(vertices, triangles)
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle_vertices(&self, index: usize) -> [Vec3; 3] {
        let tri = self.triangles[index];
        [
            self.vertices[tri[0] as usize],
            self.vertices[tri[1] as usize],
            self.vertices[tri[2] as usize],
        ]
    }

    pub fn triangle_normal(&self, index: usize) -> Vec3 {
        let [v0, v1, v2] = self.triangle_vertices(index);
        (v1 - v0).cross(v2 - v0).normalize_or_zero()
    }

    /// Whether edge `edge` (0..3) of triangle `index` is shared with a
    /// neighbouring triangle. Shared edges are interior and never produce
    /// standalone edge contacts.
    pub fn edge_is_shared(&self, index: usize, edge: usize) -> bool {
        self.shared_edges[index][edge]
    }

    /// Visits the indices of all triangles whose bounds overlap `query`.
    pub fn visit_overlapping(&self, query: &Aabb, mut visitor: impl FnMut(usize)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0u32];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            if !node.bounds.overlaps(query) {
                continue;
            }
            if node.is_leaf() {
                for i in node.start..node.start + node.count {
                    visitor(i as usize);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Closest ray hit over the tree; returns `(t, triangle_index, normal)`.
    pub fn cast_ray(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Option<(f32, usize, Vec3)> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<(f32, usize, Vec3)> = None;
        let mut stack = vec![0u32];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index as usize];
            let limit = best.map(|(t, _, _)| t).unwrap_or(max_t);
            if node.bounds.ray_hit(origin, dir, limit).is_none() {
                continue;
            }
            if node.is_leaf() {
                for i in node.start..node.start + node.count {
                    let [v0, v1, v2] = self.triangle_vertices(i as usize);
                    if let Some((t, normal)) = ray_triangle(origin, dir, v0, v1, v2) {
                        if t <= limit && best.map(|(bt, _, _)| t < bt).unwrap_or(true) {
                            best = Some((t, i as usize, normal));
                        }
                    }
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        best
    }
}

/// Möller–Trumbore intersection; normal is the geometric (unoriented) one
/// flipped to face the ray origin.
pub fn ray_triangle(origin: Vec3, dir: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<(f32, Vec3)> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let pvec = dir.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - v0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(edge1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(qvec) * inv_det;
    if t < 0.0 {
        return None;
    }
    let mut normal = edge1.cross(edge2).normalize_or_zero();
    if normal == Vec3::ZERO {
        return None;
    }
    if normal.dot(dir) > 0.0 {
        normal = -normal;
    }
    Some((t, normal))
}

/// Cooks triangle meshes from raw vertex/index buffers.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
}

impl MeshBuilder {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// Deduplicates vertices using a quantised grid, which also makes edge
    /// adjacency detection reliable for meshes exported with split vertices.
    pub fn weld_vertices(mut self, epsilon: f32) -> Self {
        if epsilon <= 0.0 || self.vertices.is_empty() {
            return self;
        }

        let inv = 1.0 / epsilon;
        let mut map: HashMap<(i32, i32, i32), u32> = HashMap::new();
        let mut new_vertices: Vec<Vec3> = Vec::new();
        let mut remap: Vec<u32> = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let key = (
                (v.x * inv).round() as i32,
                (v.y * inv).round() as i32,
                (v.z * inv).round() as i32,
            );
            let index = *map.entry(key).or_insert_with(|| {
                let idx = new_vertices.len() as u32;
                new_vertices.push(*v);
                idx
            });
            remap.push(index);
        }

        for tri in &mut self.triangles {
            for v in tri.iter_mut() {
                *v = remap[*v as usize];
            }
        }

        self.vertices = new_vertices;
        self
    }

    pub fn build(self) -> TriangleMesh {
        let MeshBuilder {
            vertices,
            mut triangles,
        } = self;

        // Drop degenerate triangles; they would poison normals downstream.
        triangles.retain(|tri| {
            let v0 = vertices[tri[0] as usize];
            let v1 = vertices[tri[1] as usize];
            let v2 = vertices[tri[2] as usize];
            (v1 - v0).cross(v2 - v0).length_squared() > 1e-12
        });

        let mut bounds = Aabb::INVALID;
        for v in &vertices {
            bounds.grow(*v);
        }

        let mut order: Vec<u32> = (0..triangles.len() as u32).collect();
        let mut nodes = Vec::new();
        if !triangles.is_empty() {
            build_node(&vertices, &triangles, &mut order, 0, &mut nodes);
        }
        let triangles: Vec<[u32; 3]> = order
            .iter()
            .map(|&i| triangles[i as usize])
            .collect();

        let shared_edges = compute_shared_edges(&triangles);

        TriangleMesh {
            vertices,
            triangles,
            bounds,
            nodes,
            shared_edges,
        }
    }
}

fn triangle_bounds(vertices: &[Vec3], tri: &[u32; 3]) -> Aabb {
    let mut b = Aabb::INVALID;
    for &i in tri {
        b.grow(vertices[i as usize]);
    }
    b
}

// Median split over the longest axis of the centroid bounds. `order[range]`
// is partitioned in place; returns the node index.
fn build_node(
    vertices: &[Vec3],
    triangles: &[[u32; 3]],
    order: &mut [u32],
    start: u32,
    nodes: &mut Vec<MeshBvhNode>,
) -> u32 {
    let mut bounds = Aabb::INVALID;
    for &i in order.iter() {
        bounds = bounds.merge(&triangle_bounds(vertices, &triangles[i as usize]));
    }

    let node_index = nodes.len() as u32;
    nodes.push(MeshBvhNode {
        bounds,
        left: 0,
        right: 0,
        start,
        count: 0,
    });

    if order.len() <= LEAF_TRIANGLES {
        nodes[node_index as usize].count = order.len() as u32;
        return node_index;
    }

    let mut centroid_bounds = Aabb::INVALID;
    for &i in order.iter() {
        centroid_bounds.grow(triangle_bounds(vertices, &triangles[i as usize]).center());
    }
    let extent = centroid_bounds.max - centroid_bounds.min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    order.sort_unstable_by(|&a, &b| {
        let ca = triangle_bounds(vertices, &triangles[a as usize]).center()[axis];
        let cb = triangle_bounds(vertices, &triangles[b as usize]).center()[axis];
        ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mid = order.len() / 2;
    let (left_order, right_order) = order.split_at_mut(mid);
    let left = build_node(vertices, triangles, left_order, start, nodes);
    let right = build_node(vertices, triangles, right_order, start + mid as u32, nodes);
    nodes[node_index as usize].left = left;
    nodes[node_index as usize].right = right;
    node_index
}

fn compute_shared_edges(triangles: &[[u32; 3]]) -> Vec<[bool; 3]> {
    let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in triangles {
        for e in 0..3 {
            let a = tri[e];
            let b = tri[(e + 1) % 3];
            let key = (a.min(b), a.max(b));
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }

    triangles
        .iter()
        .map(|tri| {
            let mut shared = [false; 3];
            for e in 0..3 {
                let a = tri[e];
                let b = tri[(e + 1) % 3];
                let key = (a.min(b), a.max(b));
                shared[e] = edge_count.get(&key).copied().unwrap_or(0) > 1;
            }
            shared
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> TriangleMesh {
        // Two coplanar triangles sharing the diagonal (0,0)-(1,1).
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let triangles = vec![[0, 1, 2], [0, 2, 3]];
        TriangleMesh::builder(vertices, triangles).build()
    }

    #[test]
    fn shared_diagonal_is_detected() {
        let mesh = quad_mesh();
        let mut shared_total = 0;
        for t in 0..mesh.triangle_count() {
            for e in 0..3 {
                if mesh.edge_is_shared(t, e) {
                    shared_total += 1;
                }
            }
        }
        // The diagonal is shared by both triangles; border edges are not.
        assert_eq!(shared_total, 2);
    }

    #[test]
    fn ray_cast_hits_the_surface() {
        let mesh = quad_mesh();
        let hit = mesh.cast_ray(Vec3::new(0.5, 1.0, 0.5), Vec3::NEG_Y, 10.0);
        let (t, _, normal) = hit.expect("ray should hit the quad");
        assert!((t - 1.0).abs() < 1e-5);
        assert!(normal.dot(Vec3::Y) > 0.99);
    }

    #[test]
    fn bvh_overlap_visits_only_nearby_triangles() {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..8 {
            let x = i as f32 * 10.0;
            let base = vertices.len() as u32;
            vertices.push(Vec3::new(x, 0.0, 0.0));
            vertices.push(Vec3::new(x + 1.0, 0.0, 0.0));
            vertices.push(Vec3::new(x, 0.0, 1.0));
            triangles.push([base, base + 1, base + 2]);
        }
        let mesh = TriangleMesh::builder(vertices, triangles).build();

        let query = Aabb::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(1.5, 0.5, 1.5));
        let mut visited = Vec::new();
        mesh.visit_overlapping(&query, |i| visited.push(i));
        assert_eq!(visited.len(), 1);
    }
}

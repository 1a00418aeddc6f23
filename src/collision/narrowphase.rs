use glam::Vec3;

use crate::{
    collision::{
        clipping::clip_face_vs_face,
        edge_filter::{filter_internal_edges, EdgeHit},
        manifold::ManifoldAccumulator,
    },
    core::{
        aabb::Aabb,
        shape::{Shape, ShapeKind, ShapeRegistry, ShapeType},
        subshape::SubShapeId,
        support::{supporting_face, ConvexSupport, PolygonSupport, Support, SupportMode,
                  TransformedSupport},
        types::Transform,
    },
};

const GJK_MAX_ITERATIONS: usize = 64;
const GJK_TOLERANCE: f32 = 1e-6;
const EPA_MAX_ITERATIONS: usize = 32;
const EPA_TOLERANCE: f32 = 1e-4;
// cos(1°); face hits within this of the triangle normal pass the edge filter.
const FACE_NORMAL_COS: f32 = 0.999_85;

/// One vertex of the configuration-space simplex with its witness points.
#[derive(Debug, Clone, Copy)]
pub struct SupportVertex {
    pub w: Vec3,
    pub a: Vec3,
    pub b: Vec3,
}

fn support_vertex(a: &impl Support, b: &impl Support, dir: Vec3) -> SupportVertex {
    let pa = a.support(dir);
    let pb = b.support(-dir);
    SupportVertex {
        w: pa - pb,
        a: pa,
        b: pb,
    }
}

/// Closest-distance result between two convex cores.
#[derive(Debug, Clone)]
pub enum GjkResult {
    /// Cores are apart: closest core points and the unit axis from A to B.
    Separated {
        distance: f32,
        point_a: Vec3,
        point_b: Vec3,
        axis: Vec3,
    },
    /// Cores overlap; the simplex is a tetrahedron enclosing the origin.
    Intersecting { simplex: [SupportVertex; 4] },
    /// Support function collapsed (zero-size shape).
    Degenerate,
}

/// GJK distance query between two support functions.
pub fn gjk_closest(a: &impl Support, b: &impl Support, initial_dir: Vec3) -> GjkResult {
    let mut dir = if initial_dir.length_squared() > GJK_TOLERANCE {
        initial_dir
    } else {
        Vec3::X
    };

    let mut simplex: Vec<SupportVertex> = Vec::with_capacity(4);
    simplex.push(support_vertex(a, b, dir));

    for _ in 0..GJK_MAX_ITERATIONS {
        let (closest, lambdas, kept) = closest_on_simplex(&simplex);

        if kept.len() == 4 {
            let tetra = [simplex[0], simplex[1], simplex[2], simplex[3]];
            return GjkResult::Intersecting { simplex: tetra };
        }

        // Reduce the simplex to the supporting feature.
        let reduced: Vec<SupportVertex> = kept.iter().map(|&i| simplex[i]).collect();
        let reduced_lambdas: Vec<f32> = kept.iter().map(|&i| lambdas[i]).collect();
        simplex = reduced;

        let dist_sq = closest.length_squared();
        if dist_sq <= GJK_TOLERANCE {
            // Origin on the simplex boundary: treat as intersecting.
            return match complete_to_tetrahedron(a, b, &simplex) {
                Some(tetra) => GjkResult::Intersecting { simplex: tetra },
                None => GjkResult::Degenerate,
            };
        }

        dir = -closest;
        let w = support_vertex(a, b, dir);

        // No further progress toward the origin: converged.
        let progress = dist_sq - closest.dot(w.w);
        if progress <= GJK_TOLERANCE * dist_sq.max(1.0) || simplex.len() >= 4 {
            let (point_a, point_b) = witness_points(&simplex, &reduced_lambdas);
            let distance = dist_sq.sqrt();
            return GjkResult::Separated {
                distance,
                point_a,
                point_b,
                axis: -closest / distance,
            };
        }
        simplex.push(w);
    }

    // Out of iterations: report the best separation estimate.
    let (closest, lambdas, kept) = closest_on_simplex(&simplex);
    let reduced: Vec<SupportVertex> = kept.iter().map(|&i| simplex[i]).collect();
    let reduced_lambdas: Vec<f32> = kept.iter().map(|&i| lambdas[i]).collect();
    let distance = closest.length();
    if distance <= GJK_TOLERANCE {
        return GjkResult::Degenerate;
    }
    let (point_a, point_b) = witness_points(&reduced, &reduced_lambdas);
    GjkResult::Separated {
        distance,
        point_a,
        point_b,
        axis: -closest / distance,
    }
}

fn witness_points(simplex: &[SupportVertex], lambdas: &[f32]) -> (Vec3, Vec3) {
    let mut pa = Vec3::ZERO;
    let mut pb = Vec3::ZERO;
    for (v, &l) in simplex.iter().zip(lambdas) {
        pa += v.a * l;
        pb += v.b * l;
    }
    (pa, pb)
}

// Closest point to the origin on the current simplex. Returns the point, the
// barycentric weight of every current vertex, and the indices of vertices
// supporting that point.
fn closest_on_simplex(simplex: &[SupportVertex]) -> (Vec3, Vec<f32>, Vec<usize>) {
    match simplex.len() {
        1 => (simplex[0].w, vec![1.0], vec![0]),
        2 => {
            let (point, s, t) = closest_on_segment(simplex[0].w, simplex[1].w);
            if s <= 0.0 {
                (simplex[1].w, vec![0.0, 1.0], vec![1])
            } else if t <= 0.0 {
                (simplex[0].w, vec![1.0, 0.0], vec![0])
            } else {
                (point, vec![s, t], vec![0, 1])
            }
        }
        3 => {
            let (point, bary, kept) =
                closest_on_triangle(simplex[0].w, simplex[1].w, simplex[2].w);
            (point, bary.to_vec(), kept)
        }
        _ => closest_on_tetrahedron(simplex),
    }
}

// Closest point on segment ab to the origin with weights (for a, for b).
fn closest_on_segment(a: Vec3, b: Vec3) -> (Vec3, f32, f32) {
    let ab = b - a;
    let denom = ab.length_squared();
    if denom < GJK_TOLERANCE {
        return (a, 1.0, 0.0);
    }
    let t = (-a.dot(ab) / denom).clamp(0.0, 1.0);
    (a + ab * t, 1.0 - t, t)
}

// Ericson-style closest point on triangle abc to the origin. Returns the
// point, barycentric weights for (a, b, c), and which vertices support it.
fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, [f32; 3], Vec<usize>) {
    let ab = b - a;
    let ac = c - a;
    let ap = -a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, [1.0, 0.0, 0.0], vec![0]);
    }

    let bp = -b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, [0.0, 1.0, 0.0], vec![1]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0], vec![0, 1]);
    }

    let cp = -c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, [0.0, 0.0, 1.0], vec![2]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w], vec![0, 2]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w], vec![1, 2]);
    }

    let denom = va + vb + vc;
    if denom.abs() < f32::MIN_POSITIVE {
        return (a, [1.0, 0.0, 0.0], vec![0]);
    }
    let inv = 1.0 / denom;
    let v = vb * inv;
    let w = vc * inv;
    (
        a + ab * v + ac * w,
        [1.0 - v - w, v, w],
        vec![0, 1, 2],
    )
}

fn closest_on_tetrahedron(simplex: &[SupportVertex]) -> (Vec3, Vec<f32>, Vec<usize>) {
    let points = [simplex[0].w, simplex[1].w, simplex[2].w, simplex[3].w];

    // Origin inside every face plane means containment.
    let faces: [[usize; 3]; 4] = [[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]];
    let mut best: Option<(f32, Vec3, [f32; 3], Vec<usize>, [usize; 3])> = None;
    let mut inside = true;

    for face in faces {
        let [i, j, k] = face;
        let opposite = 6 - i - j - k;
        let n = (points[j] - points[i]).cross(points[k] - points[i]);
        let plane_side = n.dot(-points[i]);
        let opposite_side = n.dot(points[opposite] - points[i]);
        // The origin lies on the outside of this face.
        if plane_side * opposite_side < 0.0 {
            inside = false;
            let (point, bary, kept) = closest_on_triangle(points[i], points[j], points[k]);
            let dist = point.length_squared();
            if best.as_ref().map(|(d, ..)| dist < *d).unwrap_or(true) {
                best = Some((dist, point, bary, kept, face));
            }
        }
    }

    if inside {
        return (Vec3::ZERO, vec![0.25; 4], vec![0, 1, 2, 3]);
    }

    let (_, point, bary, kept, face) = best.expect("origin outside at least one face");
    let mut lambdas = vec![0.0; 4];
    for (slot, &weight) in bary.iter().enumerate() {
        lambdas[face[slot]] = weight;
    }
    let kept_global: Vec<usize> = kept.iter().map(|&local| face[local]).collect();
    (point, lambdas, kept_global)
}

// Pads a sub-tetrahedral simplex to a tetrahedron around the origin by
// sampling the coordinate directions.
fn complete_to_tetrahedron(
    a: &impl Support,
    b: &impl Support,
    simplex: &[SupportVertex],
) -> Option<[SupportVertex; 4]> {
    let mut verts: Vec<SupportVertex> = simplex.to_vec();
    let candidates = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for dir in candidates {
        if verts.len() >= 4 {
            break;
        }
        let w = support_vertex(a, b, dir);
        let distinct = verts
            .iter()
            .all(|v| (v.w - w.w).length_squared() > GJK_TOLERANCE);
        if distinct {
            // Reject points that keep the simplex degenerate.
            if verts.len() == 3 {
                let n = (verts[1].w - verts[0].w).cross(verts[2].w - verts[0].w);
                if n.length_squared() > GJK_TOLERANCE
                    && n.dot(w.w - verts[0].w).abs() < 1e-6
                {
                    continue;
                }
            }
            verts.push(w);
        }
    }
    if verts.len() == 4 {
        Some([verts[0], verts[1], verts[2], verts[3]])
    } else {
        None
    }
}

/// Penetration depth and axis recovered by the expanding polytope algorithm.
/// The axis points from A to B; degenerate polytopes fall back to `fallback`.
pub fn epa_penetration(
    a: &impl Support,
    b: &impl Support,
    simplex: [SupportVertex; 4],
    fallback: Vec3,
) -> (f32, Vec3) {
    let mut polytope: Vec<Vec3> = simplex.iter().map(|v| v.w).collect();
    let mut faces = initial_faces(&polytope);

    for _ in 0..EPA_MAX_ITERATIONS {
        let Some((_, min_dist, normal)) = closest_face(&polytope, &faces) else {
            return (0.01, fallback);
        };

        let support = support_vertex(a, b, normal).w;
        let distance = support.dot(normal);
        if distance - min_dist < EPA_TOLERANCE {
            return (min_dist.max(0.0), normal);
        }
        expand_polytope(&mut polytope, &mut faces, support);
    }

    match closest_face(&polytope, &faces) {
        Some((_, min_dist, normal)) => (min_dist.max(0.0), normal),
        None => (0.01, fallback),
    }
}

fn initial_faces(polytope: &[Vec3]) -> Vec<(usize, usize, usize)> {
    let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];
    for face in &mut faces {
        let ab = polytope[face.1] - polytope[face.0];
        let ac = polytope[face.2] - polytope[face.0];
        let normal = ab.cross(ac);
        if polytope[face.0].dot(normal) < 0.0 {
            std::mem::swap(&mut face.1, &mut face.2);
        }
    }
    faces
}

fn closest_face(
    polytope: &[Vec3],
    faces: &[(usize, usize, usize)],
) -> Option<(usize, f32, Vec3)> {
    let mut best: Option<(usize, f32, Vec3)> = None;
    for (idx, &(a, b, c)) in faces.iter().enumerate() {
        let ab = polytope[b] - polytope[a];
        let ac = polytope[c] - polytope[a];
        let normal = ab.cross(ac).normalize_or_zero();
        if normal == Vec3::ZERO {
            continue;
        }
        let dist = polytope[a].dot(normal);
        if best.map(|(_, d, _)| dist < d).unwrap_or(true) {
            best = Some((idx, dist, normal));
        }
    }
    best
}

fn expand_polytope(
    polytope: &mut Vec<Vec3>,
    faces: &mut Vec<(usize, usize, usize)>,
    support: Vec3,
) {
    let new_idx = polytope.len();
    polytope.push(support);

    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < faces.len() {
        let (a, b, c) = faces[i];
        let ab = polytope[b] - polytope[a];
        let ac = polytope[c] - polytope[a];
        let normal = ab.cross(ac).normalize_or_zero();

        if normal.dot(support - polytope[a]) > 0.0 {
            for edge in [(a, b), (b, c), (c, a)] {
                // An edge shared by two removed faces cancels out.
                if let Some(pos) = edges.iter().position(|&e| e == (edge.1, edge.0)) {
                    edges.remove(pos);
                } else {
                    edges.push(edge);
                }
            }
            faces.swap_remove(i);
        } else {
            i += 1;
        }
    }

    for (u, v) in edges {
        faces.push((u, v, new_idx));
    }
}

/// Tunable inputs of one narrowphase pass.
#[derive(Debug, Clone, Copy)]
pub struct CollideSettings {
    /// Maximum surface separation that still produces (speculative) contacts.
    pub max_separation: f32,
    /// Extra slack when filtering clipped face points.
    pub manifold_tolerance: f32,
    /// Cosine threshold for merging hit normals into one manifold.
    pub normal_cos_max_delta: f32,
}

impl CollideSettings {
    pub fn max_contact_distance(&self) -> f32 {
        self.max_separation + self.manifold_tolerance
    }
}

/// One side of a narrowphase pair.
#[derive(Clone, Copy)]
pub struct ShapeArgs<'a> {
    pub shape: &'a Shape,
    pub transform: Transform,
    pub scale: Vec3,
    pub sub_shape: SubShapeId,
}

impl<'a> ShapeArgs<'a> {
    pub fn new(shape: &'a Shape, transform: Transform) -> Self {
        Self {
            shape,
            transform,
            scale: Vec3::ONE,
            sub_shape: SubShapeId::ROOT,
        }
    }

    fn world_aabb(&self) -> Aabb {
        self.shape
            .local_aabb
            .scaled(self.scale)
            .transformed(self.transform.position, self.transform.rotation)
    }

    fn support(&self, mode: SupportMode) -> Option<TransformedSupport<'a>> {
        ConvexSupport::new(&self.shape.kind, mode).map(|core| {
            TransformedSupport::new(
                core,
                self.transform.position,
                self.transform.rotation,
                self.scale,
            )
        })
    }
}

/// Pair-independent context threaded through the dispatch.
pub struct CollideContext<'a> {
    pub registry: &'a ShapeRegistry,
    pub dispatch: &'a CollideDispatch,
    pub settings: CollideSettings,
    /// Route mesh hits through internal-edge removal.
    pub edge_removal: bool,
}

/// Collision function: produces manifolds for one (typeA, typeB) pairing.
pub type CollideFn = fn(&CollideContext, &ShapeArgs, &ShapeArgs, &mut ManifoldAccumulator);

#[derive(Clone, Copy)]
enum DispatchEntry {
    None,
    Direct(CollideFn),
    /// Calls the function with swapped arguments and flips the results.
    Reversed(CollideFn),
}

/// Table of collision functions indexed by the two shape variants.
///
/// User shape integrations register their functions here; registering one
/// direction with [`CollideDispatch::register_reversed`] derives the other.
pub struct CollideDispatch {
    table: [[DispatchEntry; ShapeType::COUNT]; ShapeType::COUNT],
}

impl Default for CollideDispatch {
    fn default() -> Self {
        Self::with_default_shapes()
    }
}

const ALL_TYPES: [ShapeType; ShapeType::COUNT] = [
    ShapeType::Sphere,
    ShapeType::Box,
    ShapeType::Capsule,
    ShapeType::Cylinder,
    ShapeType::Plane,
    ShapeType::ConvexHull,
    ShapeType::Mesh,
    ShapeType::Compound,
    ShapeType::Scaled,
    ShapeType::Transformed,
    ShapeType::Empty,
];

const CONVEX_TYPES: [ShapeType; 5] = [
    ShapeType::Sphere,
    ShapeType::Box,
    ShapeType::Capsule,
    ShapeType::Cylinder,
    ShapeType::ConvexHull,
];

impl CollideDispatch {
    pub fn empty() -> Self {
        Self {
            table: [[DispatchEntry::None; ShapeType::COUNT]; ShapeType::COUNT],
        }
    }

    pub fn with_default_shapes() -> Self {
        let mut dispatch = Self::empty();

        for a in CONVEX_TYPES {
            for b in CONVEX_TYPES {
                dispatch.register(a, b, collide_convex_convex);
            }
        }
        dispatch.register(ShapeType::Sphere, ShapeType::Sphere, collide_sphere_sphere);
        dispatch.register(ShapeType::Sphere, ShapeType::Box, collide_sphere_box);
        dispatch.register_reversed(ShapeType::Box, ShapeType::Sphere, collide_sphere_box);

        for b in CONVEX_TYPES {
            dispatch.register(ShapeType::Plane, b, collide_plane_convex);
            dispatch.register_reversed(b, ShapeType::Plane, collide_plane_convex);
            dispatch.register(ShapeType::Mesh, b, collide_mesh_convex);
            dispatch.register_reversed(b, ShapeType::Mesh, collide_mesh_convex);
        }

        for t in ALL_TYPES {
            dispatch.register(ShapeType::Compound, t, collide_compound_any);
            dispatch.register_reversed(t, ShapeType::Compound, collide_compound_any);
        }
        dispatch.register(ShapeType::Compound, ShapeType::Compound, collide_compound_any);

        for t in ALL_TYPES {
            dispatch.register(ShapeType::Scaled, t, collide_scaled_any);
            dispatch.register_reversed(t, ShapeType::Scaled, collide_scaled_any);
            dispatch.register(ShapeType::Transformed, t, collide_transformed_any);
            dispatch.register_reversed(t, ShapeType::Transformed, collide_transformed_any);
        }
        dispatch.register(ShapeType::Scaled, ShapeType::Scaled, collide_scaled_any);
        dispatch.register(
            ShapeType::Transformed,
            ShapeType::Transformed,
            collide_transformed_any,
        );
        dispatch.register(ShapeType::Scaled, ShapeType::Transformed, collide_scaled_any);
        dispatch.register(
            ShapeType::Transformed,
            ShapeType::Scaled,
            collide_transformed_any,
        );

        for t in ALL_TYPES {
            dispatch.table[ShapeType::Empty.index()][t.index()] = DispatchEntry::None;
            dispatch.table[t.index()][ShapeType::Empty.index()] = DispatchEntry::None;
        }

        dispatch
    }

    pub fn register(&mut self, a: ShapeType, b: ShapeType, f: CollideFn) {
        self.table[a.index()][b.index()] = DispatchEntry::Direct(f);
    }

    /// Registers the (a, b) direction as the mirror of an (b, a) function.
    pub fn register_reversed(&mut self, a: ShapeType, b: ShapeType, f: CollideFn) {
        self.table[a.index()][b.index()] = DispatchEntry::Reversed(f);
    }

    pub fn collide(
        &self,
        ctx: &CollideContext,
        a: &ShapeArgs,
        b: &ShapeArgs,
        out: &mut ManifoldAccumulator,
    ) {
        match self.table[a.shape.shape_type().index()][b.shape.shape_type().index()] {
            DispatchEntry::None => {}
            DispatchEntry::Direct(f) => f(ctx, a, b, out),
            DispatchEntry::Reversed(f) => {
                let mut flipped = ManifoldAccumulator::new(
                    out.base_offset,
                    ctx.settings.normal_cos_max_delta,
                    ctx.settings.max_contact_distance(),
                );
                f(ctx, b, a, &mut flipped);
                for mut manifold in flipped.finalize(false) {
                    manifold.flip();
                    out.add_hit(
                        manifold.normal,
                        manifold.penetration,
                        manifold.sub_shape_a,
                        manifold.sub_shape_b,
                        manifold
                            .points_a
                            .iter()
                            .zip(manifold.points_b.iter())
                            .map(|(pa, pb)| (manifold.base_offset + *pa, manifold.base_offset + *pb)),
                    );
                }
            }
        }
    }
}

/// Narrowphase entry point for one shape pair.
pub fn collide_shapes(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    ctx.dispatch.collide(ctx, a, b, out)
}

fn collide_sphere_sphere(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let (ShapeKind::Sphere { radius: ra }, ShapeKind::Sphere { radius: rb }) =
        (&a.shape.kind, &b.shape.kind)
    else {
        return;
    };
    let ra = ra * a.scale.abs().min_element();
    let rb = rb * b.scale.abs().min_element();

    let delta = b.transform.position - a.transform.position;
    let dist = delta.length();
    let normal = if dist > 1e-6 { delta / dist } else { Vec3::X };
    let separation = dist - ra - rb;
    if separation > ctx.settings.max_separation {
        return;
    }

    let pa = a.transform.position + normal * ra;
    let pb = b.transform.position - normal * rb;
    out.add_hit(
        normal,
        -separation,
        a.sub_shape,
        b.sub_shape,
        std::iter::once((pa, pb)),
    );
}

fn collide_sphere_box(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let (ShapeKind::Sphere { radius }, ShapeKind::Box { half_extents, .. }) =
        (&a.shape.kind, &b.shape.kind)
    else {
        return;
    };
    let radius = radius * a.scale.abs().min_element();
    let he = *half_extents * b.scale.abs();

    let center_local = b.transform.point_to_local(a.transform.position);
    let clamped = center_local.clamp(-he, he);

    let (normal_local, separation, surface_local) = if clamped == center_local {
        // Centre inside the box: push out through the nearest face.
        let face_dist = he - center_local.abs();
        let (axis, depth_to_face) = if face_dist.x <= face_dist.y && face_dist.x <= face_dist.z {
            (Vec3::X * center_local.x.signum(), face_dist.x)
        } else if face_dist.y <= face_dist.z {
            (Vec3::Y * center_local.y.signum(), face_dist.y)
        } else {
            (Vec3::Z * center_local.z.signum(), face_dist.z)
        };
        let surface = center_local + axis * depth_to_face;
        (-axis, -(depth_to_face + radius), surface)
    } else {
        let diff = center_local - clamped;
        let dist = diff.length();
        (-diff / dist, dist - radius, clamped)
    };

    if separation > ctx.settings.max_separation {
        return;
    }

    // normal points from the sphere (A) toward the box (B).
    let normal = b.transform.rotation * normal_local;
    let pa = a.transform.position + normal * radius;
    let pb = b.transform.point_to_world(surface_local);
    out.add_hit(
        normal,
        -separation,
        a.sub_shape,
        b.sub_shape,
        std::iter::once((pa, pb)),
    );
}

fn collide_plane_convex(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let ShapeKind::Plane {
        normal: local_normal,
        constant,
        ..
    } = &a.shape.kind
    else {
        return;
    };
    let Some(support_b) = b.support(SupportMode::IncludeRadius) else {
        return;
    };

    // World plane; scaling a plane shape rescales its patch, not its normal.
    let plane_normal = (a.transform.rotation * (*local_normal / a.scale)).normalize_or_zero();
    if plane_normal == Vec3::ZERO {
        return;
    }
    let base = a
        .transform
        .point_to_world(-*constant * *local_normal * a.scale);

    // Deepest point of B against the plane.
    let deepest = support_b.support(-plane_normal);
    let deepest_separation = (deepest - base).dot(plane_normal);
    if deepest_separation > ctx.settings.max_separation {
        return;
    }

    // Clip B's supporting face against the plane patch.
    let local_dir_b = b.transform.rotation.conjugate() * -plane_normal;
    let face_b: Vec<Vec3> = supporting_face(&b.shape.kind, local_dir_b, b.scale)
        .into_iter()
        .map(|p| b.transform.point_to_world(p))
        .collect();

    let max_contact = ctx.settings.max_contact_distance();
    let mut pairs = Vec::new();
    if face_b.len() >= 2 {
        for p in &face_b {
            let separation = (*p - base).dot(plane_normal);
            if separation <= max_contact {
                pairs.push((*p - plane_normal * separation, *p));
            }
        }
    }
    if pairs.is_empty() {
        pairs.push((deepest - plane_normal * deepest_separation, deepest));
    }

    out.add_hit(
        plane_normal,
        -deepest_separation,
        a.sub_shape,
        b.sub_shape,
        pairs.into_iter(),
    );
}

fn collide_convex_convex(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let (Some(support_a), Some(support_b)) = (
        a.support(SupportMode::ExcludeRadius),
        b.support(SupportMode::ExcludeRadius),
    ) else {
        return;
    };
    let ra = support_a.convex_radius();
    let rb = support_b.convex_radius();

    let initial = b.transform.position - a.transform.position;
    match gjk_closest(&support_a, &support_b, initial) {
        GjkResult::Separated {
            distance,
            point_a,
            point_b,
            axis,
        } => {
            let separation = distance - ra - rb;
            if separation > ctx.settings.max_separation {
                return;
            }
            let pa = point_a + axis * ra;
            let pb = point_b - axis * rb;
            emit_convex_manifold(ctx, a, b, axis, -separation, pa, pb, out);
        }
        GjkResult::Intersecting { simplex } => {
            let fallback = initial.normalize_or_zero();
            let fallback = if fallback == Vec3::ZERO {
                Vec3::X
            } else {
                fallback
            };
            let (core_depth, mut normal) =
                epa_penetration(&support_a, &support_b, simplex, fallback);
            // Degenerate or touching results can come out perpendicular to the
            // approach axis; prefer the centre axis in that case.
            if core_depth < 0.01 && initial.length_squared() > 1e-6 {
                let center_dir = initial.normalize();
                if normal.dot(center_dir) < 0.5 {
                    normal = center_dir;
                }
            }
            let depth = core_depth + ra + rb;
            let pa = support_a.support(normal) + normal * ra;
            let pb = support_b.support(-normal) - normal * rb;
            emit_convex_manifold(ctx, a, b, normal, depth, pa, pb, out);
        }
        GjkResult::Degenerate => {}
    }
}

// Samples supporting faces along the contact normal, clips, and emits either a
// face manifold or the single fallback point pair.
#[allow(clippy::too_many_arguments)]
fn emit_convex_manifold(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    normal: Vec3,
    penetration: f32,
    fallback_a: Vec3,
    fallback_b: Vec3,
    out: &mut ManifoldAccumulator,
) {
    let local_dir_a = a.transform.rotation.conjugate() * normal;
    let local_dir_b = b.transform.rotation.conjugate() * -normal;
    let face_a: Vec<Vec3> = supporting_face(&a.shape.kind, local_dir_a, a.scale)
        .into_iter()
        .map(|p| a.transform.point_to_world(p))
        .collect();
    let face_b: Vec<Vec3> = supporting_face(&b.shape.kind, local_dir_b, b.scale)
        .into_iter()
        .map(|p| b.transform.point_to_world(p))
        .collect();

    let pairs = face_manifold_points(
        normal,
        &face_a,
        &face_b,
        (fallback_a, fallback_b),
        ctx.settings.max_contact_distance(),
    );
    out.add_hit(normal, penetration, a.sub_shape, b.sub_shape, pairs.into_iter());
}

/// Clips the incident face against the reference face and projects surviving
/// points onto the reference plane along the contact normal. Falls back to
/// the given point pair when no face contact exists.
pub fn face_manifold_points(
    normal: Vec3,
    face_a: &[Vec3],
    face_b: &[Vec3],
    fallback: (Vec3, Vec3),
    max_contact_distance: f32,
) -> Vec<(Vec3, Vec3)> {
    let mut pairs = Vec::new();

    if face_a.len() >= 3 && face_b.len() >= 2 {
        let clipped = clip_face_vs_face(face_b, face_a, normal);
        let ref_point = face_a[0];
        for p in clipped {
            let separation = (p - ref_point).dot(normal);
            if separation <= max_contact_distance {
                pairs.push((p - normal * separation, p));
            }
        }
    } else if face_b.len() >= 3 && face_a.len() >= 2 {
        let clipped = clip_face_vs_face(face_a, face_b, -normal);
        let ref_point = face_b[0];
        for p in clipped {
            let separation = (p - ref_point).dot(-normal);
            if separation <= max_contact_distance {
                pairs.push((p, p + normal * separation));
            }
        }
    }

    if pairs.is_empty() {
        pairs.push(fallback);
    }
    pairs
}

fn collide_mesh_convex(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let ShapeKind::Mesh(mesh) = &a.shape.kind else {
        return;
    };
    let Some(support_b) = b.support(SupportMode::ExcludeRadius) else {
        return;
    };
    let rb = support_b.convex_radius();

    // Query the mesh tree in mesh-local (unscaled) space.
    let world_to_mesh = a.transform.inverse();
    let b_world = b.world_aabb().expanded(ctx.settings.max_separation + rb);
    let b_in_mesh = b_world
        .transformed(world_to_mesh.position, world_to_mesh.rotation)
        .scaled(Vec3::ONE / a.scale);

    let tri_count = mesh.triangle_count() as u32;
    let mut hits: Vec<EdgeHit> = Vec::new();

    mesh.visit_overlapping(&b_in_mesh, |tri_index| {
        let local = mesh.triangle_vertices(tri_index);
        let world: [Vec3; 3] = [
            a.transform.point_to_world(local[0] * a.scale),
            a.transform.point_to_world(local[1] * a.scale),
            a.transform.point_to_world(local[2] * a.scale),
        ];
        let face_normal = (world[1] - world[0])
            .cross(world[2] - world[0])
            .normalize_or_zero();
        if face_normal == Vec3::ZERO {
            return;
        }
        let triangle = PolygonSupport::new(&world);

        let sub_a = match a.sub_shape.push(tri_index as u32, tri_count) {
            Some(id) => id,
            None => return,
        };

        let initial = b.transform.position - world[0];
        let hit = match gjk_closest(&triangle, &support_b, initial) {
            GjkResult::Separated {
                distance,
                point_a,
                point_b,
                axis,
            } => {
                let separation = distance - rb;
                if separation > ctx.settings.max_separation {
                    return;
                }
                Some((axis, -separation, point_a, point_b - axis * rb))
            }
            GjkResult::Intersecting { simplex } => {
                let (depth, normal) =
                    epa_penetration(&triangle, &support_b, simplex, face_normal);
                let pa = triangle.support(normal);
                let pb = support_b.support(-normal) - normal * rb;
                Some((normal, depth + rb, pa, pb))
            }
            GjkResult::Degenerate => None,
        };
        let Some((normal, penetration, pa, pb)) = hit else {
            return;
        };

        // Build the candidate face pairs against the triangle.
        let local_dir_b = b.transform.rotation.conjugate() * -normal;
        let face_b: Vec<Vec3> = supporting_face(&b.shape.kind, local_dir_b, b.scale)
            .into_iter()
            .map(|p| b.transform.point_to_world(p))
            .collect();
        let pairs = face_manifold_points(
            normal,
            &world,
            &face_b,
            (pa, pb),
            ctx.settings.max_contact_distance(),
        );

        hits.push(EdgeHit {
            normal,
            penetration,
            points: pairs,
            sub_shape_a: sub_a,
            sub_shape_b: b.sub_shape,
            face_normal,
            face_vertices: world,
        });
    });

    let hits = if ctx.edge_removal {
        filter_internal_edges(hits, FACE_NORMAL_COS)
    } else {
        hits
    };

    for hit in hits {
        out.add_hit(
            hit.normal,
            hit.penetration,
            hit.sub_shape_a,
            hit.sub_shape_b,
            hit.points.into_iter(),
        );
    }
}

fn collide_compound_any(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let ShapeKind::Compound { children } = &a.shape.kind else {
        return;
    };
    let count = children.len() as u32;
    let b_bounds = b.world_aabb().expanded(ctx.settings.max_separation);

    for (index, child) in children.iter().enumerate() {
        let Some(shape) = ctx.registry.get(child.shape) else {
            continue;
        };
        let Some(sub_shape) = a.sub_shape.push(index as u32, count) else {
            continue;
        };
        let transform = a.transform.combine(&Transform::new(
            child.position * a.scale,
            child.rotation,
        ));
        let child_args = ShapeArgs {
            shape,
            transform,
            scale: a.scale,
            sub_shape,
        };
        if !child_args.world_aabb().overlaps(&b_bounds) {
            continue;
        }
        ctx.dispatch.collide(ctx, &child_args, b, out);
    }
}

fn collide_scaled_any(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let ShapeKind::Scaled { child, scale } = &a.shape.kind else {
        return;
    };
    let Some(shape) = ctx.registry.get(*child) else {
        return;
    };
    let child_args = ShapeArgs {
        shape,
        transform: a.transform,
        scale: a.scale * *scale,
        sub_shape: a.sub_shape,
    };
    ctx.dispatch.collide(ctx, &child_args, b, out);
}

fn collide_transformed_any(
    ctx: &CollideContext,
    a: &ShapeArgs,
    b: &ShapeArgs,
    out: &mut ManifoldAccumulator,
) {
    let ShapeKind::Transformed {
        child,
        position,
        rotation,
    } = &a.shape.kind
    else {
        return;
    };
    let Some(shape) = ctx.registry.get(*child) else {
        return;
    };
    let child_args = ShapeArgs {
        shape,
        transform: a
            .transform
            .combine(&Transform::new(*position * a.scale, *rotation)),
        scale: a.scale,
        sub_shape: a.sub_shape,
    };
    ctx.dispatch.collide(ctx, &child_args, b, out);
}

/// Result of sweeping shape A along `delta` against shape B.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCastHit {
    /// Fraction of `delta` travelled at first contact.
    pub fraction: f32,
    pub point: Vec3,
    /// Contact normal from A to B at the hit.
    pub normal: Vec3,
}

/// Conservative-advancement cast of a convex support along `delta`.
pub fn cast_support(
    support_a: &impl Support,
    radius_a: f32,
    support_b: &impl Support,
    radius_b: f32,
    delta: Vec3,
    tolerance: f32,
) -> Option<ShapeCastHit> {
    struct Offset<'s, S> {
        inner: &'s S,
        offset: Vec3,
    }
    impl<S: Support> Support for Offset<'_, S> {
        fn support(&self, direction: Vec3) -> Vec3 {
            self.inner.support(direction) + self.offset
        }
        fn convex_radius(&self) -> f32 {
            self.inner.convex_radius()
        }
    }

    let mut t = 0.0_f32;
    let mut last_axis = Vec3::ZERO;

    for _ in 0..32 {
        let moved = Offset {
            inner: support_a,
            offset: delta * t,
        };
        match gjk_closest(&moved, support_b, delta) {
            GjkResult::Separated {
                distance,
                point_a,
                point_b,
                axis,
            } => {
                let separation = distance - radius_a - radius_b;
                if separation <= tolerance {
                    let contact = 0.5 * ((point_a + axis * radius_a) + (point_b - axis * radius_b));
                    return Some(ShapeCastHit {
                        fraction: t,
                        point: contact,
                        normal: axis,
                    });
                }
                let approach = delta.dot(axis);
                if approach <= 1e-6 {
                    return None;
                }
                t += separation / approach;
                if t > 1.0 {
                    return None;
                }
                last_axis = axis;
            }
            GjkResult::Intersecting { simplex } => {
                // Initial overlap (or overshoot): resolve the normal via EPA.
                let fallback = if last_axis != Vec3::ZERO {
                    last_axis
                } else {
                    delta.normalize_or_zero()
                };
                let (_, normal) = epa_penetration(&moved, support_b, simplex, fallback);
                let contact = moved.support(normal);
                return Some(ShapeCastHit {
                    fraction: t,
                    point: contact,
                    normal,
                });
            }
            GjkResult::Degenerate => return None,
        }
    }
    None
}

/// Casts shape A (swept by `delta`) against shape B, decomposing composite
/// shapes on both sides. Returns the earliest hit.
pub fn cast_shape_vs_shape(
    registry: &ShapeRegistry,
    a: &ShapeArgs,
    delta: Vec3,
    b: &ShapeArgs,
    tolerance: f32,
) -> Option<ShapeCastHit> {
    match &b.shape.kind {
        ShapeKind::Compound { children } => {
            let mut best: Option<ShapeCastHit> = None;
            for child in children {
                let Some(shape) = registry.get(child.shape) else {
                    continue;
                };
                let child_args = ShapeArgs {
                    shape,
                    transform: b.transform.combine(&Transform::new(
                        child.position * b.scale,
                        child.rotation,
                    )),
                    scale: b.scale,
                    sub_shape: b.sub_shape,
                };
                if let Some(hit) = cast_shape_vs_shape(registry, a, delta, &child_args, tolerance)
                {
                    if best.map(|h| hit.fraction < h.fraction).unwrap_or(true) {
                        best = Some(hit);
                    }
                }
            }
            best
        }
        ShapeKind::Scaled { child, scale } => {
            let shape = registry.get(*child)?;
            let child_args = ShapeArgs {
                shape,
                transform: b.transform,
                scale: b.scale * *scale,
                sub_shape: b.sub_shape,
            };
            cast_shape_vs_shape(registry, a, delta, &child_args, tolerance)
        }
        ShapeKind::Transformed {
            child,
            position,
            rotation,
        } => {
            let shape = registry.get(*child)?;
            let child_args = ShapeArgs {
                shape,
                transform: b
                    .transform
                    .combine(&Transform::new(*position * b.scale, *rotation)),
                scale: b.scale,
                sub_shape: b.sub_shape,
            };
            cast_shape_vs_shape(registry, a, delta, &child_args, tolerance)
        }
        ShapeKind::Mesh(mesh) => {
            let support_a = a.support(SupportMode::ExcludeRadius)?;
            let ra = support_a.convex_radius();
            let world_to_mesh = b.transform.inverse();
            let swept = a
                .world_aabb()
                .swept(delta)
                .expanded(tolerance + ra);
            let query = swept
                .transformed(world_to_mesh.position, world_to_mesh.rotation)
                .scaled(Vec3::ONE / b.scale);

            let mut best: Option<ShapeCastHit> = None;
            mesh.visit_overlapping(&query, |tri_index| {
                let local = mesh.triangle_vertices(tri_index);
                let world: [Vec3; 3] = [
                    b.transform.point_to_world(local[0] * b.scale),
                    b.transform.point_to_world(local[1] * b.scale),
                    b.transform.point_to_world(local[2] * b.scale),
                ];
                let triangle = PolygonSupport::new(&world);
                if let Some(mut hit) =
                    cast_support(&support_a, ra, &triangle, 0.0, delta, tolerance)
                {
                    // Prefer the triangle plane normal for face hits.
                    let face_normal = (world[1] - world[0])
                        .cross(world[2] - world[0])
                        .normalize_or_zero();
                    if face_normal != Vec3::ZERO && hit.normal.dot(face_normal) < 0.0 {
                        hit.normal = -face_normal;
                    }
                    if best.map(|h| hit.fraction < h.fraction).unwrap_or(true) {
                        best = Some(hit);
                    }
                }
            });
            best
        }
        ShapeKind::Plane {
            normal, constant, ..
        } => {
            let support_a = a.support(SupportMode::IncludeRadius)?;
            let plane_normal =
                (b.transform.rotation * (*normal / b.scale)).normalize_or_zero();
            let base = b.transform.point_to_world(-*constant * *normal * b.scale);
            // Deepest point of A against the plane at t=0 and its approach.
            let deepest = support_a.support(-plane_normal);
            let start_distance = (deepest - base).dot(plane_normal);
            let approach = -delta.dot(plane_normal);
            if start_distance <= tolerance {
                return Some(ShapeCastHit {
                    fraction: 0.0,
                    point: deepest,
                    normal: -plane_normal,
                });
            }
            if approach <= 1e-6 {
                return None;
            }
            let fraction = (start_distance - tolerance * 0.5) / approach;
            if fraction > 1.0 {
                return None;
            }
            Some(ShapeCastHit {
                fraction,
                point: deepest + delta * fraction,
                normal: -plane_normal,
            })
        }
        _ => {
            // Convex target; decompose A if needed.
            match &a.shape.kind {
                ShapeKind::Compound { children } => {
                    let mut best: Option<ShapeCastHit> = None;
                    for child in children {
                        let Some(shape) = registry.get(child.shape) else {
                            continue;
                        };
                        let child_args = ShapeArgs {
                            shape,
                            transform: a.transform.combine(&Transform::new(
                                child.position * a.scale,
                                child.rotation,
                            )),
                            scale: a.scale,
                            sub_shape: a.sub_shape,
                        };
                        if let Some(hit) =
                            cast_shape_vs_shape(registry, &child_args, delta, b, tolerance)
                        {
                            if best.map(|h| hit.fraction < h.fraction).unwrap_or(true) {
                                best = Some(hit);
                            }
                        }
                    }
                    best
                }
                ShapeKind::Scaled { child, scale } => {
                    let shape = registry.get(*child)?;
                    let child_args = ShapeArgs {
                        shape,
                        transform: a.transform,
                        scale: a.scale * *scale,
                        sub_shape: a.sub_shape,
                    };
                    cast_shape_vs_shape(registry, &child_args, delta, b, tolerance)
                }
                ShapeKind::Transformed {
                    child,
                    position,
                    rotation,
                } => {
                    let shape = registry.get(*child)?;
                    let child_args = ShapeArgs {
                        shape,
                        transform: a
                            .transform
                            .combine(&Transform::new(*position * a.scale, *rotation)),
                        scale: a.scale,
                        sub_shape: a.sub_shape,
                    };
                    cast_shape_vs_shape(registry, &child_args, delta, b, tolerance)
                }
                _ => {
                    let support_a = a.support(SupportMode::ExcludeRadius)?;
                    let support_b = b.support(SupportMode::ExcludeRadius)?;
                    cast_support(
                        &support_a,
                        support_a.convex_radius(),
                        &support_b,
                        support_b.convex_radius(),
                        delta,
                        tolerance,
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::ShapeRegistry;
    use glam::Quat;

    fn args<'a>(shape: &'a Shape, position: Vec3) -> ShapeArgs<'a> {
        ShapeArgs::new(shape, Transform::from_position(position))
    }

    fn ctx<'a>(registry: &'a ShapeRegistry, dispatch: &'a CollideDispatch) -> CollideContext<'a> {
        CollideContext {
            registry,
            dispatch,
            settings: CollideSettings {
                max_separation: 0.02,
                manifold_tolerance: 1.0e-3,
                normal_cos_max_delta: 0.999,
            },
            edge_removal: false,
        }
    }

    fn collide_once(
        registry: &ShapeRegistry,
        a: &Shape,
        pa: Vec3,
        b: &Shape,
        pb: Vec3,
    ) -> Vec<crate::collision::manifold::ContactManifold> {
        let dispatch = CollideDispatch::with_default_shapes();
        let context = ctx(registry, &dispatch);
        let mut acc = ManifoldAccumulator::new(pa, 0.999, context.settings.max_contact_distance());
        collide_shapes(&context, &args(a, pa), &args(b, pb), &mut acc);
        acc.finalize(true)
    }

    #[test]
    fn overlapping_spheres_have_expected_depth_and_normal() {
        let mut registry = ShapeRegistry::new();
        let s = registry.sphere(1.0).unwrap();
        let shape = registry.get(s).unwrap().clone();

        let manifolds = collide_once(
            &registry,
            &shape,
            Vec3::ZERO,
            &shape,
            Vec3::new(1.5, 0.0, 0.0),
        );
        assert_eq!(manifolds.len(), 1);
        let m = &manifolds[0];
        assert!((m.penetration - 0.5).abs() < 1e-4, "depth {}", m.penetration);
        assert!(m.normal.x > 0.99);
        assert_eq!(m.point_count(), 1);
    }

    #[test]
    fn separated_spheres_produce_nothing() {
        let mut registry = ShapeRegistry::new();
        let s = registry.sphere(1.0).unwrap();
        let shape = registry.get(s).unwrap().clone();
        let manifolds = collide_once(
            &registry,
            &shape,
            Vec3::ZERO,
            &shape,
            Vec3::new(3.0, 0.0, 0.0),
        );
        assert!(manifolds.is_empty());
    }

    #[test]
    fn nearby_spheres_produce_a_speculative_contact() {
        let mut registry = ShapeRegistry::new();
        let s = registry.sphere(1.0).unwrap();
        let shape = registry.get(s).unwrap().clone();
        let manifolds = collide_once(
            &registry,
            &shape,
            Vec3::ZERO,
            &shape,
            Vec3::new(2.01, 0.0, 0.0),
        );
        assert_eq!(manifolds.len(), 1);
        assert!(manifolds[0].penetration < 0.0);
        assert!(manifolds[0].separation(0) > 0.0);
    }

    #[test]
    fn box_on_box_produces_a_face_manifold() {
        let mut registry = ShapeRegistry::new();
        let b = registry.cuboid(Vec3::splat(0.5)).unwrap();
        let shape = registry.get(b).unwrap().clone();

        // Stacked with slight overlap.
        let manifolds = collide_once(
            &registry,
            &shape,
            Vec3::ZERO,
            &shape,
            Vec3::new(0.0, 0.99, 0.0),
        );
        assert_eq!(manifolds.len(), 1);
        let m = &manifolds[0];
        assert!(m.normal.y > 0.99, "normal {:?}", m.normal);
        assert!(m.point_count() >= 3, "points {}", m.point_count());
        assert!((m.penetration - 0.01).abs() < 2e-3, "depth {}", m.penetration);
    }

    #[test]
    fn rotated_boxes_still_collide() {
        let mut registry = ShapeRegistry::new();
        let b = registry.cuboid(Vec3::ONE).unwrap();
        let shape = registry.get(b).unwrap().clone();

        let dispatch = CollideDispatch::with_default_shapes();
        let context = ctx(&registry, &dispatch);
        let mut acc = ManifoldAccumulator::new(Vec3::ZERO, 0.999, 0.021);
        let a_args = ShapeArgs {
            shape: &shape,
            transform: Transform::new(
                Vec3::ZERO,
                Quat::from_rotation_z(45.0_f32.to_radians()),
            ),
            scale: Vec3::ONE,
            sub_shape: SubShapeId::ROOT,
        };
        let b_args = args(&shape, Vec3::new(2.1, 0.0, 0.0));
        collide_shapes(&context, &a_args, &b_args, &mut acc);
        let manifolds = acc.finalize(true);
        assert!(!manifolds.is_empty(), "rotated boxes should touch");
        assert!(manifolds[0].normal.x.abs() > 0.7);
    }

    #[test]
    fn sphere_box_contact_point_is_on_the_box() {
        let mut registry = ShapeRegistry::new();
        let sphere = registry.sphere(0.5).unwrap();
        let cuboid = registry.cuboid(Vec3::splat(1.0)).unwrap();
        let sphere_shape = registry.get(sphere).unwrap().clone();
        let box_shape = registry.get(cuboid).unwrap().clone();

        let manifolds = collide_once(
            &registry,
            &sphere_shape,
            Vec3::new(0.0, 1.4, 0.0),
            &box_shape,
            Vec3::ZERO,
        );
        assert_eq!(manifolds.len(), 1);
        let m = &manifolds[0];
        // Sphere above, box below: normal from sphere to box points down.
        assert!(m.normal.y < -0.99);
        let pb = m.world_point_b(0);
        assert!((pb.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn gjk_reports_distance_between_separated_boxes() {
        let kind = ShapeKind::Box {
            half_extents: Vec3::splat(0.5),
            convex_radius: 0.0,
        };
        let core = ConvexSupport::new(&kind, SupportMode::IncludeRadius).unwrap();
        let sa = TransformedSupport::new(core, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE);
        let sb = TransformedSupport::new(
            core,
            Vec3::new(2.0, 0.0, 0.0),
            Quat::IDENTITY,
            Vec3::ONE,
        );
        match gjk_closest(&sa, &sb, Vec3::X) {
            GjkResult::Separated { distance, axis, .. } => {
                assert!((distance - 1.0).abs() < 1e-3, "distance {distance}");
                assert!(axis.x > 0.99);
            }
            other => panic!("expected separation, got {other:?}"),
        }
    }

    #[test]
    fn cast_sphere_stops_at_the_wall() {
        // Thin wall in the xy plane; the sphere sweeps along +z into it.
        let sphere = ShapeKind::Sphere { radius: 0.2 };
        let wall = ShapeKind::Box {
            half_extents: Vec3::new(5.0, 5.0, 0.1),
            convex_radius: 0.0,
        };
        let sphere_support = TransformedSupport::new(
            ConvexSupport::new(&sphere, SupportMode::ExcludeRadius).unwrap(),
            Vec3::new(0.0, 0.0, -10.0),
            Quat::IDENTITY,
            Vec3::ONE,
        );
        let wall_support = TransformedSupport::new(
            ConvexSupport::new(&wall, SupportMode::IncludeRadius).unwrap(),
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::ONE,
        );

        let hit = cast_support(
            &sphere_support,
            0.2,
            &wall_support,
            0.0,
            Vec3::new(0.0, 0.0, 20.0),
            1e-3,
        )
        .expect("sphere should hit the wall");
        // Surface contact at z = -0.1 - 0.2, i.e. after 9.7 of 20 units.
        assert!(
            (hit.fraction - 9.7 / 20.0).abs() < 5e-3,
            "fraction {}",
            hit.fraction
        );
        assert!(hit.normal.z > 0.9);
    }
}

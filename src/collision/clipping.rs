use glam::Vec3;

const EPSILON: f32 = 1e-6;
const DISTANCE_EPSILON: f32 = 1e-4;

/// Oriented plane; points with negative signed distance are inside.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    normal: Vec3,
    distance: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Clips the polygon against a set of planes with the Sutherland–Hodgman
/// algorithm, keeping the inside (negative) half spaces.
pub fn clip_polygon(vertices: &[Vec3], planes: &[Plane]) -> Vec<Vec3> {
    let mut output = vertices.to_vec();
    for plane in planes {
        output = clip_against_plane(&output, *plane);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[Vec3], plane: Plane) -> Vec<Vec3> {
    if vertices.is_empty() {
        return Vec::new();
    }
    if vertices.len() == 1 {
        return if plane.signed_distance(vertices[0]) <= DISTANCE_EPSILON {
            vertices.to_vec()
        } else {
            Vec::new()
        };
    }

    let mut clipped = Vec::with_capacity(vertices.len() + 1);
    for i in 0..vertices.len() {
        let current = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];

        let current_dist = plane.signed_distance(current);
        let next_dist = plane.signed_distance(next);

        let current_inside = current_dist <= DISTANCE_EPSILON;
        let next_inside = next_dist <= DISTANCE_EPSILON;

        if current_inside && next_inside {
            clipped.push(next);
        } else if current_inside != next_inside {
            match edge_plane_intersection(current, next, current_dist, next_dist) {
                Some(intersection) => {
                    clipped.push(intersection);
                    if next_inside {
                        clipped.push(next);
                    }
                }
                // Edge numerically parallel to the plane: keep the endpoint on
                // the same side as its predecessor rather than dropping it.
                None => {
                    if current_inside {
                        clipped.push(next);
                    }
                }
            }
        }
    }

    clipped
}

fn edge_plane_intersection(
    start: Vec3,
    end: Vec3,
    start_dist: f32,
    end_dist: f32,
) -> Option<Vec3> {
    let denom = start_dist - end_dist;
    if denom.abs() <= EPSILON {
        return None;
    }
    let t = (start_dist / denom).clamp(0.0, 1.0);
    Some(start + (end - start) * t)
}

/// Side planes of a convex reference face, facing inward so the clip keeps
/// points above the face's footprint.
pub fn face_side_planes(face: &[Vec3], face_normal: Vec3) -> Vec<Plane> {
    let mut planes = Vec::with_capacity(face.len());
    if face.len() < 2 {
        return planes;
    }
    if face.len() == 2 {
        // An edge clips against the two capping planes at its endpoints.
        let axis = (face[1] - face[0]).normalize_or_zero();
        planes.push(Plane::from_point_normal(face[0], -axis));
        planes.push(Plane::from_point_normal(face[1], axis));
        return planes;
    }

    let centroid = face.iter().copied().sum::<Vec3>() / face.len() as f32;
    for i in 0..face.len() {
        let a = face[i];
        let b = face[(i + 1) % face.len()];
        let edge = b - a;
        let mut normal = edge.cross(face_normal);
        // Zero-area edges contribute no plane.
        if normal.length_squared() < EPSILON {
            continue;
        }
        // Orient outward: the centroid must be inside.
        if normal.dot(centroid - a) > 0.0 {
            normal = -normal;
        }
        planes.push(Plane::from_point_normal(a, normal));
    }
    planes
}

/// Clips the incident face against the side planes of the reference face.
/// Both faces are in world space; `reference_normal` points out of the
/// reference shape. Returns the surviving incident points.
pub fn clip_face_vs_face(
    incident: &[Vec3],
    reference: &[Vec3],
    reference_normal: Vec3,
) -> Vec<Vec3> {
    if incident.is_empty() || reference.len() < 2 {
        return incident.to_vec();
    }
    let planes = face_side_planes(reference, reference_normal);
    clip_polygon(incident, &planes)
}

//! Ray/triangle and ray/box tests.

use glam::{Vec2, Vec3A};

use crate::gpu::layout::GpuVertex;
use crate::ray::Ray;

/// Hits closer than this to the ray origin are ignored (self-intersection).
pub const MIN_HIT_DISTANCE: f32 = 0.001;
/// Relative determinant tolerance for grazing and degenerate triangles.
pub const DETERMINANT_TOLERANCE: f32 = 0.01;

/// Surface point found by a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Distance along the (unit) ray direction
    pub distance: f32,
    pub position: Vec3A,
    /// Interpolated shading normal
    pub normal: Vec3A,
    /// Direction of increasing U
    pub tangent: Vec3A,
    /// Direction of increasing V
    pub bitangent: Vec3A,
    pub uv: Vec2,
    /// The ray arrived against the winding-order normal
    pub front_face: bool,
    pub material_id: u32,
}

/// Determinant-based ray/triangle test.
///
/// Rejects hits nearer than [`MIN_HIT_DISTANCE`] and triangles that are seen
/// edge-on relative to their size. Returns the hit with interpolated normal,
/// UV and a UV-gradient tangent frame; `material_id` is left at 0.
pub fn intersect_triangle(
    ray: &Ray,
    v0: &GpuVertex,
    v1: &GpuVertex,
    v2: &GpuVertex,
) -> Option<SurfaceHit> {
    let p0 = Vec3A::from_array(v0.position);
    let edge1 = Vec3A::from_array(v1.position) - p0;
    let edge2 = Vec3A::from_array(v2.position) - p0;
    let normal = edge1.cross(edge2);
    let det = -ray.direction.dot(normal);
    if det.abs() <= normal.length() * DETERMINANT_TOLERANCE {
        return None;
    }

    let ao = ray.origin - p0;
    let dao = ao.cross(ray.direction);
    let inv_det = 1.0 / det;
    let distance = ao.dot(normal) * inv_det;
    let u = edge2.dot(dao) * inv_det;
    let v = -edge1.dot(dao) * inv_det;
    let w = 1.0 - u - v;
    if distance <= MIN_HIT_DISTANCE || u < 0.0 || v < 0.0 || w < 0.0 {
        return None;
    }

    let uv0 = Vec2::new(v0.u, v0.v);
    let uv1 = Vec2::new(v1.u, v1.v);
    let uv2 = Vec2::new(v2.u, v2.v);
    let normal_interp = (Vec3A::from_array(v0.normal) * w
        + Vec3A::from_array(v1.normal) * u
        + Vec3A::from_array(v2.normal) * v)
        .normalize_or(normal.normalize());
    let (tangent, bitangent) = uv_tangent_frame(edge1, edge2, uv1 - uv0, uv2 - uv0, normal_interp);

    Some(SurfaceHit {
        distance,
        position: ray.at(distance),
        normal: normal_interp,
        tangent,
        bitangent,
        uv: uv0 * w + uv1 * u + uv2 * v,
        front_face: det >= 0.0,
        material_id: 0,
    })
}

/// Tangent and bitangent following the UV gradient, or an arbitrary
/// orthonormal pair when the UV mapping is degenerate.
fn uv_tangent_frame(
    edge1: Vec3A,
    edge2: Vec3A,
    duv1: Vec2,
    duv2: Vec2,
    normal: Vec3A,
) -> (Vec3A, Vec3A) {
    let det_uv = duv1.x * duv2.y - duv1.y * duv2.x;
    if det_uv.abs() > 1e-12 {
        let inv = 1.0 / det_uv;
        let tangent = ((edge1 * duv2.y - edge2 * duv1.y) * inv).normalize_or_zero();
        let bitangent = ((edge2 * duv1.x - edge1 * duv2.x) * inv).normalize_or_zero();
        if tangent != Vec3A::ZERO && bitangent != Vec3A::ZERO {
            return (tangent, bitangent);
        }
    }
    let tangent = normal.any_orthonormal_vector();
    (tangent, normal.cross(tangent))
}

/// Slab test. Returns `(near, far)` when the ray's line crosses the box in
/// front of the origin.
#[inline]
pub fn intersect_aabb(ray: &Ray, min: Vec3A, max: Vec3A) -> Option<(f32, f32)> {
    let t0 = (min - ray.origin) * ray.inv_direction;
    let t1 = (max - ray.origin) * ray.inv_direction;
    let near = t0.min(t1).max_element();
    let far = t0.max(t1).min_element();
    (near <= far && far >= 0.0).then_some((near, far))
}

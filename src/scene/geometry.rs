//! Geometry store records: vertices, triangles, meshes and their instances.

use glam::{Mat4, Vec2, Vec3};

use crate::bvh::Aabb;

/// Mesh vertex. Normals are kept unit length.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal: normal.normalize_or(Vec3::Y),
            uv,
        }
    }
}

/// Three indices into the scene vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triangle {
    pub indices: [u32; 3],
}

impl Triangle {
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self { indices: [a, b, c] }
    }
}

/// A contiguous triangle range with its own BLAS region.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    /// First triangle in the scene triangle array
    pub triangle_offset: u32,
    pub triangle_count: u32,
    /// Root of this mesh's BLAS in the scene node array
    pub node_offset: u32,
    pub node_count: u32,
    /// Object-space bounds
    pub bounds: Aabb,
}

/// Placement of a mesh in the world.
///
/// The inverse transform is cached and only ever updated together with the
/// forward transform, so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    pub mesh_id: u32,
    pub material_id: u32,
    transform: Mat4,
    transform_inverse: Mat4,
}

impl MeshInstance {
    pub fn new(mesh_id: u32, material_id: u32, transform: Mat4) -> Self {
        Self {
            mesh_id,
            material_id,
            transform,
            transform_inverse: transform.inverse(),
        }
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn transform_inverse(&self) -> Mat4 {
        self.transform_inverse
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.transform_inverse = transform.inverse();
    }

    /// False for singular or non-finite transforms.
    pub fn is_invertible(&self) -> bool {
        self.transform.is_finite()
            && self.transform.determinant() != 0.0
            && self.transform_inverse.is_finite()
    }

    /// World-space bounds of `mesh` placed by this instance.
    pub fn world_bounds(&self, mesh: &Mesh) -> Aabb {
        mesh.bounds.transformed(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn cached_inverse_round_trips() {
        let mut instance = MeshInstance::new(0, 0, Mat4::IDENTITY);
        instance.set_transform(Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 0.5, 3.0),
            Quat::from_euler(glam::EulerRot::YXZ, 0.3, -1.1, 0.7),
            Vec3::new(-4.0, 1.0, 8.0),
        ));
        let composed = instance.transform_inverse() * instance.transform();
        for p in [Vec3::ZERO, Vec3::new(1.0, -2.0, 3.0), Vec3::splat(100.0)] {
            assert!(composed.transform_point3(p).abs_diff_eq(p, 1e-3));
        }
    }

    #[test]
    fn vertex_normal_is_normalized() {
        let v = Vertex::new(Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0), Vec2::ZERO);
        assert!((v.normal.length() - 1.0).abs() < 1e-6);
    }
}

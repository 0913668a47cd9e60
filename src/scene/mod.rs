//! Scene aggregate: geometry store, BLAS regions, materials, textures,
//! instances and default cameras.
//!
//! Vertices, triangles and meshes are append-only; adding a mesh builds its
//! BLAS once. Instances and materials may be edited freely afterwards and are
//! uploaded independently of the geometry.

pub mod camera;
pub mod environment;
pub mod geometry;
pub mod material;
pub mod procedural;
pub mod texture;

pub use camera::Camera;
pub use environment::Environment;
pub use geometry::{Mesh, MeshInstance, Triangle, Vertex};
pub use material::{Material, NO_TEXTURE};
pub use texture::TextureArray;

use glam::Mat4;
use image::Rgba32FImage;
use log::debug;

use crate::bvh::{blas, Aabb, BvhNode};
use crate::error::SceneError;

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub meshes: Vec<Mesh>,
    /// BLAS nodes of every mesh, one region per mesh
    pub blas_nodes: Vec<BvhNode>,
    pub instances: Vec<MeshInstance>,
    pub materials: Vec<Material>,
    pub textures: Vec<Rgba32FImage>,
    pub cameras: Vec<Camera>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a mesh and build its BLAS. Triangle indices are relative to
    /// `vertices`. Returns the mesh id.
    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        vertices: &[Vertex],
        triangles: &[Triangle],
    ) -> Result<u32, SceneError> {
        if triangles.is_empty() {
            return Err(SceneError::EmptyMesh);
        }
        for (i, triangle) in triangles.iter().enumerate() {
            let dangling = triangle.indices.iter().find(|&&v| v as usize >= vertices.len());
            if let Some(&vertex) = dangling {
                return Err(SceneError::VertexOutOfRange {
                    triangle: i,
                    vertex,
                    count: vertices.len(),
                });
            }
        }

        let vertex_offset = self.vertices.len() as u32;
        let triangle_offset = self.triangles.len();
        self.vertices.extend_from_slice(vertices);
        self.triangles.extend(triangles.iter().map(|t| {
            Triangle::new(
                t.indices[0] + vertex_offset,
                t.indices[1] + vertex_offset,
                t.indices[2] + vertex_offset,
            )
        }));

        let built = blas::build(&self.vertices, &mut self.triangles[triangle_offset..]);
        let node_offset = self.blas_nodes.len() as u32;
        let node_count = built.nodes.len() as u32;
        self.blas_nodes.extend(built.nodes);

        let name = name.into();
        debug!(
            "Mesh '{}': {} triangles, {} BLAS nodes",
            name,
            triangles.len(),
            node_count
        );
        self.meshes.push(Mesh {
            name,
            triangle_offset: triangle_offset as u32,
            triangle_count: triangles.len() as u32,
            node_offset,
            node_count,
            bounds: built.bounds,
        });
        Ok(self.meshes.len() as u32 - 1)
    }

    /// Place a mesh in the world. Returns the instance id.
    pub fn add_instance(&mut self, mesh_id: u32, material_id: u32, transform: Mat4) -> u32 {
        self.instances
            .push(MeshInstance::new(mesh_id, material_id, transform));
        self.instances.len() as u32 - 1
    }

    /// Add a material, reusing an identical existing one. Returns its id.
    pub fn add_material(&mut self, material: Material) -> u32 {
        if let Some(existing) = self.materials.iter().position(|m| *m == material) {
            return existing as u32;
        }
        self.materials.push(material);
        self.materials.len() as u32 - 1
    }

    /// Returns the texture id to store in a material slot.
    pub fn add_texture(&mut self, texture: Rgba32FImage) -> i32 {
        self.textures.push(texture);
        self.textures.len() as i32 - 1
    }

    /// World-space bounds per instance, in instance order.
    pub fn instance_bounds(&self) -> Vec<Aabb> {
        self.instances
            .iter()
            .map(|instance| match self.meshes.get(instance.mesh_id as usize) {
                Some(mesh) => instance.world_bounds(mesh),
                None => Aabb::empty(),
            })
            .collect()
    }

    /// Check every cross reference once, before upload.
    pub fn validate(&self) -> Result<(), SceneError> {
        for (i, triangle) in self.triangles.iter().enumerate() {
            if let Some(&vertex) = triangle
                .indices
                .iter()
                .find(|&&v| v as usize >= self.vertices.len())
            {
                return Err(SceneError::VertexOutOfRange {
                    triangle: i,
                    vertex,
                    count: self.vertices.len(),
                });
            }
        }
        for (i, material) in self.materials.iter().enumerate() {
            if let Some(&texture) = material
                .texture_ids()
                .iter()
                .find(|&&t| t != NO_TEXTURE && (t < 0 || t as usize >= self.textures.len()))
            {
                return Err(SceneError::TextureOutOfRange {
                    material: i,
                    texture,
                    count: self.textures.len(),
                });
            }
        }
        for (i, mesh) in self.meshes.iter().enumerate() {
            let end = mesh.triangle_offset as usize + mesh.triangle_count as usize;
            if end > self.triangles.len() {
                return Err(SceneError::TriangleRangeOutOfBounds {
                    mesh: i,
                    end,
                    count: self.triangles.len(),
                });
            }
            let end = mesh.node_offset as usize + mesh.node_count as usize;
            if end > self.blas_nodes.len() {
                return Err(SceneError::NodeRangeOutOfBounds {
                    mesh: i,
                    end,
                    count: self.blas_nodes.len(),
                });
            }
        }
        for (i, instance) in self.instances.iter().enumerate() {
            if !instance.is_invertible() {
                return Err(SceneError::SingularTransform { instance: i });
            }
            if instance.mesh_id as usize >= self.meshes.len() {
                return Err(SceneError::MeshOutOfRange {
                    instance: i,
                    mesh: instance.mesh_id,
                    count: self.meshes.len(),
                });
            }
            if instance.material_id as usize >= self.materials.len() {
                return Err(SceneError::MaterialOutOfRange {
                    instance: i,
                    material: instance.material_id,
                    count: self.materials.len(),
                });
            }
        }
        Ok(())
    }

    /// First camera, or the default one when the scene has none.
    pub fn default_camera(&self) -> Camera {
        self.cameras.first().copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    fn triangle_mesh() -> (Vec<Vertex>, Vec<Triangle>) {
        let v = |x, y| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::new(x, y));
        (vec![v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)], vec![Triangle::new(0, 1, 2)])
    }

    #[test]
    fn meshes_get_disjoint_ranges() {
        let mut scene = Scene::new("test");
        let (vertices, triangles) = triangle_mesh();
        let a = scene.add_mesh("a", &vertices, &triangles).unwrap();
        let b = scene.add_mesh("b", &vertices, &triangles).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(scene.meshes[1].triangle_offset, 1);
        assert_eq!(scene.meshes[1].node_offset, 1);
        assert_eq!(scene.triangles[1].indices, [3, 4, 5]);
    }

    #[test]
    fn identical_materials_are_shared() {
        let mut scene = Scene::new("test");
        let a = scene.add_material(Material::matte(Vec3::ONE, 0.0));
        let b = scene.add_material(Material::mirror());
        let c = scene.add_material(Material::matte(Vec3::ONE, 0.0));
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(scene.materials.len(), 2);
    }

    #[test]
    fn validate_catches_dangling_ids() {
        let mut scene = Scene::new("test");
        let (vertices, triangles) = triangle_mesh();
        let mesh = scene.add_mesh("a", &vertices, &triangles).unwrap();
        let material = scene.add_material(Material {
            albedo_texture: 0,
            ..Default::default()
        });
        scene.add_instance(mesh, material, Mat4::IDENTITY);
        assert!(matches!(
            scene.validate(),
            Err(SceneError::TextureOutOfRange { texture: 0, .. })
        ));

        scene.add_texture(Rgba32FImage::new(1, 1));
        assert_eq!(scene.validate(), Ok(()));

        scene.add_instance(mesh, 7, Mat4::IDENTITY);
        assert!(matches!(
            scene.validate(),
            Err(SceneError::MaterialOutOfRange { instance: 1, .. })
        ));
    }

    #[test]
    fn validate_catches_broken_mesh_ranges() {
        let mut scene = Scene::new("test");
        let (vertices, triangles) = triangle_mesh();
        scene.add_mesh("a", &vertices, &triangles).unwrap();
        assert_eq!(scene.validate(), Ok(()));

        scene.meshes[0].triangle_count = 4;
        assert_eq!(
            scene.validate(),
            Err(SceneError::TriangleRangeOutOfBounds {
                mesh: 0,
                end: 4,
                count: 1
            })
        );

        scene.meshes[0].triangle_count = 1;
        scene.meshes[0].node_offset = scene.blas_nodes.len() as u32;
        assert!(matches!(
            scene.validate(),
            Err(SceneError::NodeRangeOutOfBounds { mesh: 0, .. })
        ));
    }

    #[test]
    fn validate_catches_singular_transforms() {
        let mut scene = Scene::new("test");
        let (vertices, triangles) = triangle_mesh();
        let mesh = scene.add_mesh("a", &vertices, &triangles).unwrap();
        let material = scene.add_material(Material::default());
        scene.add_instance(mesh, material, Mat4::from_scale(Vec3::splat(1e-3)));
        assert_eq!(scene.validate(), Ok(()));

        scene.add_instance(mesh, material, Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)));
        assert_eq!(
            scene.validate(),
            Err(SceneError::SingularTransform { instance: 1 })
        );

        scene.instances[1].set_transform(Mat4::from_translation(Vec3::splat(f32::NAN)));
        assert_eq!(
            scene.validate(),
            Err(SceneError::SingularTransform { instance: 1 })
        );

        scene.instances[1].set_transform(Mat4::IDENTITY);
        assert_eq!(scene.validate(), Ok(()));
    }

    #[test]
    fn bad_mesh_input_is_rejected() {
        let mut scene = Scene::new("test");
        let (vertices, _) = triangle_mesh();
        assert_eq!(scene.add_mesh("e", &vertices, &[]), Err(SceneError::EmptyMesh));
        assert!(matches!(
            scene.add_mesh("bad", &vertices, &[Triangle::new(0, 1, 9)]),
            Err(SceneError::VertexOutOfRange { vertex: 9, .. })
        ));
        assert!(scene.vertices.is_empty());
    }
}

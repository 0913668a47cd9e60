//! Device-side record layouts.
//!
//! Every record is `#[repr(C)]`, `Pod`, and a multiple of 16 bytes, and
//! mirrors a struct of the same name in `shaders/trace.comp` (std430).
//! Id fields of materials, meshes and instances are stored as `f32` so each
//! record is made of a single scalar type with a uniform stride; ids stay
//! exact up to 2^24.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

use crate::bvh::BvhNode;
use crate::scene::{Camera, Environment, Material, Mesh, MeshInstance, Triangle, Vertex};

/// Position with U, normal with V.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub u: f32,
    pub normal: [f32; 3],
    pub v: f32,
}

impl From<&Vertex> for GpuVertex {
    fn from(vertex: &Vertex) -> Self {
        Self {
            position: vertex.position.to_array(),
            u: vertex.uv.x,
            normal: vertex.normal.to_array(),
            v: vertex.uv.y,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub indices: [u32; 3],
    pub _padding: u32,
}

impl From<&Triangle> for GpuTriangle {
    fn from(triangle: &Triangle) -> Self {
        Self {
            indices: triangle.indices,
            _padding: 0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMesh {
    pub triangle_offset: f32,
    pub triangle_count: f32,
    pub node_offset: f32,
    pub node_count: f32,
}

impl From<&Mesh> for GpuMesh {
    fn from(mesh: &Mesh) -> Self {
        Self {
            triangle_offset: mesh.triangle_offset as f32,
            triangle_count: mesh.triangle_count as f32,
            node_offset: mesh.node_offset as f32,
            node_count: mesh.node_count as f32,
        }
    }
}

/// Instance record, stored in TLAS leaf order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuInstance {
    /// Column-major object-to-world matrix
    pub transform: [f32; 16],
    /// Column-major world-to-object matrix
    pub transform_inverse: [f32; 16],
    pub mesh_id: f32,
    pub material_id: f32,
    /// Root of the mesh's BLAS in the node buffer
    pub node_offset: f32,
    /// First triangle of the mesh in the triangle buffer
    pub triangle_offset: f32,
}

impl GpuInstance {
    pub fn new(instance: &MeshInstance, mesh: &Mesh) -> Self {
        Self {
            transform: instance.transform().to_cols_array(),
            transform_inverse: instance.transform_inverse().to_cols_array(),
            mesh_id: instance.mesh_id as f32,
            material_id: instance.material_id as f32,
            node_offset: mesh.node_offset as f32,
            triangle_offset: mesh.triangle_offset as f32,
        }
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_cols_array(&self.transform)
    }

    pub fn transform_inverse(&self) -> Mat4 {
        Mat4::from_cols_array(&self.transform_inverse)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub albedo: [f32; 3],
    pub roughness: f32,
    pub metalness_color: [f32; 3],
    pub metalness: f32,
    pub emission: [f32; 3],
    pub emission_strength: f32,
    pub fresnel_color: [f32; 3],
    pub fresnel_strength: f32,
    pub ior: f32,
    pub density: f32,
    pub albedo_texture: f32,
    pub metalness_texture: f32,
    pub roughness_texture: f32,
    pub emission_texture: f32,
    pub normal_texture: f32,
    pub _padding: f32,
}

impl From<&Material> for GpuMaterial {
    fn from(m: &Material) -> Self {
        Self {
            albedo: m.albedo.to_array(),
            roughness: m.roughness,
            metalness_color: m.metalness_color.to_array(),
            metalness: m.metalness,
            emission: m.emission.to_array(),
            emission_strength: m.emission_strength,
            fresnel_color: m.fresnel_color.to_array(),
            fresnel_strength: m.fresnel_strength,
            ior: m.ior,
            density: m.density,
            albedo_texture: m.albedo_texture as f32,
            metalness_texture: m.metalness_texture as f32,
            roughness_texture: m.roughness_texture as f32,
            emission_texture: m.emission_texture as f32,
            normal_texture: m.normal_texture as f32,
            _padding: 0.0,
        }
    }
}

/// BVH nodes are already laid out for the device.
pub type GpuBvhNode = BvhNode;

/// Parameters of one trace dispatch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TraceUniforms {
    pub camera_position: [f32; 3],
    /// Horizontal field of view in radians
    pub camera_fov: f32,
    pub camera_forward: [f32; 3],
    pub camera_focal_distance: f32,
    pub camera_up: [f32; 3],
    pub camera_aperture: f32,
    /// Columns of the environment rotation, w unused
    pub environment_rotation: [[f32; 4]; 3],
    pub environment_color: [f32; 3],
    pub environment_intensity: f32,
    pub rect_offset: [u32; 2],
    pub rect_size: [u32; 2],
    pub image_size: [u32; 2],
    pub frame_index: u32,
    pub max_bounce_count: u32,
    pub min_render_distance: f32,
    pub max_render_distance: f32,
    pub camera_blur: f32,
    /// 1 when escaping primary rays write alpha 0
    pub environment_transparent: u32,
    pub environment_size: [u32; 2],
    pub texture_size: [u32; 2],
    pub texture_layers: u32,
    pub tlas_node_count: u32,
    pub _padding: [u32; 2],
}

impl TraceUniforms {
    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera_position = camera.position.to_array();
        self.camera_fov = camera.fov;
        self.camera_forward = camera.forward.to_array();
        self.camera_focal_distance = camera.focal_distance;
        self.camera_up = camera.up.to_array();
        self.camera_aperture = camera.aperture;
        self.camera_blur = camera.blur;
    }

    pub fn set_environment(&mut self, environment: &Environment) {
        let rotation = environment.rotation;
        self.environment_rotation = [
            rotation.x_axis.extend(0.0).to_array(),
            rotation.y_axis.extend(0.0).to_array(),
            rotation.z_axis.extend(0.0).to_array(),
        ];
        self.environment_color = environment.color.to_array();
        self.environment_intensity = environment.intensity;
        self.environment_transparent = environment.transparent as u32;
        let (width, height) = environment.dimensions();
        self.environment_size = [width, height];
    }

    pub fn environment_rotation(&self) -> Mat3 {
        let [x, y, z] = self.environment_rotation;
        Mat3::from_cols(
            glam::Vec3::new(x[0], x[1], x[2]),
            glam::Vec3::new(y[0], y[1], y[2]),
            glam::Vec3::new(z[0], z[1], z[2]),
        )
    }
}

/// Parameters of one tone-mapping dispatch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ToneMapUniforms {
    pub rect_offset: [u32; 2],
    pub rect_size: [u32; 2],
    pub image_size: [u32; 2],
    /// Number of samples summed in the accumulation image
    pub sample_count: u32,
    /// [`crate::tonemap::ToneMapMode`] discriminant
    pub mode: u32,
    pub gamma: f32,
    pub _padding: [f32; 3],
}

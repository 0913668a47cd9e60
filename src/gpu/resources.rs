//! Device-resident scene state.
//!
//! [`GpuResources`] exclusively owns a [`ComputeDevice`] together with the
//! scene-dependent dispatch parameters (TLAS size, texture and environment
//! extents). Geometry is uploaded once per scene; materials and instances can
//! be re-uploaded on their own.

use std::time::Instant;

use bytemuck::cast_slice;
use log::{debug, info};

use super::device::{ComputeDevice, ImageKind, SceneBuffer};
use super::layout::{
    GpuInstance, GpuMaterial, GpuMesh, GpuTriangle, GpuVertex, TraceUniforms,
};
use crate::bvh::tlas;
use crate::error::{RenderError, RenderResult};
use crate::scene::{Environment, Scene, TextureArray};

pub struct GpuResources {
    device: Box<dyn ComputeDevice>,
    size: [u32; 2],
    /// Scene-dependent part of every trace dispatch
    scene_uniforms: TraceUniforms,
}

impl GpuResources {
    /// Take ownership of `device` and allocate output images.
    pub fn new(
        mut device: Box<dyn ComputeDevice>,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        info!("Compute device: {}", device.name());
        device.allocate_images(width, height)?;
        let mut resources = Self {
            device,
            size: [width, height],
            scene_uniforms: TraceUniforms::default(),
        };
        resources.set_environment(&Environment::default())?;
        Ok(resources)
    }

    /// Full upload of geometry, BLAS, textures, materials, instances and TLAS.
    pub fn load_scene(&mut self, scene: &Scene) -> RenderResult<()> {
        let start = Instant::now();
        let vertices: Vec<GpuVertex> = scene.vertices.iter().map(GpuVertex::from).collect();
        let triangles: Vec<GpuTriangle> =
            scene.triangles.iter().map(GpuTriangle::from).collect();
        let meshes: Vec<GpuMesh> = scene.meshes.iter().map(GpuMesh::from).collect();
        self.device.upload(SceneBuffer::Vertices, cast_slice(&vertices))?;
        self.device.upload(SceneBuffer::Triangles, cast_slice(&triangles))?;
        self.device.upload(SceneBuffer::Meshes, cast_slice(&meshes))?;
        self.device.upload(SceneBuffer::BlasNodes, cast_slice(&scene.blas_nodes))?;

        let textures = TextureArray::pack(&scene.textures);
        self.device.upload(SceneBuffer::Textures, cast_slice(&textures.texels))?;
        self.scene_uniforms.texture_size = [textures.width, textures.height];
        self.scene_uniforms.texture_layers = textures.layers;

        self.update_materials(scene)?;
        self.update_instances(scene)?;
        info!(
            "Uploaded scene '{}': {} vertices, {} triangles, {} meshes, {} instances, \
             {} textures in {:.2?}",
            scene.name,
            vertices.len(),
            triangles.len(),
            meshes.len(),
            scene.instances.len(),
            textures.layers,
            start.elapsed()
        );
        Ok(())
    }

    /// Re-upload the material buffer only.
    pub fn update_materials(&mut self, scene: &Scene) -> RenderResult<()> {
        let materials: Vec<GpuMaterial> =
            scene.materials.iter().map(GpuMaterial::from).collect();
        self.device.upload(SceneBuffer::Materials, cast_slice(&materials))
    }

    /// Rebuild the TLAS and re-upload instances in its leaf order.
    pub fn update_instances(&mut self, scene: &Scene) -> RenderResult<()> {
        let start = Instant::now();
        let tlas = tlas::build(&scene.instance_bounds());
        let mut instances = Vec::with_capacity(tlas.order.len());
        for &index in &tlas.order {
            let instance = &scene.instances[index as usize];
            let mesh = scene.meshes.get(instance.mesh_id as usize).ok_or_else(|| {
                RenderError::upload(format!(
                    "instance {} references missing mesh {}",
                    index, instance.mesh_id
                ))
            })?;
            instances.push(GpuInstance::new(instance, mesh));
        }
        self.device.upload(SceneBuffer::Instances, cast_slice(&instances))?;
        self.device.upload(SceneBuffer::TlasNodes, cast_slice(&tlas.nodes))?;
        self.scene_uniforms.tlas_node_count = tlas.nodes.len() as u32;
        debug!(
            "TLAS rebuilt: {} instances, {} nodes in {:.2?}",
            instances.len(),
            tlas.nodes.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Upload the environment image (if any) and its parameters.
    pub fn set_environment(&mut self, environment: &Environment) -> RenderResult<()> {
        let texels: Vec<[f32; 4]> = match &environment.image {
            Some(image) => image.pixels().map(|p| [p[0], p[1], p[2], 1.0]).collect(),
            None => Vec::new(),
        };
        self.device.upload(SceneBuffer::Environment, cast_slice(&texels))?;
        self.scene_uniforms.set_environment(environment);
        Ok(())
    }

    /// Reallocate every output image; previous contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        info!("Resizing images to {}x{}", width, height);
        self.device.allocate_images(width, height)?;
        self.size = [width, height];
        Ok(())
    }

    pub fn clear(&mut self) -> RenderResult<()> {
        self.device.clear_images()
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Trace parameters with scene-dependent fields filled in and the full
    /// image as the dispatch rectangle.
    pub fn trace_uniforms(&self) -> TraceUniforms {
        TraceUniforms {
            image_size: self.size,
            rect_size: self.size,
            ..self.scene_uniforms
        }
    }

    pub fn read_image(&mut self, image: ImageKind) -> RenderResult<Vec<f32>> {
        self.device.read_image(image)
    }

    pub fn device_mut(&mut self) -> &mut dyn ComputeDevice {
        self.device.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu::CpuDevice;
    use crate::scene::procedural;

    #[test]
    fn every_instance_gets_a_tlas_leaf() {
        let mut scene = procedural::random_spheres(3).unwrap();
        let mut resources = GpuResources::new(Box::new(CpuDevice::new()), 4, 4).unwrap();
        resources.load_scene(&scene).unwrap();
        let count = scene.instances.len() as u32;
        assert_eq!(resources.trace_uniforms().tlas_node_count, 2 * count - 1);

        scene.instances.truncate(1);
        resources.update_instances(&scene).unwrap();
        assert_eq!(resources.trace_uniforms().tlas_node_count, 1);
    }

    #[test]
    fn resize_reallocates_images() {
        let mut resources = GpuResources::new(Box::new(CpuDevice::new()), 2, 2).unwrap();
        resources.resize(5, 3).unwrap();
        assert_eq!(resources.size(), [5, 3]);
        assert_eq!(resources.read_image(ImageKind::Output).unwrap().len(), 60);
        assert_eq!(resources.trace_uniforms().image_size, [5, 3]);
    }
}

//! Data-parallel host device.
//!
//! Runs the kernel over image rows with rayon, one task per row of the
//! dispatched rectangle. Results do not depend on scheduling because every
//! pixel seeds its own generator.

use std::time::Instant;

use glam::Vec4;
use log::debug;
use rayon::prelude::*;

use super::device::{ComputeDevice, ImageKind, SceneBuffer};
use super::layout::{
    GpuInstance, GpuMaterial, GpuMesh, GpuTriangle, GpuVertex, ToneMapUniforms, TraceUniforms,
};
use crate::bvh::BvhNode;
use crate::error::{RenderError, RenderResult};
use crate::kernel::texture::TextureView;
use crate::kernel::{trace_pixel, SceneView};
use crate::tonemap::{tone_map, ToneMapMode};

#[derive(Default)]
struct SceneBuffers {
    vertices: Vec<GpuVertex>,
    triangles: Vec<GpuTriangle>,
    meshes: Vec<GpuMesh>,
    instances: Vec<GpuInstance>,
    materials: Vec<GpuMaterial>,
    blas_nodes: Vec<BvhNode>,
    tlas_nodes: Vec<BvhNode>,
    textures: Vec<[f32; 4]>,
    environment: Vec<[f32; 4]>,
}

impl SceneBuffers {
    fn view(&self, uniforms: &TraceUniforms) -> SceneView<'_> {
        let [tex_w, tex_h] = uniforms.texture_size;
        let [env_w, env_h] = uniforms.environment_size;
        let has_environment = (env_w > 0 && env_h > 0) as u32;
        SceneView {
            vertices: &self.vertices,
            triangles: &self.triangles,
            meshes: &self.meshes,
            instances: &self.instances,
            materials: &self.materials,
            blas_nodes: &self.blas_nodes,
            tlas_nodes: &self.tlas_nodes,
            textures: TextureView::new(&self.textures, tex_w, tex_h, uniforms.texture_layers),
            environment: TextureView::new(&self.environment, env_w, env_h, has_environment),
        }
    }
}

#[derive(Default)]
struct Images {
    width: u32,
    height: u32,
    accumulation: Vec<f32>,
    albedo: Vec<f32>,
    normal: Vec<f32>,
    depth: Vec<f32>,
    output: Vec<f32>,
}

impl Images {
    fn get(&self, kind: ImageKind) -> &Vec<f32> {
        match kind {
            ImageKind::Accumulation => &self.accumulation,
            ImageKind::Albedo => &self.albedo,
            ImageKind::Normal => &self.normal,
            ImageKind::Depth => &self.depth,
            ImageKind::Output => &self.output,
        }
    }

    fn get_mut(&mut self, kind: ImageKind) -> &mut Vec<f32> {
        match kind {
            ImageKind::Accumulation => &mut self.accumulation,
            ImageKind::Albedo => &mut self.albedo,
            ImageKind::Normal => &mut self.normal,
            ImageKind::Depth => &mut self.depth,
            ImageKind::Output => &mut self.output,
        }
    }
}

/// Reference device executing the kernel on the CPU.
#[derive(Default)]
pub struct CpuDevice {
    scene: SceneBuffers,
    images: Images,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Check a dispatch rectangle against the image size.
fn rect_rows(offset: [u32; 2], size: [u32; 2], image: [u32; 2]) -> RenderResult<(usize, usize)> {
    let fits = offset[0].checked_add(size[0]).is_some_and(|x| x <= image[0])
        && offset[1].checked_add(size[1]).is_some_and(|y| y <= image[1]);
    if !fits {
        return Err(RenderError::InvalidRect {
            pos: offset,
            size,
            image,
        });
    }
    Ok((offset[1] as usize, size[1] as usize))
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> String {
        format!("CPU ({} threads)", rayon::current_num_threads())
    }

    fn upload(&mut self, buffer: SceneBuffer, bytes: &[u8]) -> RenderResult<()> {
        let scene = &mut self.scene;
        match buffer {
            SceneBuffer::Vertices => scene.vertices = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Triangles => scene.triangles = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Meshes => scene.meshes = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Instances => scene.instances = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Materials => scene.materials = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::BlasNodes => scene.blas_nodes = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::TlasNodes => scene.tlas_nodes = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Textures => scene.textures = bytemuck::pod_collect_to_vec(bytes),
            SceneBuffer::Environment => scene.environment = bytemuck::pod_collect_to_vec(bytes),
        }
        Ok(())
    }

    fn allocate_images(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.images.width = width;
        self.images.height = height;
        for kind in ImageKind::ALL {
            *self.images.get_mut(kind) = vec![0.0; kind.len(width, height)];
        }
        Ok(())
    }

    fn clear_images(&mut self) -> RenderResult<()> {
        for kind in ImageKind::ALL {
            self.images.get_mut(kind).fill(0.0);
        }
        Ok(())
    }

    fn trace(&mut self, uniforms: &TraceUniforms) -> RenderResult<()> {
        let image = [self.images.width, self.images.height];
        if uniforms.image_size != image {
            return Err(RenderError::dispatch(format!(
                "trace for {:?} image on {:?} device images",
                uniforms.image_size, image
            )));
        }
        let (first_row, rows) = rect_rows(uniforms.rect_offset, uniforms.rect_size, image)?;
        if rows == 0 || uniforms.rect_size[0] == 0 {
            return Ok(());
        }

        let start = Instant::now();
        let view = self.scene.view(uniforms);
        let width = image[0] as usize;
        let columns = uniforms.rect_offset[0]..uniforms.rect_offset[0] + uniforms.rect_size[0];
        let images = &mut self.images;
        images
            .accumulation
            .par_chunks_mut(width * 4)
            .zip(images.albedo.par_chunks_mut(width * 3))
            .zip(images.normal.par_chunks_mut(width * 3))
            .zip(images.depth.par_chunks_mut(width))
            .enumerate()
            .skip(first_row)
            .take(rows)
            .for_each(|(y, (((accumulation, albedo), normal), depth))| {
                for x in columns.clone() {
                    let sample = trace_pixel(&view, uniforms, x, y as u32);
                    let i = x as usize;
                    for (c, value) in sample.color.to_array().into_iter().enumerate() {
                        accumulation[i * 4 + c] += value;
                    }
                    albedo[i * 3..i * 3 + 3].copy_from_slice(&sample.albedo.to_array());
                    normal[i * 3..i * 3 + 3].copy_from_slice(&sample.normal.to_array());
                    depth[i] = sample.depth;
                }
            });
        debug!(
            "Traced {}x{} pixels in {:.2?}",
            uniforms.rect_size[0],
            uniforms.rect_size[1],
            start.elapsed()
        );
        Ok(())
    }

    fn tone_map(&mut self, uniforms: &ToneMapUniforms) -> RenderResult<()> {
        let image = [self.images.width, self.images.height];
        let (first_row, rows) = rect_rows(uniforms.rect_offset, uniforms.rect_size, image)?;
        if rows == 0 || uniforms.rect_size[0] == 0 {
            return Ok(());
        }
        let width = image[0] as usize;
        let count = uniforms.sample_count.max(1) as f32;
        let mode = ToneMapMode::from_index(uniforms.mode);
        let x0 = uniforms.rect_offset[0] as usize;
        let x1 = x0 + uniforms.rect_size[0] as usize;
        let images = &mut self.images;
        images
            .output
            .par_chunks_mut(width * 4)
            .zip(images.accumulation.par_chunks(width * 4))
            .skip(first_row)
            .take(rows)
            .for_each(|(output, accumulation)| {
                for x in x0..x1 {
                    let sum = Vec4::from_slice(&accumulation[x * 4..x * 4 + 4]);
                    let mapped = tone_map(sum / count, mode, uniforms.gamma);
                    output[x * 4..x * 4 + 4].copy_from_slice(&mapped.to_array());
                }
            });
        Ok(())
    }

    fn read_image(&mut self, image: ImageKind) -> RenderResult<Vec<f32>> {
        Ok(self.images.get(image).clone())
    }

    fn write_image(&mut self, image: ImageKind, data: &[f32]) -> RenderResult<()> {
        let target = self.images.get_mut(image);
        if target.len() != data.len() {
            return Err(RenderError::upload(format!(
                "{:?} image holds {} floats, got {}",
                image,
                target.len(),
                data.len()
            )));
        }
        target.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_must_fit() {
        assert!(rect_rows([0, 0], [4, 4], [4, 4]).is_ok());
        assert!(matches!(
            rect_rows([2, 0], [3, 1], [4, 4]),
            Err(RenderError::InvalidRect { .. })
        ));
        assert!(rect_rows([u32::MAX, 0], [2, 1], [4, 4]).is_err());
    }

    #[test]
    fn images_follow_size() {
        let mut device = CpuDevice::new();
        device.allocate_images(3, 2).unwrap();
        assert_eq!(device.read_image(ImageKind::Accumulation).unwrap().len(), 24);
        assert_eq!(device.read_image(ImageKind::Depth).unwrap().len(), 6);
        assert!(device.write_image(ImageKind::Albedo, &[0.0; 5]).is_err());
    }

    #[test]
    fn tone_map_divides_by_sample_count() {
        let mut device = CpuDevice::new();
        device.allocate_images(1, 1).unwrap();
        device
            .write_image(ImageKind::Accumulation, &[4.0, 0.0, 2.0, 2.0])
            .unwrap();
        device
            .tone_map(&ToneMapUniforms {
                rect_size: [1, 1],
                image_size: [1, 1],
                sample_count: 2,
                gamma: 1.0,
                ..Default::default()
            })
            .unwrap();
        let out = device.read_image(ImageKind::Output).unwrap();
        assert_eq!(out, vec![2.0 / 3.0, 0.0, 0.5, 1.0]);
    }
}

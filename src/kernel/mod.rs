//! The per-pixel path-tracing kernel.
//!
//! This is the host implementation of `shaders/trace.comp` and operates on
//! exactly the buffers the device sees (see [`crate::gpu::layout`]). One call
//! of [`trace_pixel`] produces one sample for one pixel:
//!
//! 1. a thin-lens camera ray through the pixel centre,
//! 2. repeated closest-hit queries through TLAS and BLAS,
//! 3. one material response per bounce ([`shade::react`]),
//! 4. the environment for escaping rays.
//!
//! Hits that only pass the ray through (cutouts, volume boundaries) do not
//! count as bounces; at most [`MAX_PASS_THROUGH`] of them are followed in a
//! row.

pub mod intersect;
pub mod shade;
pub mod texture;
pub mod traverse;

use glam::{Vec3A, Vec4};

use crate::bvh::BvhNode;
use crate::gpu::layout::{
    GpuInstance, GpuMaterial, GpuMesh, GpuTriangle, GpuVertex, TraceUniforms,
};
use crate::interval::Interval;
use crate::random::{random_in_unit_disk, PixelRng};
use crate::ray::Ray;
use shade::{Interaction, PathState};
use texture::TextureView;
use traverse::RayLimits;

/// Consecutive non-scattering hits followed before a path is dropped.
pub const MAX_PASS_THROUGH: u32 = 64;

/// Borrowed view of every scene buffer the kernel reads.
#[derive(Debug, Clone, Copy)]
pub struct SceneView<'a> {
    pub vertices: &'a [GpuVertex],
    pub triangles: &'a [GpuTriangle],
    pub meshes: &'a [GpuMesh],
    /// In TLAS leaf order
    pub instances: &'a [GpuInstance],
    pub materials: &'a [GpuMaterial],
    pub blas_nodes: &'a [BvhNode],
    pub tlas_nodes: &'a [BvhNode],
    pub textures: TextureView<'a>,
    pub environment: TextureView<'a>,
}

/// Output of one sample for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    /// Radiance, alpha 0 for a transparent background
    pub color: Vec4,
    /// First-hit response colour, or the environment for a miss
    pub albedo: Vec3A,
    /// First-hit shading normal remapped to [0, 1]
    pub normal: Vec3A,
    /// First-hit distance mapped linearly over the render distance range
    pub depth: f32,
}

/// Camera ray through the centre of pixel `(x, y)`; `y = 0` is the top row.
pub fn primary_ray<R: rand::Rng>(
    uniforms: &TraceUniforms,
    x: u32,
    y: u32,
    rng: &mut R,
) -> Ray {
    let [width, height] = uniforms.image_size;
    let (width, height) = (width.max(1) as f32, height.max(1) as f32);
    let forward = Vec3A::from_array(uniforms.camera_forward);
    let up = Vec3A::from_array(uniforms.camera_up);
    let right = forward.cross(up);
    let position = Vec3A::from_array(uniforms.camera_position);

    let scale = 2.0 * (uniforms.camera_fov * 0.5).tan();
    let sx = ((x as f32 + 0.5) / width - 0.5) * scale;
    let sy = (0.5 - (y as f32 + 0.5) / height) * (height / width) * scale;
    let direction = (forward + right * sx + up * sy).normalize();

    let focal_point = position + direction * uniforms.camera_focal_distance;
    let lens = random_in_unit_disk(rng) * uniforms.camera_aperture;
    let mut origin = position + right * lens.x + up * lens.y;
    let direction = (focal_point - origin).normalize_or(direction);

    let blur = random_in_unit_disk(rng) * uniforms.camera_blur;
    origin += right * blur.x + up * blur.y;
    Ray::new(origin, direction)
}

/// Environment radiance for an escaping direction.
pub fn environment_radiance(
    scene: &SceneView,
    uniforms: &TraceUniforms,
    direction: Vec3A,
) -> Vec3A {
    let color = if scene.environment.layers > 0 {
        let rotated = Vec3A::from(uniforms.environment_rotation() * glam::Vec3::from(direction));
        Vec3A::from(scene.environment.sample_direction(rotated.normalize_or(direction)).truncate())
    } else {
        Vec3A::from_array(uniforms.environment_color)
    };
    color * uniforms.environment_intensity
}

/// Trace one sample for pixel `(x, y)` of the full image.
pub fn trace_pixel(scene: &SceneView, uniforms: &TraceUniforms, x: u32, y: u32) -> PixelSample {
    let mut rng = PixelRng::for_pixel(x, y, uniforms.frame_index);
    let camera_ray = primary_ray(uniforms, x, y, &mut rng);
    let camera_origin = camera_ray.origin;
    let mut state = PathState::new(camera_ray);
    let depth_range = Interval::new(uniforms.min_render_distance, uniforms.max_render_distance);

    let mut sample = PixelSample {
        color: Vec4::ZERO,
        albedo: Vec3A::ZERO,
        normal: Vec3A::ZERO,
        depth: 1.0,
    };
    let mut background = false;
    let mut bounce = 0;
    let mut pass_through = 0;

    while bounce <= uniforms.max_bounce_count {
        let limits = RayLimits {
            min_distance: uniforms.min_render_distance,
            max_distance: uniforms.max_render_distance,
            first_hit: bounce == 0,
        };
        let Some(hit) = scene.intersect(&state.ray, &limits) else {
            let environment = environment_radiance(scene, uniforms, state.ray.direction);
            state.radiance += environment * state.throughput;
            if bounce == 0 {
                background = true;
                sample.albedo = environment;
                sample.normal = (Vec3A::ONE - state.ray.direction) * 0.5;
            }
            break;
        };
        let Some(material) = scene.materials.get(hit.material_id as usize) else {
            break;
        };

        match shade::react(&mut state, &hit, material, &scene.textures, &mut rng) {
            Interaction::Scattered { response, normal } => {
                if bounce == 0 {
                    sample.albedo = response;
                    sample.normal = (normal + Vec3A::ONE) * 0.5;
                    sample.depth = depth_range.normalize((hit.position - camera_origin).length());
                }
                bounce += 1;
                pass_through = 0;
            }
            Interaction::PassThrough => {
                state.ray.origin = hit.position;
                pass_through += 1;
                if pass_through > MAX_PASS_THROUGH {
                    break;
                }
            }
        }
    }

    let alpha = if background && uniforms.environment_transparent != 0 {
        0.0
    } else {
        1.0
    };
    sample.color = state.radiance.extend(alpha);
    sample
}

//! The renderer façade.
//!
//! [`Renderer`] owns the device resources, the active camera and the render
//! settings, and keeps the running sample count consistent with the
//! accumulation image. Every entry point blocks until the device is done.
//!
//! Mutations of anything that changes the rendered image (materials,
//! instances, camera, environment, settings) clear the accumulation as part
//! of the call. Changing only the tone mapping re-derives the output image
//! from the existing accumulation.

use log::{debug, info, warn};

use crate::denoise::{DenoiseInput, Denoiser, JointBilateral};
use crate::error::{RenderError, RenderResult};
use crate::gpu::device::{ComputeDevice, ImageKind};
use crate::gpu::layout::{ToneMapUniforms, TraceUniforms};
use crate::gpu::resources::GpuResources;
use crate::scene::{Camera, Environment, Scene};
use crate::tonemap::ToneMapMode;

/// Lifecycle of the accumulation image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Device ready, no scene loaded yet
    Uninitialized,
    /// Accumulation cleared
    Ready,
    /// Samples have been accumulated since the last clear
    Rendering,
    /// Output re-derived from the accumulation without tracing
    ToneMappingOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Scattering events per path; 0 renders direct emission and environment only
    pub max_bounce_count: u32,
    /// Near clip distance for primary rays
    pub min_render_distance: f32,
    pub max_render_distance: f32,
    pub gamma: f32,
    pub tone_map: ToneMapMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_bounce_count: 5,
            min_render_distance: 0.001,
            max_render_distance: 1e6,
            gamma: 2.2,
            tone_map: ToneMapMode::Reinhard,
        }
    }
}

/// Capability interface consumed by front-ends.
pub trait RenderEngine {
    fn load_scene(&mut self, scene: &Scene) -> RenderResult<()>;
    fn clear(&mut self) -> RenderResult<()>;
    fn render(&mut self, samples: u32) -> RenderResult<()>;
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;
    fn sample_count(&self) -> u32;
    fn size(&self) -> [u32; 2];
    /// Tone-mapped RGBA output
    fn image(&mut self) -> RenderResult<Vec<f32>>;
}

pub struct Renderer {
    resources: GpuResources,
    camera: Camera,
    settings: RenderSettings,
    state: RenderState,
    sample_count: u32,
    /// Samples traced since the last clear, committed or not; seeds the kernel
    frame_index: u32,
    denoiser: Box<dyn Denoiser>,
}

impl Renderer {
    /// Create a renderer on `device` with `width x height` output images.
    pub fn new(device: Box<dyn ComputeDevice>, width: u32, height: u32) -> RenderResult<Self> {
        let resources = GpuResources::new(device, width, height)?;
        Ok(Self {
            resources,
            camera: Camera::default(),
            settings: RenderSettings::default(),
            state: RenderState::Uninitialized,
            sample_count: 0,
            frame_index: 0,
            denoiser: Box::new(JointBilateral::default()),
        })
    }

    /// Renderer on the host reference device.
    pub fn cpu(width: u32, height: u32) -> RenderResult<Self> {
        Self::new(Box::new(crate::gpu::cpu::CpuDevice::new()), width, height)
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_denoiser(mut self, denoiser: Box<dyn Denoiser>) -> Self {
        self.denoiser = denoiser;
        self
    }

    /// Validate and upload `scene`, adopt its first camera and clear.
    pub fn load_scene(&mut self, scene: &Scene) -> RenderResult<()> {
        scene.validate()?;
        self.resources.load_scene(scene)?;
        self.camera = scene.default_camera();
        self.state = RenderState::Ready;
        self.clear()
    }

    /// Zero every image and the sample count.
    pub fn clear(&mut self) -> RenderResult<()> {
        self.resources.clear()?;
        self.sample_count = 0;
        self.frame_index = 0;
        if self.state != RenderState::Uninitialized {
            self.state = RenderState::Ready;
        }
        Ok(())
    }

    /// Accumulate `samples` samples over the whole image.
    pub fn render(&mut self, samples: u32) -> RenderResult<()> {
        let size = self.size();
        self.render_rect(samples, [0, 0], size, true)
    }

    /// Accumulate `samples` samples over a sub-rectangle and tone-map it.
    ///
    /// With `commit == false` the sample count is left unchanged; the rectangle
    /// is tone-mapped as if the samples had been committed.
    pub fn render_rect(
        &mut self,
        samples: u32,
        pos: [u32; 2],
        size: [u32; 2],
        commit: bool,
    ) -> RenderResult<()> {
        let image = self.size();
        let fits = pos[0].checked_add(size[0]).is_some_and(|x| x <= image[0])
            && pos[1].checked_add(size[1]).is_some_and(|y| y <= image[1]);
        if !fits {
            return Err(RenderError::InvalidRect { pos, size, image });
        }
        if samples == 0 {
            return Ok(());
        }

        let mut uniforms = self.trace_uniforms();
        uniforms.rect_offset = pos;
        uniforms.rect_size = size;
        for _ in 0..samples {
            uniforms.frame_index = self.frame_index;
            self.resources.device_mut().trace(&uniforms)?;
            self.frame_index = self.frame_index.wrapping_add(1);
        }

        let divisor = if commit {
            self.sample_count += samples;
            self.sample_count
        } else {
            self.sample_count + samples
        };
        self.state = RenderState::Rendering;
        debug!(
            "Rendered {} samples over {:?}+{:?}, sample count {}",
            samples, pos, size, self.sample_count
        );
        self.tone_map_rect(pos, size, divisor)
    }

    /// One zero-bounce sample when nothing has been accumulated yet.
    pub fn render_preview(&mut self) -> RenderResult<()> {
        if self.sample_count > 0 {
            return Ok(());
        }
        let max_bounce_count = self.settings.max_bounce_count;
        self.settings.max_bounce_count = 0;
        let result = self.render(1);
        self.settings.max_bounce_count = max_bounce_count;
        result
    }

    /// Re-derive the output image from the accumulation.
    pub fn tone_map(&mut self) -> RenderResult<()> {
        let size = self.size();
        self.tone_map_rect([0, 0], size, self.sample_count)?;
        if self.state != RenderState::Uninitialized {
            self.state = RenderState::ToneMappingOnly;
        }
        Ok(())
    }

    fn tone_map_rect(
        &mut self,
        pos: [u32; 2],
        size: [u32; 2],
        sample_count: u32,
    ) -> RenderResult<()> {
        let uniforms = ToneMapUniforms {
            rect_offset: pos,
            rect_size: size,
            image_size: self.size(),
            sample_count,
            mode: self.settings.tone_map as u32,
            gamma: self.settings.gamma,
            ..Default::default()
        };
        self.resources.device_mut().tone_map(&uniforms)
    }

    /// Reallocate the images; accumulated samples are discarded.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.resources.resize(width, height)?;
        self.clear()
    }

    /// Replace the accumulated average with the denoiser's result.
    ///
    /// On failure the accumulation is left as it was.
    pub fn denoise(&mut self) -> RenderResult<()> {
        if self.sample_count == 0 {
            return Ok(());
        }
        let [width, height] = self.size();
        let count = self.sample_count as f32;
        let color: Vec<f32> = self
            .resources
            .read_image(ImageKind::Accumulation)?
            .into_iter()
            .map(|v| v / count)
            .collect();
        let albedo = self.resources.read_image(ImageKind::Albedo)?;
        let normal = self.resources.read_image(ImageKind::Normal)?;
        let input = DenoiseInput {
            width,
            height,
            color: &color,
            albedo: &albedo,
            normal: &normal,
        };

        let denoised = match self.denoiser.denoise(&input) {
            Ok(denoised) => denoised,
            Err(err) => {
                warn!("Denoiser '{}' failed: {}", self.denoiser.name(), err);
                return Err(err.into());
            }
        };
        if denoised.len() != color.len() {
            let err = crate::error::DenoiseError::SizeMismatch {
                width,
                height,
                actual: denoised.len(),
            };
            warn!("Denoiser '{}' failed: {}", self.denoiser.name(), err);
            return Err(err.into());
        }

        let accumulation: Vec<f32> = denoised.into_iter().map(|v| v * count).collect();
        self.resources
            .device_mut()
            .write_image(ImageKind::Accumulation, &accumulation)?;
        info!("Denoised {}x{} image with {}", width, height, self.denoiser.name());
        self.tone_map()
    }

    /// Re-upload materials after edits.
    pub fn update_materials(&mut self, scene: &Scene) -> RenderResult<()> {
        scene.validate()?;
        self.resources.update_materials(scene)?;
        self.clear()
    }

    /// Rebuild the TLAS after instances were added, removed or moved.
    pub fn update_instances(&mut self, scene: &Scene) -> RenderResult<()> {
        scene.validate()?;
        self.resources.update_instances(scene)?;
        self.clear()
    }

    pub fn set_camera(&mut self, camera: Camera) -> RenderResult<()> {
        self.camera = camera;
        self.camera.orthonormalize();
        self.clear()
    }

    /// Edit the camera in place.
    pub fn update_camera(&mut self, edit: impl FnOnce(&mut Camera)) -> RenderResult<()> {
        edit(&mut self.camera);
        self.camera.orthonormalize();
        self.clear()
    }

    pub fn set_environment(&mut self, environment: &Environment) -> RenderResult<()> {
        self.resources.set_environment(environment)?;
        self.clear()
    }

    pub fn set_settings(&mut self, settings: RenderSettings) -> RenderResult<()> {
        self.settings = settings;
        self.clear()
    }

    /// Change the tone curve and gamma, keeping accumulated samples.
    pub fn set_tone_mapping(&mut self, mode: ToneMapMode, gamma: f32) -> RenderResult<()> {
        self.settings.tone_map = mode;
        self.settings.gamma = gamma;
        self.tone_map()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn size(&self) -> [u32; 2] {
        self.resources.size()
    }

    /// Tone-mapped RGBA.
    pub fn image(&mut self) -> RenderResult<Vec<f32>> {
        self.resources.read_image(ImageKind::Output)
    }

    pub fn albedo_image(&mut self) -> RenderResult<Vec<f32>> {
        self.resources.read_image(ImageKind::Albedo)
    }

    pub fn normal_image(&mut self) -> RenderResult<Vec<f32>> {
        self.resources.read_image(ImageKind::Normal)
    }

    pub fn depth_image(&mut self) -> RenderResult<Vec<f32>> {
        self.resources.read_image(ImageKind::Depth)
    }

    /// Raw RGBA radiance sum; divide by [`Self::sample_count`] for the average.
    pub fn accumulation_image(&mut self) -> RenderResult<Vec<f32>> {
        self.resources.read_image(ImageKind::Accumulation)
    }

    fn trace_uniforms(&self) -> TraceUniforms {
        let mut uniforms = self.resources.trace_uniforms();
        uniforms.set_camera(&self.camera);
        uniforms.max_bounce_count = self.settings.max_bounce_count;
        uniforms.min_render_distance = self.settings.min_render_distance;
        uniforms.max_render_distance = self.settings.max_render_distance;
        uniforms
    }
}

impl RenderEngine for Renderer {
    fn load_scene(&mut self, scene: &Scene) -> RenderResult<()> {
        Renderer::load_scene(self, scene)
    }

    fn clear(&mut self) -> RenderResult<()> {
        Renderer::clear(self)
    }

    fn render(&mut self, samples: u32) -> RenderResult<()> {
        Renderer::render(self, samples)
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        Renderer::resize(self, width, height)
    }

    fn sample_count(&self) -> u32 {
        Renderer::sample_count(self)
    }

    fn size(&self) -> [u32; 2] {
        Renderer::size(self)
    }

    fn image(&mut self) -> RenderResult<Vec<f32>> {
        Renderer::image(self)
    }
}

/// Round-robin tile scheduler for interactive rendering.
///
/// The image is split into `factor[0] x factor[1]` tiles. Feeding each tile
/// to [`Renderer::render_rect`] with `commit = is_last_tile()` adds the same
/// number of samples to every pixel before the count advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    pub factor: [u32; 2],
    pub count: u32,
}

impl Default for Tiling {
    fn default() -> Self {
        Self::new([1, 1])
    }
}

impl Tiling {
    pub fn new(factor: [u32; 2]) -> Self {
        Self {
            factor: [factor[0].max(1), factor[1].max(1)],
            count: 0,
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.factor[0] * self.factor[1]
    }

    /// Position and size of the current tile in an image of `image` pixels.
    pub fn tile(&self, image: [u32; 2]) -> ([u32; 2], [u32; 2]) {
        let index = self.count % self.tile_count();
        let tile_size = [
            image[0].div_ceil(self.factor[0]),
            image[1].div_ceil(self.factor[1]),
        ];
        let pos = [
            ((index % self.factor[0]) * tile_size[0]).min(image[0]),
            ((index / self.factor[0]) * tile_size[1]).min(image[1]),
        ];
        let size = [
            tile_size[0].min(image[0] - pos[0]),
            tile_size[1].min(image[1] - pos[1]),
        ];
        (pos, size)
    }

    pub fn is_last_tile(&self) -> bool {
        self.count % self.tile_count() == self.tile_count() - 1
    }

    pub fn tick(&mut self) {
        self.count = self.count.wrapping_add(1);
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Render the current tile and advance.
    pub fn render_next(&mut self, renderer: &mut Renderer, samples: u32) -> RenderResult<()> {
        let (pos, size) = self.tile(renderer.size());
        renderer.render_rect(samples, pos, size, self.is_last_tile())?;
        self.tick();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenoiseError;

    #[test]
    fn tiles_cover_image_once() {
        let mut tiling = Tiling::new([3, 2]);
        let image = [10, 7];
        let mut covered = vec![0u32; 70];
        for i in 0..tiling.tile_count() {
            assert_eq!(tiling.is_last_tile(), i == 5);
            let (pos, size) = tiling.tile(image);
            for y in pos[1]..pos[1] + size[1] {
                for x in pos[0]..pos[0] + size[0] {
                    covered[(y * image[0] + x) as usize] += 1;
                }
            }
            tiling.tick();
        }
        assert!(covered.iter().all(|&c| c == 1));
        assert_eq!(tiling.tile(image).0, [0, 0]);
    }

    #[test]
    fn new_renderer_is_uninitialized() {
        let mut renderer = Renderer::cpu(4, 3).unwrap();
        assert_eq!(renderer.state(), RenderState::Uninitialized);
        assert_eq!(renderer.size(), [4, 3]);
        assert_eq!(renderer.image().unwrap().len(), 48);
    }

    #[test]
    fn rect_outside_image_is_rejected() {
        let mut renderer = Renderer::cpu(4, 4).unwrap();
        let result = renderer.render_rect(1, [3, 0], [2, 2], true);
        assert!(matches!(result, Err(RenderError::InvalidRect { .. })));
        assert_eq!(renderer.sample_count(), 0);
    }

    #[test]
    fn tone_mapping_change_keeps_samples() {
        let mut renderer = Renderer::cpu(4, 4).unwrap();
        renderer
            .load_scene(&crate::scene::procedural::emissive_sphere(glam::Vec3::ONE).unwrap())
            .unwrap();
        renderer.render(2).unwrap();
        renderer.set_tone_mapping(ToneMapMode::Aces, 2.2).unwrap();
        assert_eq!(renderer.sample_count(), 2);
        assert_eq!(renderer.state(), RenderState::ToneMappingOnly);
        renderer.update_camera(|camera| camera.translate(glam::Vec3::X)).unwrap();
        assert_eq!(renderer.sample_count(), 0);
        assert_eq!(renderer.state(), RenderState::Ready);
    }

    fn sphere_renderer(width: u32, height: u32) -> Renderer {
        let mut renderer = Renderer::cpu(width, height).unwrap();
        let emission = glam::Vec3::new(0.8, 0.4, 0.2);
        let scene = crate::scene::procedural::emissive_sphere(emission).unwrap();
        renderer.load_scene(&scene).unwrap();
        renderer
    }

    struct FailingDenoiser;

    impl Denoiser for FailingDenoiser {
        fn name(&self) -> &str {
            "failing"
        }

        fn denoise(&mut self, _input: &DenoiseInput) -> Result<Vec<f32>, DenoiseError> {
            Err(DenoiseError::Backend("out of memory".into()))
        }
    }

    struct PassThrough;

    impl Denoiser for PassThrough {
        fn name(&self) -> &str {
            "pass-through"
        }

        fn denoise(&mut self, input: &DenoiseInput) -> Result<Vec<f32>, DenoiseError> {
            Ok(input.color.to_vec())
        }
    }

    #[test]
    fn clear_is_idempotent() {
        let mut renderer = sphere_renderer(6, 4);
        renderer.render(0).unwrap();
        assert_eq!(renderer.sample_count(), 0);
        renderer.render(3).unwrap();
        renderer.clear().unwrap();
        renderer.clear().unwrap();
        assert_eq!(renderer.sample_count(), 0);
        assert_eq!(renderer.state(), RenderState::Ready);
        assert!(renderer.accumulation_image().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sample_count_adds_up() {
        let mut renderer = sphere_renderer(6, 4);
        renderer.render(2).unwrap();
        renderer.render(3).unwrap();
        assert_eq!(renderer.sample_count(), 5);
        assert_eq!(renderer.state(), RenderState::Rendering);
        renderer.render_rect(2, [1, 1], [2, 2], false).unwrap();
        assert_eq!(renderer.sample_count(), 5);
    }

    #[test]
    fn same_calls_give_same_image() {
        let mut renderer = sphere_renderer(8, 8);
        renderer.render(3).unwrap();
        let first = renderer.image().unwrap();
        renderer.tone_map().unwrap();
        assert_eq!(renderer.image().unwrap(), first);

        renderer.clear().unwrap();
        renderer.render(3).unwrap();
        assert_eq!(renderer.image().unwrap(), first);
    }

    #[test]
    fn resize_discards_samples() {
        let mut renderer = sphere_renderer(6, 4);
        renderer.render(2).unwrap();
        renderer.resize(3, 5).unwrap();
        assert_eq!(renderer.sample_count(), 0);
        assert_eq!(renderer.size(), [3, 5]);
        let accumulation = renderer.accumulation_image().unwrap();
        assert_eq!(accumulation.len(), 3 * 5 * 4);
        assert!(accumulation.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn failed_denoise_keeps_accumulation() {
        let mut renderer = sphere_renderer(6, 4).with_denoiser(Box::new(FailingDenoiser));
        renderer.render(2).unwrap();
        let before = renderer.accumulation_image().unwrap();
        let result = renderer.denoise();
        assert!(matches!(result, Err(RenderError::Denoise(_))));
        assert_eq!(renderer.accumulation_image().unwrap(), before);
        assert_eq!(renderer.sample_count(), 2);
    }

    #[test]
    fn denoise_keeps_sample_scale() {
        let mut renderer = sphere_renderer(6, 4).with_denoiser(Box::new(PassThrough));
        renderer.render(4).unwrap();
        let before = renderer.accumulation_image().unwrap();
        renderer.denoise().unwrap();
        let after = renderer.accumulation_image().unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() <= 1e-5 * a.abs().max(1.0));
        }
        assert_eq!(renderer.sample_count(), 4);
        assert_eq!(renderer.state(), RenderState::ToneMappingOnly);
    }

    #[test]
    fn preview_is_one_direct_sample() {
        let mut renderer = sphere_renderer(6, 4);
        renderer.render_preview().unwrap();
        assert_eq!(renderer.sample_count(), 1);
        let bounces = RenderSettings::default().max_bounce_count;
        assert_eq!(renderer.settings().max_bounce_count, bounces);
        let preview = renderer.accumulation_image().unwrap();

        // A second preview over existing samples does nothing.
        renderer.render_preview().unwrap();
        assert_eq!(renderer.sample_count(), 1);
        assert_eq!(renderer.accumulation_image().unwrap(), preview);

        let direct = RenderSettings {
            max_bounce_count: 0,
            ..Default::default()
        };
        let mut reference = sphere_renderer(6, 4).with_settings(direct);
        reference.render(1).unwrap();
        assert_eq!(reference.accumulation_image().unwrap(), preview);
    }

    #[test]
    fn set_camera_orthonormalizes() {
        let mut renderer = sphere_renderer(4, 4);
        let camera = Camera {
            forward: glam::Vec3::new(0.0, 0.0, -3.0),
            up: glam::Vec3::new(0.0, 1.0, 1.0),
            ..Camera::default()
        };
        renderer.set_camera(camera).unwrap();
        let camera = renderer.camera();
        assert!((camera.forward.length() - 1.0).abs() < 1e-5);
        assert!((camera.up.length() - 1.0).abs() < 1e-5);
        assert!(camera.forward.dot(camera.up).abs() < 1e-5);
        assert!(camera.forward.abs_diff_eq(glam::Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn tile_sweep_commits_once() {
        let mut renderer = sphere_renderer(5, 3);
        let mut tiling = Tiling::new([2, 2]);
        for _ in 0..3 {
            tiling.render_next(&mut renderer, 1).unwrap();
            assert_eq!(renderer.sample_count(), 0);
        }
        tiling.render_next(&mut renderer, 1).unwrap();
        assert_eq!(renderer.sample_count(), 1);
        let accumulation = renderer.accumulation_image().unwrap();
        // Every pixel received exactly one sample with alpha 1.
        assert!(accumulation.chunks_exact(4).all(|p| p[3] == 1.0));
    }
}

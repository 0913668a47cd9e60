//! Compute device abstraction.
//!
//! A device owns the scene buffers and output images and runs two kernels:
//! `trace` (one sample over a rectangle, accumulated) and `tone_map`
//! (accumulation average to display image). Calls are blocking.

use crate::error::RenderResult;
use crate::gpu::layout::{ToneMapUniforms, TraceUniforms};

/// Device-resident linear buffers holding scene data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBuffer {
    /// `GpuVertex`
    Vertices,
    /// `GpuTriangle`
    Triangles,
    /// `GpuMesh`
    Meshes,
    /// `GpuInstance`, TLAS leaf order
    Instances,
    /// `GpuMaterial`
    Materials,
    /// `BvhNode`, all meshes
    BlasNodes,
    /// `BvhNode`
    TlasNodes,
    /// `[f32; 4]` texels, layer after layer
    Textures,
    /// `[f32; 4]` equirectangular texels
    Environment,
}

impl SceneBuffer {
    pub const ALL: [SceneBuffer; 9] = [
        SceneBuffer::Vertices,
        SceneBuffer::Triangles,
        SceneBuffer::Meshes,
        SceneBuffer::Instances,
        SceneBuffer::Materials,
        SceneBuffer::BlasNodes,
        SceneBuffer::TlasNodes,
        SceneBuffer::Textures,
        SceneBuffer::Environment,
    ];
}

/// Per-pixel output images, stored as tightly packed `f32` channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Running RGBA radiance sum
    Accumulation,
    /// First-hit albedo, RGB
    Albedo,
    /// First-hit normal in [0, 1], RGB
    Normal,
    /// Linearized first-hit depth
    Depth,
    /// Tone-mapped RGBA
    Output,
}

impl ImageKind {
    pub const ALL: [ImageKind; 5] = [
        ImageKind::Accumulation,
        ImageKind::Albedo,
        ImageKind::Normal,
        ImageKind::Depth,
        ImageKind::Output,
    ];

    pub fn channels(self) -> usize {
        match self {
            ImageKind::Accumulation | ImageKind::Output => 4,
            ImageKind::Albedo | ImageKind::Normal => 3,
            ImageKind::Depth => 1,
        }
    }

    pub fn len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.channels()
    }
}

/// A place where the kernels run.
pub trait ComputeDevice: Send {
    /// Human readable device name for logs.
    fn name(&self) -> String;

    /// Replace the contents of a scene buffer.
    fn upload(&mut self, buffer: SceneBuffer, bytes: &[u8]) -> RenderResult<()>;

    /// Reallocate every output image at the new size, zeroed.
    fn allocate_images(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Zero every output image.
    fn clear_images(&mut self) -> RenderResult<()>;

    /// Trace one sample for every pixel of the uniforms' rectangle and add it
    /// to the accumulation image; auxiliary images are overwritten.
    fn trace(&mut self, uniforms: &TraceUniforms) -> RenderResult<()>;

    /// Write `accumulation / sample_count` through the tone curve into the
    /// output image for the uniforms' rectangle.
    fn tone_map(&mut self, uniforms: &ToneMapUniforms) -> RenderResult<()>;

    /// Copy an image back to the host.
    fn read_image(&mut self, image: ImageKind) -> RenderResult<Vec<f32>>;

    /// Overwrite an image from the host.
    fn write_image(&mut self, image: ImageKind, data: &[f32]) -> RenderResult<()>;
}

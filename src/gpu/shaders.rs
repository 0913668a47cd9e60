//! Precompiled compute shaders.
//!
//! `shaders/*.comp` are compiled to SPIR-V by build.rs with glslc when the
//! `vulkan` feature is enabled, and embedded here.

use std::sync::Arc;

use log::info;
use vulkano::device::Device;
use vulkano::shader::{ShaderModule, ShaderModuleCreateInfo};

use crate::error::{RenderError, RenderResult};

const TRACE_SPIRV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shaders/trace.spv"));
const TONE_MAP_SPIRV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shaders/tonemap.spv"));

/// Path-tracing kernel
pub fn load_trace(device: Arc<Device>) -> RenderResult<Arc<ShaderModule>> {
    load_shader_from_spirv(device, TRACE_SPIRV, "trace")
}

/// Tone-mapping kernel
pub fn load_tone_map(device: Arc<Device>) -> RenderResult<Arc<ShaderModule>> {
    load_shader_from_spirv(device, TONE_MAP_SPIRV, "tone map")
}

fn load_shader_from_spirv(
    device: Arc<Device>,
    spirv_bytes: &[u8],
    shader_name: &str,
) -> RenderResult<Arc<ShaderModule>> {
    if spirv_bytes.len() % 4 != 0 {
        return Err(RenderError::ShaderLoad(format!(
            "invalid SPIR-V for {}: length not multiple of 4",
            shader_name
        )));
    }

    let spirv_words: Vec<u32> = spirv_bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    info!("Loading precompiled {} shader ({} bytes SPIR-V)", shader_name, spirv_bytes.len());

    // SAFETY: the words come from glslc output embedded at build time.
    unsafe { ShaderModule::new(device, ShaderModuleCreateInfo::new(&spirv_words)) }
        .map_err(|e| RenderError::ShaderLoad(format!("{}: {}", shader_name, e)))
}

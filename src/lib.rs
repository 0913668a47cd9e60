//! LumenTrace path tracer
//!
//! Progressive path tracing over a two-level BVH: one bottom-level tree per
//! mesh, one top-level tree over placed instances. The per-pixel kernel runs
//! on a data-parallel compute device (the rayon CPU device, or Vulkan with
//! the `vulkan` feature) and accumulates samples until the scene changes.

#![warn(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bvh;
pub mod denoise;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod interval;
pub mod kernel;
pub mod output;
pub mod random;
pub mod ray;
pub mod renderer;
pub mod scene;
pub mod tonemap;

pub use error::{DenoiseError, RenderError, RenderResult, SceneError};
pub use renderer::{RenderEngine, RenderSettings, RenderState, Renderer, Tiling};
pub use scene::Scene;
pub use tonemap::ToneMapMode;

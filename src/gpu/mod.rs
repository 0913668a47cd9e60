//! Device side of the renderer: record layouts, the compute device
//! abstraction and its implementations, and the resource owner that keeps
//! them in sync with a [`crate::scene::Scene`].

pub mod cpu;
pub mod device;
pub mod layout;
pub mod resources;
#[cfg(feature = "vulkan")]
pub mod shaders;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use cpu::CpuDevice;
pub use device::{ComputeDevice, ImageKind, SceneBuffer};
pub use resources::GpuResources;
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanDevice;

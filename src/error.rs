//! Error types for scene validation, device work and denoising.

/// Errors raised by the renderer and its compute devices.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// No usable compute device, or device creation failed.
    #[error("Device initialization failed: {0}")]
    DeviceInit(String),

    /// A kernel could not be loaded or its pipeline created.
    #[error("Shader load failed: {0}")]
    ShaderLoad(String),

    /// Copying scene data or images to the device failed.
    #[error("Upload error: {0}")]
    Upload(String),

    /// Recording or running a dispatch failed.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Copying an image back from the device failed.
    #[error("Readback error: {0}")]
    Readback(String),

    /// A render rectangle does not fit inside the output images.
    #[error("Rectangle {pos:?}+{size:?} is outside the {image:?} image")]
    InvalidRect {
        /// Top-left corner of the requested rectangle
        pos: [u32; 2],
        /// Size of the requested rectangle
        size: [u32; 2],
        /// Size of the output images
        image: [u32; 2],
    },

    /// The scene failed validation before upload.
    #[error("Invalid scene: {0}")]
    Scene(#[from] SceneError),

    /// Denoising failed; the accumulation image is left untouched.
    #[error("Denoise failed: {0}")]
    Denoise(#[from] DenoiseError),

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File system error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Convenience constructors for device-side failures
    pub fn device<T: ToString>(msg: T) -> Self {
        RenderError::DeviceInit(msg.to_string())
    }

    pub fn upload<T: ToString>(msg: T) -> Self {
        RenderError::Upload(msg.to_string())
    }

    pub fn dispatch<T: ToString>(msg: T) -> Self {
        RenderError::Dispatch(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        RenderError::Readback(msg.to_string())
    }
}

/// Result type alias for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Broken scene invariants, reported by [`crate::scene::Scene::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error(
        "material {material} references texture {texture}, but the scene has {count} textures"
    )]
    TextureOutOfRange { material: usize, texture: i32, count: usize },

    #[error(
        "instance {instance} references material {material}, but the scene has {count} materials"
    )]
    MaterialOutOfRange { instance: usize, material: u32, count: usize },

    #[error("instance {instance} references mesh {mesh}, but the scene has {count} meshes")]
    MeshOutOfRange { instance: usize, mesh: u32, count: usize },

    #[error("instance {instance} has a singular or non-finite transform")]
    SingularTransform { instance: usize },

    #[error(
        "triangle {triangle} references vertex {vertex}, but the scene has {count} vertices"
    )]
    VertexOutOfRange { triangle: usize, vertex: u32, count: usize },

    #[error("mesh {mesh} ends at triangle {end}, but the scene has {count} triangles")]
    TriangleRangeOutOfBounds { mesh: usize, end: usize, count: usize },

    #[error("mesh {mesh} ends at BVH node {end}, but the scene has {count} nodes")]
    NodeRangeOutOfBounds { mesh: usize, end: usize, count: usize },

    #[error("mesh has no triangles")]
    EmptyMesh,
}

/// Errors reported by a [`crate::denoise::Denoiser`].
#[derive(thiserror::Error, Debug)]
pub enum DenoiseError {
    #[error("buffer of {actual} floats does not match {width}x{height} RGBA")]
    SizeMismatch { width: u32, height: u32, actual: usize },

    #[error("{0}")]
    Backend(String),
}

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use lumentrace::tonemap::ToneMapMode;

/// Custom enum for log levels that can be used with clap's ValueEnum
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convert our custom LogLevel enum to log crate's LevelFilter
impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ToneMapArg {
    Reinhard,
    Aces,
    AcesFitted,
}

impl From<ToneMapArg> for ToneMapMode {
    fn from(arg: ToneMapArg) -> Self {
        match arg {
            ToneMapArg::Reinhard => ToneMapMode::Reinhard,
            ToneMapArg::Aces => ToneMapMode::Aces,
            ToneMapArg::AcesFitted => ToneMapMode::AcesFitted,
        }
    }
}

/// Built-in scenes
#[derive(Debug, Clone, ValueEnum)]
pub enum SceneKind {
    /// Closed white box lit by a ceiling light
    Cornell,
    /// Random spheres over a ground plane
    Spheres,
    /// A single emissive sphere in empty space
    Emissive,
}

/// Command line arguments structure using clap derive macros
#[derive(Parser)]
#[command(name = "lumentrace")]
#[command(about = "Progressive path tracer over a two-level BVH")]
pub struct Args {
    /// Set the logging level (defaults to "info")
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub debug_level: LogLevel,

    /// Image width in pixels
    #[arg(long, default_value = "800", help = "Image width in pixels")]
    pub width: u32,

    /// Image height in pixels
    #[arg(long, default_value = "600", help = "Image height in pixels")]
    pub height: u32,

    /// Total number of samples per pixel
    #[arg(long, short = 's', default_value = "64", help = "Total number of samples per pixel")]
    pub samples: u32,

    /// Samples per render call; progress and tev updates happen between calls
    #[arg(long, default_value = "4", help = "Samples accumulated per render call")]
    pub samples_per_frame: u32,

    #[arg(long, default_value = "5", help = "Maximum number of bounces per path")]
    pub max_bounce: u32,

    #[arg(long, value_enum, default_value = "reinhard", help = "Tone mapping curve")]
    pub tone_map: ToneMapArg,

    #[arg(long, default_value = "2.2", help = "Display gamma")]
    pub gamma: f32,

    #[arg(long, value_enum, default_value = "cornell", help = "Built-in scene to render")]
    pub scene: SceneKind,

    /// Equirectangular environment map (.hdr, .exr, .png)
    #[arg(long, help = "Equirectangular environment map (.hdr, .exr, .png)")]
    pub environment: Option<String>,

    #[arg(long, default_value = "1.0", help = "Environment intensity multiplier")]
    pub env_intensity: f32,

    /// Write alpha 0 where primary rays escape to the environment
    #[arg(long, help = "Transparent background")]
    pub transparent: bool,

    /// Output file path (.png for tone-mapped 8-bit, .exr for HDR linear)
    #[arg(
        short,
        long,
        default_value = "output.png",
        help = "Output file path (.png for tone-mapped 8-bit, .exr for HDR linear)"
    )]
    pub output: String,

    /// Also write albedo, normal and depth images next to the output
    #[arg(long, help = "Also write albedo, normal and depth images")]
    pub aux: bool,

    #[arg(long, help = "Denoise the final image")]
    pub denoise: bool,

    /// Send image to TEV for real-time visualization
    #[arg(long, help = "Send image to TEV for real-time visualization")]
    pub tev: bool,

    /// TEV client IP address and port (automatically enables --tev)
    #[arg(long, help = "TEV client IP address and port (automatically enables --tev)")]
    pub tev_address: Option<String>,

    /// Use GPU compute shaders for rendering (Vulkan-based)
    #[arg(long = "compute", help = "Use GPU compute shaders for rendering (Vulkan-based)")]
    pub gpu: bool,
}

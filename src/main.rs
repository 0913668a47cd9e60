use clap::Parser;
use glam::Vec3;
use log::{error, info, warn};

mod cli;
mod logger;

use cli::{Args, SceneKind};
use logger::init_logger;
use lumentrace::gpu::{ComputeDevice, CpuDevice};
use lumentrace::headless::{self, HeadlessOptions};
use lumentrace::output::{self, OutputFormat, TevStream};
use lumentrace::scene::{procedural, Environment};
use lumentrace::{RenderResult, RenderSettings, Renderer, Scene};

fn build_scene(kind: &SceneKind) -> RenderResult<Scene> {
    let scene = match kind {
        SceneKind::Cornell => procedural::cornell_box()?,
        SceneKind::Spheres => procedural::random_spheres(42)?,
        SceneKind::Emissive => procedural::emissive_sphere(Vec3::new(1.0, 0.8, 0.6))?,
    };
    Ok(scene)
}

fn create_device(use_gpu: bool) -> Box<dyn ComputeDevice> {
    if use_gpu {
        #[cfg(feature = "vulkan")]
        {
            match lumentrace::gpu::VulkanDevice::new() {
                Ok(device) => return Box::new(device),
                Err(e) => error!("GPU initialization failed: {}, falling back to CPU", e),
            }
        }
        #[cfg(not(feature = "vulkan"))]
        warn!("Built without the 'vulkan' feature, using CPU rendering");
    }
    Box::new(CpuDevice::new())
}

fn create_environment(args: &Args) -> RenderResult<Environment> {
    let environment = match &args.environment {
        Some(path) => Environment::load(path)?,
        None => Environment::default(),
    };
    Ok(Environment {
        transparent: args.transparent,
        ..environment.with_intensity(args.env_intensity)
    })
}

/// HDR average of the accumulation image.
fn hdr_image(renderer: &mut Renderer) -> RenderResult<Vec<f32>> {
    let count = renderer.sample_count().max(1) as f32;
    Ok(renderer
        .accumulation_image()?
        .into_iter()
        .map(|v| v / count)
        .collect())
}

fn save(
    path: &std::path::Path,
    format: OutputFormat,
    rgba: &[f32],
    width: u32,
    height: u32,
) -> RenderResult<()> {
    match format {
        OutputFormat::Png => output::save_png(path, rgba, width, height),
        OutputFormat::Exr => output::save_exr(path, rgba, width, height),
    }
}

fn run(args: &Args) -> RenderResult<()> {
    let format = OutputFormat::from_path(&args.output)?;
    let scene = build_scene(&args.scene)?;

    let settings = RenderSettings {
        max_bounce_count: args.max_bounce,
        gamma: args.gamma,
        tone_map: args.tone_map.clone().into(),
        ..Default::default()
    };
    let mut renderer =
        Renderer::new(create_device(args.gpu), args.width, args.height)?.with_settings(settings);
    renderer.load_scene(&scene)?;
    renderer.set_environment(&create_environment(args)?)?;

    let tev = if args.tev || args.tev_address.is_some() {
        let address = args.tev_address.as_deref().unwrap_or("localhost");
        match TevStream::connect(address, "lumentrace") {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Failed to connect to TEV on {}: {}", address, e);
                None
            }
        }
    } else {
        None
    };

    let options = HeadlessOptions {
        samples: args.samples,
        samples_per_frame: args.samples_per_frame,
        show_progress: true,
    };
    headless::run(&mut renderer, &options, tev)?;

    if args.denoise {
        if let Err(e) = renderer.denoise() {
            warn!("Keeping the noisy image: {}", e);
        }
    }

    let [width, height] = renderer.size();
    let path = std::path::Path::new(&args.output);
    let image = match format {
        OutputFormat::Png => renderer.image()?,
        OutputFormat::Exr => hdr_image(&mut renderer)?,
    };
    save(path, format, &image, width, height)?;

    if args.aux {
        let aux = [
            ("albedo", output::expand_to_rgba(&renderer.albedo_image()?, 3)),
            ("normal", output::expand_to_rgba(&renderer.normal_image()?, 3)),
            ("depth", output::expand_to_rgba(&renderer.depth_image()?, 1)),
        ];
        for (suffix, rgba) in aux {
            save(&output::sibling_path(path, suffix), format, &rgba, width, height)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    init_logger(args.debug_level.clone().into());

    // Log application startup with version information
    info!("LumenTrace - Git Version {} ({})", env!("GIT_HASH"), env!("GIT_DATE"));
    info!(
        "Image resolution: {}x{}, samples per pixel: {}",
        args.width, args.height, args.samples
    );

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

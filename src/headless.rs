//! Batch front-end: render a fixed number of samples in small batches,
//! reporting progress and optionally streaming each intermediate image to
//! TEV.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::error::RenderResult;
use crate::output::TevStream;
use crate::renderer::RenderEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessOptions {
    /// Target sample count per pixel
    pub samples: u32,
    /// Samples per render call
    pub samples_per_frame: u32,
    pub show_progress: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            samples: 64,
            samples_per_frame: 4,
            show_progress: true,
        }
    }
}

/// Accumulate until the engine holds `options.samples` samples.
///
/// A TEV stream that fails is dropped with a warning; rendering continues.
/// Returns the time spent rendering.
pub fn run<E: RenderEngine + ?Sized>(
    engine: &mut E,
    options: &HeadlessOptions,
    mut tev: Option<TevStream>,
) -> RenderResult<Duration> {
    let start = Instant::now();
    let progress = if options.show_progress {
        let bar = ProgressBar::new(options.samples as u64);
        let template = "{bar:40} {pos}/{len} samples ETA: {eta}";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };
    progress.set_position(engine.sample_count() as u64);

    let per_frame = options.samples_per_frame.max(1);
    while engine.sample_count() < options.samples {
        let batch = per_frame.min(options.samples - engine.sample_count());
        engine.render(batch)?;
        progress.set_position(engine.sample_count() as u64);

        if let Some(stream) = tev.as_mut() {
            let [width, height] = engine.size();
            let image = engine.image()?;
            if let Err(err) = stream.send(&image, width, height) {
                warn!("Stopping TEV updates: {}", err);
                tev = None;
            }
        }
    }
    progress.finish_and_clear();

    let elapsed = start.elapsed();
    let [width, height] = engine.size();
    info!(
        "Rendered {} samples at {}x{} in {:.2?}",
        engine.sample_count(),
        width,
        height,
        elapsed
    );
    Ok(elapsed)
}

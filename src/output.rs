//! # Output Module
//!
//! Writing rendered images:
//! - PNG export of the tone-mapped display image
//! - EXR export of linear HDR data
//! - Streaming to TEV (The EXR Viewer) for progressive display
//!
//! All images are interleaved `f32` channels, row-major, top row first.

use std::net::TcpStream;
use std::path::Path;
use std::time::Instant;

use exr::prelude::write_rgba_file;
use image::{ImageBuffer, Rgba};
use log::{debug, info};
use tev_client::{PacketCreateImage, PacketUpdateImage, TevClient};

use crate::error::{RenderError, RenderResult};

/// Default TEV port when the address has none.
pub const TEV_DEFAULT_PORT: u16 = 14158;

/// Widen a 1 or 3 channel image to RGBA (grey replicated, alpha 1).
pub fn expand_to_rgba(data: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        4 => data.to_vec(),
        3 => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 1.0])
            .collect(),
        1 => data.iter().flat_map(|&v| [v, v, v, 1.0]).collect(),
        _ => data
            .chunks_exact(channels.max(1))
            .flat_map(|p| [p[0], p[0], p[0], 1.0])
            .collect(),
    }
}

fn check_len(rgba: &[f32], width: u32, height: u32) -> RenderResult<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(RenderError::readback(format!(
            "{}x{} RGBA image needs {} floats, got {}",
            width,
            height,
            expected,
            rgba.len()
        )));
    }
    Ok(())
}

/// Save display-range RGBA as an 8-bit PNG; values are clamped to [0, 1].
pub fn save_png<P: AsRef<Path>>(
    path: P,
    rgba: &[f32],
    width: u32,
    height: u32,
) -> RenderResult<()> {
    check_len(rgba, width, height)?;
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let image: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        let i = (y as usize * width as usize + x as usize) * 4;
        Rgba([to_u8(rgba[i]), to_u8(rgba[i + 1]), to_u8(rgba[i + 2]), to_u8(rgba[i + 3])])
    });
    image.save(path.as_ref())?;
    info!("Image saved as {}", path.as_ref().display());
    Ok(())
}

/// Save linear HDR RGBA as a 32-bit float EXR.
pub fn save_exr<P: AsRef<Path>>(
    path: P,
    rgba: &[f32],
    width: u32,
    height: u32,
) -> RenderResult<()> {
    check_len(rgba, width, height)?;
    write_rgba_file(path.as_ref(), width as usize, height as usize, |x, y| {
        let i = (y * width as usize + x) * 4;
        (rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3])
    })
    .map_err(|e| RenderError::Io(std::io::Error::other(e.to_string())))?;
    info!("HDR image saved as EXR: {}", path.as_ref().display());
    Ok(())
}

/// Image file kinds chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Exr,
}

impl OutputFormat {
    pub fn from_path<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let extension = path
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "png" => Ok(OutputFormat::Png),
            "exr" => Ok(OutputFormat::Exr),
            _ => Err(RenderError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "unsupported file extension '{}', only .png and .exr are supported",
                    extension
                ),
            ))),
        }
    }
}

/// `render.png` + `albedo` gives `render_albedo.png`.
pub fn sibling_path<P: AsRef<Path>>(path: P, suffix: &str) -> std::path::PathBuf {
    let path = path.as_ref();
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{}_{}.{}", stem, suffix, extension.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn tev_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Io(std::io::Error::other(format!("TEV: {}", e)))
}

/// Connection to a TEV instance that keeps one image updated.
pub struct TevStream {
    client: TevClient,
    address: String,
    name: String,
    created: bool,
}

impl TevStream {
    /// Connect to `address` (`host` or `host:port`).
    pub fn connect(address: &str, name: &str) -> RenderResult<Self> {
        let address = if address.contains(':') {
            address.to_string()
        } else {
            format!("{}:{}", address, TEV_DEFAULT_PORT)
        };
        debug!("Attempting to connect to TEV at {}", address);
        let stream = TcpStream::connect(&address)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        Ok(Self {
            client: TevClient::wrap(stream),
            address,
            name: name.to_string(),
            created: false,
        })
    }

    /// Send interleaved RGBA; the image is created on first use.
    pub fn send(&mut self, rgba: &[f32], width: u32, height: u32) -> RenderResult<()> {
        check_len(rgba, width, height)?;
        let channel_names = ["R", "G", "B", "A"];
        if !self.created {
            self.client
                .send(PacketCreateImage {
                    image_name: &self.name,
                    width,
                    height,
                    channel_names: &channel_names,
                    grab_focus: true,
                })
                .map_err(tev_error)?;
            self.created = true;
        }

        let start = Instant::now();
        let pixels = (width * height) as u64;
        self.client
            .send(PacketUpdateImage {
                image_name: &self.name,
                grab_focus: false,
                channel_names: &channel_names,
                x: 0,
                y: 0,
                width,
                height,
                channel_offsets: &[0, 1, 2, 3],
                channel_strides: &[4, 4, 4, 4],
                data: rgba,
            })
            .map_err(tev_error)?;
        debug!(
            "Sent {} pixels to TEV at {} in {:.2?}",
            pixels,
            self.address,
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trips_through_image_crate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let rgba = [1.0, 0.0, 0.5, 1.0, 2.0, -1.0, 0.0, 0.0];
        save_png(&path, &rgba, 2, 1).unwrap();

        let read = image::open(&path).unwrap().to_rgba8();
        assert_eq!(read.dimensions(), (2, 1));
        assert_eq!(read.get_pixel(0, 0).0, [255, 0, 128, 255]);
        assert_eq!(read.get_pixel(1, 0).0, [255, 0, 0, 0]);
    }

    #[test]
    fn exr_keeps_hdr_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.exr");
        let rgba = [4.0, 0.25, 0.0, 1.0];
        save_exr(&path, &rgba, 1, 1).unwrap();

        let read = image::open(&path).unwrap().to_rgba32f();
        assert_eq!(read.get_pixel(0, 0).0, [4.0, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_png(dir.path().join("x.png"), &[0.0; 3], 1, 1).is_err());
    }

    #[test]
    fn format_and_sibling_names() {
        assert_eq!(OutputFormat::from_path("a/b.PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path("b.exr").unwrap(), OutputFormat::Exr);
        assert!(OutputFormat::from_path("b.jpg").is_err());
        assert_eq!(
            sibling_path("out/render.exr", "depth"),
            std::path::PathBuf::from("out/render_depth.exr")
        );
    }

    #[test]
    fn channels_expand_to_rgba() {
        assert_eq!(expand_to_rgba(&[0.5], 1), vec![0.5, 0.5, 0.5, 1.0]);
        assert_eq!(expand_to_rgba(&[0.1, 0.2, 0.3], 3), vec![0.1, 0.2, 0.3, 1.0]);
    }
}

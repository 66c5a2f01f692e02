use super::DisplaySink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Publishes annotated frames on a v4l2loopback device so any video
/// viewer can watch them
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let actual = Output::set_format(&device, &requested)
            .context("Failed to set YUYV output format")?;
        if (actual.width, actual.height) != (width, height) {
            tracing::warn!(
                "Loopback device negotiated {}x{} instead of {}x{}",
                actual.width,
                actual.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        Ok(Self {
            file,
            width,
            height,
        })
    }
}

/// Convert an RGB frame to packed YUYV (4:2:2)
fn rgb_to_yuyv(frame: &RgbImage) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    let mut yuyv = Vec::with_capacity(width as usize * height as usize * 2);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let left = frame.get_pixel(x, y);
            let right = if x + 1 < width {
                frame.get_pixel(x + 1, y)
            } else {
                left
            };

            let (y0, u0, v0) = rgb_to_yuv(left[0], left[1], left[2]);
            let (y1, u1, v1) = rgb_to_yuv(right[0], right[1], right[2]);

            // Chroma is shared by each horizontal pair
            yuyv.extend_from_slice(&[
                y0,
                ((u0 as u16 + u1 as u16) / 2) as u8,
                y1,
                ((v0 as u16 + v1 as u16) / 2) as u8,
            ]);
        }
    }

    yuyv
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let u = (-0.147 * r - 0.289 * g + 0.436 * b + 128.0).round().clamp(0.0, 255.0) as u8;
    let v = (0.615 * r - 0.515 * g - 0.100 * b + 128.0).round().clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl DisplaySink for V4L2Output {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let scaled;
        let frame = if frame.dimensions() != (self.width, self.height) {
            scaled = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &scaled
        } else {
            frame
        };

        self.file
            .write_all(&rgb_to_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn poll_cancel(&mut self, timeout: Duration) -> Result<bool> {
        // A loopback device has no user input; only pace the output
        std::thread::sleep(timeout);
        Ok(false)
    }
}

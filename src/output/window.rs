use super::DisplaySink;
use anyhow::{Context, Result};
use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(5);

/// On-screen preview window; Escape or closing the window requests a stop
pub struct WindowDisplay {
    window: Window,
    buffer: Vec<u32>,
}

impl WindowDisplay {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        tracing::info!("Opening preview window ({}x{})", width, height);

        let window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions::default(),
        )
        .context("Failed to create preview window")?;

        Ok(Self {
            window,
            buffer: Vec::with_capacity(width as usize * height as usize),
        })
    }

    fn stop_requested(&self) -> bool {
        !self.window.is_open() || self.window.is_key_down(Key::Escape)
    }
}

/// Pack RGB pixels as 0RGB u32 for minifb
fn rgb_to_argb(frame: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        frame
            .pixels()
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

impl DisplaySink for WindowDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        rgb_to_argb(frame, &mut self.buffer);
        self.window
            .update_with_buffer(&self.buffer, frame.width() as usize, frame.height() as usize)
            .context("Failed to update preview window")?;
        Ok(())
    }

    fn poll_cancel(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            self.window.update();
            if self.stop_requested() {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_STEP.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn packs_pixels_row_major() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([0x12, 0x34, 0x56]));
        frame.put_pixel(1, 0, Rgb([0xff, 0x00, 0x01]));

        let mut out = vec![7; 10];
        rgb_to_argb(&frame, &mut out);

        assert_eq!(out, vec![0x123456, 0xff0001]);
    }
}

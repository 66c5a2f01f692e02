mod headless;
mod loopback;
mod window;

pub use headless::HeadlessSink;
pub use loopback::V4L2Output;
pub use window::WindowDisplay;

use anyhow::Result;
use image::RgbImage;
use std::time::Duration;

/// Trait for frame destinations
pub trait DisplaySink {
    /// Present a frame
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Wait up to `timeout` and report whether the user asked to stop
    fn poll_cancel(&mut self, timeout: Duration) -> Result<bool>;
}

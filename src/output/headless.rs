use super::DisplaySink;
use anyhow::Result;
use image::RgbImage;
use std::time::Duration;

/// Discards frames; used for batch runs without a display
#[derive(Debug, Default)]
pub struct HeadlessSink {
    frames_shown: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for HeadlessSink {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        tracing::trace!(
            "Dropping frame {} ({}x{})",
            self.frames_shown,
            frame.width(),
            frame.height()
        );
        Ok(())
    }

    fn poll_cancel(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(false)
    }
}

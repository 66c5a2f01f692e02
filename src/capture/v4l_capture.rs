use super::FrameSource;
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Live webcam input; never reaches end of stream on its own
pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Opening webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        // Motion analysis favours temporal resolution over pixel count
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(index, requested)
            .with_context(|| format!("Failed to open camera {}", device_index))?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());

        tracing::info!(
            "Webcam streaming at {}x{} @ {} fps",
            width,
            height,
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl FrameSource for WebcamCapture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(Some(decoded))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

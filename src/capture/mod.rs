mod image_sequence;
mod v4l_capture;
mod video_file;

pub use image_sequence::ImageSequenceSource;
pub use v4l_capture::WebcamCapture;
pub use video_file::VideoFileSource;

use crate::error::SourceError;
use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// Trait for ordered frame sources
pub trait FrameSource {
    /// Next frame in arrival order, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of produced frames
    fn resolution(&self) -> (u32, u32);
}

/// Open a path as a frame source: directories are read as image sequences,
/// anything else is decoded as a video file
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()).into());
    }

    if path.is_dir() {
        Ok(Box::new(ImageSequenceSource::open(path)?))
    } else {
        Ok(Box::new(VideoFileSource::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_not_found() {
        let err = open_path("/definitely/not/here.mp4").err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::NotFound(_))
        ));
    }
}

use super::FrameSource;
use crate::error::SourceError;
use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

/// Directory of still images played back in file-name order
pub struct ImageSequenceSource {
    frames: std::vec::IntoIter<PathBuf>,
    width: u32,
    height: u32,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let unreadable = |reason: String| SourceError::Unreadable {
            path: dir.to_path_buf(),
            reason,
        };

        let entries = std::fs::read_dir(dir).map_err(|e| unreadable(e.to_string()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| unreadable("directory contains no images".to_string()))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| unreadable(format!("{}: {e}", first.display())))?;

        tracing::info!(
            "Opening image sequence {} ({} frames, {}x{})",
            dir.display(),
            paths.len(),
            width,
            height
        );

        Ok(Self {
            frames: paths.into_iter(),
            width,
            height,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.next() else {
            return Ok(None);
        };

        let frame = image::open(&path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

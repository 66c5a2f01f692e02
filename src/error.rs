use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the per-frame analysis stages
#[derive(Debug, Error, PartialEq)]
pub enum DetectionError {
    #[error("frame is empty")]
    EmptyFrame,

    #[error("frame size changed from {expected:?} to {actual:?}")]
    FrameSizeChanged {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid background model setting: {0}")]
    InvalidConfig(String),
}

/// Errors raised while opening a frame source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("video source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unable to open {} as a video stream: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, DetectionError>;

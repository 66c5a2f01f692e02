use super::FrameSource;
use crate::error::SourceError;
use anyhow::{Context, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Video file decoded by an FFmpeg child process into raw RGB24 frames
pub struct VideoFileSource {
    path: PathBuf,
    child: Option<Child>,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }

        let (width, height) = probe_dimensions(path)?;

        tracing::info!(
            "Opening video {} ({}x{})",
            path.display(),
            width,
            height
        );

        let unreadable = |reason: String| SourceError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let mut child = decoder_command(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| unreadable(format!("failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unreadable("ffmpeg stdout was not captured".to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            child: Some(child),
            stdout,
            width,
            height,
            frames_read: 0,
        })
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut buf = vec![0u8; self.frame_size()];

        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!(
                    "Decoder finished {} after {} frames",
                    self.path.display(),
                    self.frames_read
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read frame {} from decoder", self.frames_read)
                })
            }
        }

        self.frames_read += 1;

        let frame = RgbImage::from_raw(self.width, self.height, buf)
            .context("Decoded frame has unexpected size")?;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        // Kill FFmpeg so a partially read stream does not linger
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// FFmpeg invocation writing raw RGB24 frames to stdout
///
/// Autorotation stays off so frames keep the coded size that ffprobe reports.
fn decoder_command(path: &Path) -> Command {
    let mut command = Command::new("ffmpeg");
    command
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
        .arg(path)
        .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);
    command
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), SourceError> {
    let unreadable = |reason: String| SourceError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| unreadable(format!("failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(unreadable(format!("ffprobe failed: {}", stderr.trim())));
    }

    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| unreadable("no decodable video stream".to_string()))
}

/// Parse ffprobe's `WIDTHxHEIGHT` line
fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;

    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

mod capture;
mod detection;
mod error;
mod output;
mod pipeline;

use anyhow::{bail, Context, Result};
use capture::{FrameSource, WebcamCapture};
use clap::Parser;
use detection::{
    Annotator, Approximation, BackgroundConfig, ContourExtractor, KernelShape, MaskRefiner,
    StructuringElement, DEFAULT_STALE_MARKER,
};
use output::{DisplaySink, HeadlessSink, V4L2Output, WindowDisplay};
use pipeline::{MotionPipeline, RunOptions, StopReason, ViewMode};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const WINDOW_TITLE: &str = "Moving Objects";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file or directory of frames; prompted for when omitted
    input: Option<PathBuf>,

    /// Read from a webcam by index instead of a file
    #[arg(long, conflicts_with = "input")]
    camera: Option<u32>,

    /// Write frames to a v4l2loopback device instead of a window
    #[arg(long)]
    output_device: Option<String>,

    /// Process without displaying anything
    #[arg(long, conflicts_with = "output_device")]
    headless: bool,

    /// What to display
    #[arg(long, value_enum, default_value_t = ViewMode::Annotated)]
    view: ViewMode,

    /// Time to wait for a key press after each frame, in milliseconds
    #[arg(long, default_value_t = 30)]
    frame_delay_ms: u64,

    /// Background adaptation rate (1 / history length)
    #[arg(long, default_value_t = 1.0 / 500.0)]
    learning_rate: f32,

    /// Gaussian components per pixel
    #[arg(long, default_value_t = 5)]
    mixtures: usize,

    /// Squared distance, in variances, for a sample to match a component
    #[arg(long, default_value_t = 16.0)]
    match_threshold: f32,

    /// Share of model weight that counts as background
    #[arg(long, default_value_t = 0.9)]
    background_ratio: f32,

    /// Mark shadows separately in the raw mask
    #[arg(long)]
    detect_shadows: bool,

    /// Mask value cleared before opening; "none" disables
    #[arg(long, default_value_t = DEFAULT_STALE_MARKER.to_string())]
    stale_marker: String,

    /// Structuring element shape for the opening
    #[arg(long, value_enum, default_value_t = KernelShape::Rect)]
    kernel_shape: KernelShape,

    /// Structuring element width (rounded up)
    #[arg(long, default_value_t = 2.5)]
    kernel_width: f32,

    /// Structuring element height (rounded up)
    #[arg(long, default_value_t = 3.0)]
    kernel_height: f32,

    /// Keep every boundary pixel instead of only the corners
    #[arg(long)]
    full_contours: bool,

    /// Outline stroke width in pixels
    #[arg(long, default_value_t = 2)]
    stroke: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let background = BackgroundConfig {
        max_components: args.mixtures,
        learning_rate: args.learning_rate,
        match_threshold: args.match_threshold,
        background_ratio: args.background_ratio,
        detect_shadows: args.detect_shadows,
        ..BackgroundConfig::default()
    };
    let model = detection::create_default_model(background)
        .context("Invalid background model settings")?;

    let element = StructuringElement::new(args.kernel_shape, args.kernel_width, args.kernel_height);
    tracing::debug!("Opening with {:?} element {:?}", args.kernel_shape, element.size());
    let refiner = MaskRefiner::new(parse_stale_marker(&args.stale_marker)?, element);

    let approximation = if args.full_contours {
        Approximation::None
    } else {
        Approximation::Simple
    };

    let mut pipeline = MotionPipeline::new(
        model,
        refiner,
        ContourExtractor::new(approximation),
        Annotator::new(image::Rgb([0, 255, 0]), args.stroke),
    );

    // Initialize input
    let mut source: Box<dyn FrameSource> = match args.camera {
        Some(index) => Box::new(
            WebcamCapture::new(index).context("Failed to initialize webcam capture")?,
        ),
        None => {
            let path = match &args.input {
                Some(path) => path.clone(),
                None => prompt_for_path()?,
            };
            capture::open_path(&path)?
        }
    };

    // Initialize output
    let (width, height) = source.resolution();
    let mut sink: Box<dyn DisplaySink> = if args.headless {
        Box::new(HeadlessSink::new())
    } else if let Some(device) = &args.output_device {
        Box::new(
            V4L2Output::new(device, width, height)
                .context("Failed to initialize v4l2loopback output")?,
        )
    } else {
        Box::new(
            WindowDisplay::new(WINDOW_TITLE, width, height)
                .context("Failed to initialize display window")?,
        )
    };

    let options = RunOptions {
        frame_delay: Duration::from_millis(args.frame_delay_ms),
        view: args.view,
    };

    let summary = pipeline::run_pipeline(source.as_mut(), sink.as_mut(), &mut pipeline, &options)?;

    match summary.stop {
        StopReason::EndOfStream => tracing::info!("Finished after {} frames", summary.frames),
        StopReason::UserRequested => tracing::info!("Stopped after {} frames", summary.frames),
    }

    Ok(())
}

fn prompt_for_path() -> Result<PathBuf> {
    let mut stdout = std::io::stdout();
    write!(stdout, "Enter the video file path: ")?;
    stdout.flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read video path from stdin")?;

    let path = line.trim();
    if path.is_empty() {
        bail!("No video file path given");
    }
    Ok(PathBuf::from(path))
}

fn parse_stale_marker(value: &str) -> Result<Option<u8>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let marker = value
        .parse::<u8>()
        .with_context(|| format!("Invalid stale marker {:?}; expected 0-255 or \"none\"", value))?;
    Ok(Some(marker))
}

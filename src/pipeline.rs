use crate::capture::FrameSource;
use crate::detection::{
    gray_to_rgb, to_grayscale, Annotator, BackgroundSubtractor, Contour, ContourExtractor,
    ForegroundMask, MaskRefiner,
};
use crate::error::DetectionError;
use crate::output::DisplaySink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::borrow::Cow;
use std::time::{Duration, Instant};

const STATS_INTERVAL: u64 = 30;

/// What the display sink is fed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ViewMode {
    /// Original frame with contours drawn on top
    #[default]
    Annotated,
    /// Cleaned foreground mask
    Mask,
    /// Current background estimate
    Background,
}

/// Everything derived from one frame
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub mask: ForegroundMask,
    pub contours: Vec<Contour>,
    pub annotated: RgbImage,
}

/// Per-frame analysis stages; the only owner of the background model
pub struct MotionPipeline {
    model: Box<dyn BackgroundSubtractor>,
    refiner: MaskRefiner,
    extractor: ContourExtractor,
    annotator: Annotator,
}

impl MotionPipeline {
    pub fn new(
        model: Box<dyn BackgroundSubtractor>,
        refiner: MaskRefiner,
        extractor: ContourExtractor,
        annotator: Annotator,
    ) -> Self {
        Self {
            model,
            refiner,
            extractor,
            annotator,
        }
    }

    /// Run convert → model update → refine → extract → annotate on one frame
    pub fn process(&mut self, frame: &RgbImage) -> Result<FrameAnalysis, DetectionError> {
        let gray = to_grayscale(frame)?;
        let raw_mask = match self.model.apply(&gray) {
            Err(DetectionError::FrameSizeChanged { expected, actual }) => {
                tracing::warn!(
                    "Frame size changed from {}x{} to {}x{}; re-seeding background model",
                    expected.0,
                    expected.1,
                    actual.0,
                    actual.1
                );
                self.model.reset();
                self.model.apply(&gray)?
            }
            result => result?,
        };
        let mask = self.refiner.refine(&raw_mask);
        let contours = self.extractor.extract(&mask);
        let annotated = self.annotator.annotate(frame, &contours);

        Ok(FrameAnalysis {
            mask,
            contours,
            annotated,
        })
    }

    /// Pick the image to display for a processed frame
    pub fn view<'a>(&self, analysis: &'a FrameAnalysis, mode: ViewMode) -> Cow<'a, RgbImage> {
        match mode {
            ViewMode::Annotated => Cow::Borrowed(&analysis.annotated),
            ViewMode::Mask => Cow::Owned(gray_to_rgb(&analysis.mask)),
            ViewMode::Background => match self.model.background_image() {
                Some(background) => Cow::Owned(gray_to_rgb(&background)),
                None => Cow::Borrowed(&analysis.annotated),
            },
        }
    }

    pub fn frames_modelled(&self) -> u64 {
        self.model.frames_seen()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// How long the sink may wait for user input after each frame
    pub frame_delay: Duration,
    pub view: ViewMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            frame_delay: Duration::from_millis(30),
            view: ViewMode::Annotated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Source exhausted, or a frame could not be read
    EndOfStream,
    UserRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub skipped: u64,
    pub stop: StopReason,
}

/// Drive frames from `source` through `pipeline` into `sink`, strictly one at a time
pub fn run_pipeline<S, D>(
    source: &mut S,
    sink: &mut D,
    pipeline: &mut MotionPipeline,
    options: &RunOptions,
) -> Result<RunSummary>
where
    S: FrameSource + ?Sized,
    D: DisplaySink + ?Sized,
{
    let mut frame_count = 0u64;
    let mut skipped = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_analysis_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    let (width, height) = source.resolution();
    tracing::info!("Starting motion detection on {}x{} stream", width, height);

    let stop = loop {
        let capture_start = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) if frame.width() > 0 && frame.height() > 0 => frame,
            Ok(Some(_)) => {
                tracing::warn!("Received an empty frame; treating it as end of stream");
                break StopReason::EndOfStream;
            }
            Ok(None) => {
                tracing::info!("End of video stream reached");
                break StopReason::EndOfStream;
            }
            Err(e) => {
                tracing::warn!("Unable to read frame ({:#}); treating it as end of stream", e);
                break StopReason::EndOfStream;
            }
        };
        total_capture_time += capture_start.elapsed();

        let analysis_start = Instant::now();
        let analysis = match pipeline.process(&frame) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::warn!("Skipping frame {}: {}", frame_count + 1, e);
                skipped += 1;
                None
            }
        };
        total_analysis_time += analysis_start.elapsed();

        let output_start = Instant::now();
        if let Some(analysis) = &analysis {
            for contour in &analysis.contours {
                if let Some(bbox) = contour.bounding_box() {
                    tracing::debug!(
                        frame = frame_count + 1,
                        x = bbox.min.x,
                        y = bbox.min.y,
                        width = bbox.width(),
                        height = bbox.height(),
                        vertices = contour.len(),
                        area = contour.area(),
                        "moving region"
                    );
                }
            }
            let shown = pipeline.view(analysis, options.view);
            sink.show(&shown).context("Failed to display frame")?;
        }
        total_output_time += output_start.elapsed();

        frame_count += 1;

        if frame_count % STATS_INTERVAL == 0 {
            let per_frame = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_capture_ms = per_frame(total_capture_time);
            let avg_analysis_ms = per_frame(total_analysis_time);
            let avg_output_ms = per_frame(total_output_time);
            let total_ms = avg_capture_ms + avg_analysis_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, analysis={:.1}ms, output={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_analysis_ms,
                avg_output_ms,
                1000.0 / total_ms.max(f64::EPSILON)
            );
        }

        if sink
            .poll_cancel(options.frame_delay)
            .context("Failed to poll display for input")?
        {
            tracing::info!("Video playback stopped by user");
            break StopReason::UserRequested;
        }
    };

    tracing::info!(
        "Processed {} frames ({} skipped, {} modelled)",
        frame_count,
        skipped,
        pipeline.frames_modelled()
    );

    Ok(RunSummary {
        frames: frame_count,
        skipped,
        stop,
    })
}

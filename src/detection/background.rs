use super::types::{BackgroundSubtractor, ForegroundMask, BACKGROUND, FOREGROUND};
use crate::error::{DetectionError, Result};
use image::{GrayImage, Luma};
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Zip};

/// Tuning for the per-pixel Gaussian mixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundConfig {
    /// Maximum number of Gaussian components per pixel
    pub max_components: usize,
    /// Adaptation speed; 1/history
    pub learning_rate: f32,
    /// Squared Mahalanobis distance under which a sample matches a component
    pub match_threshold: f32,
    /// Cumulative weight the background components must exceed
    pub background_ratio: f32,
    pub initial_variance: f32,
    pub min_variance: f32,
    pub max_variance: f32,
    pub detect_shadows: bool,
    pub shadow_value: u8,
    /// Darkest brightness ratio still accepted as shadow
    pub shadow_threshold: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_components: 5,
            learning_rate: 1.0 / 500.0,
            match_threshold: 16.0,
            background_ratio: 0.9,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            detect_shadows: false,
            shadow_value: 127,
            shadow_threshold: 0.5,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DetectionError::InvalidConfig(msg));

        if self.max_components == 0 || self.max_components > u8::MAX as usize {
            return invalid(format!(
                "max_components must be in 1..=255, got {}",
                self.max_components
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return invalid(format!(
                "match_threshold must be positive, got {}",
                self.match_threshold
            ));
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return invalid(format!(
                "background_ratio must be in (0, 1], got {}",
                self.background_ratio
            ));
        }
        if !(self.min_variance > 0.0
            && self.min_variance <= self.max_variance
            && self.max_variance.is_finite())
        {
            return invalid(format!(
                "variance bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.min_variance, self.max_variance
            ));
        }
        if !(self.initial_variance.is_finite() && self.initial_variance > 0.0) {
            return invalid(format!(
                "initial_variance must be positive, got {}",
                self.initial_variance
            ));
        }
        if !(0.0..=1.0).contains(&self.shadow_threshold) {
            return invalid(format!(
                "shadow_threshold must be in [0, 1], got {}",
                self.shadow_threshold
            ));
        }
        if self.detect_shadows && (self.shadow_value == BACKGROUND || self.shadow_value == FOREGROUND)
        {
            return invalid(format!(
                "shadow_value must differ from background and foreground, got {}",
                self.shadow_value
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Gaussian {
    weight: f32,
    mean: f32,
    variance: f32,
}

impl Gaussian {
    /// Ranking key: confident, narrow components come first
    fn fitness(&self) -> f32 {
        self.weight / self.variance
    }
}

/// Learned state, one row of `max_components` slots per pixel
struct MixtureArena {
    width: u32,
    height: u32,
    components: Array2<Gaussian>,
    counts: Array1<u8>,
}

/// Adaptive Gaussian-mixture background model over grayscale frames
///
/// Each pixel keeps up to `max_components` weighted Gaussians ranked by
/// weight/variance. The leading components whose weights add up past
/// `background_ratio` describe the background; a sample matching none of
/// them is foreground.
pub struct MixtureModel {
    config: BackgroundConfig,
    arena: Option<MixtureArena>,
    frames_seen: u64,
}

impl MixtureModel {
    pub fn new(config: BackgroundConfig) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            components = config.max_components,
            learning_rate = config.learning_rate,
            match_threshold = config.match_threshold,
            background_ratio = config.background_ratio,
            detect_shadows = config.detect_shadows,
            "Background model configured"
        );

        Ok(Self {
            config,
            arena: None,
            frames_seen: 0,
        })
    }

    fn seed(&mut self, frame: &GrayImage) {
        let (width, height) = frame.dimensions();
        let pixels = width as usize * height as usize;
        let mut components = Array2::<Gaussian>::default((pixels, self.config.max_components));

        for (slot, &value) in components.column_mut(0).iter_mut().zip(frame.as_raw()) {
            *slot = Gaussian {
                weight: 1.0,
                mean: value as f32,
                variance: self.config.initial_variance,
            };
        }

        tracing::debug!("Seeding background model at {}x{}", width, height);

        self.arena = Some(MixtureArena {
            width,
            height,
            components,
            counts: Array1::from_elem(pixels, 1),
        });
    }
}

impl BackgroundSubtractor for MixtureModel {
    fn apply(&mut self, frame: &GrayImage) -> Result<ForegroundMask> {
        let _span = tracing::debug_span!("background_model").entered();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyFrame);
        }

        let Some(arena) = self.arena.as_mut() else {
            self.seed(frame);
            self.frames_seen = 1;
            return Ok(ForegroundMask::new(width, height));
        };

        if (arena.width, arena.height) != (width, height) {
            return Err(DetectionError::FrameSizeChanged {
                expected: (arena.width, arena.height),
                actual: (width, height),
            });
        }

        let config = self.config;
        let mut mask = vec![BACKGROUND; width as usize * height as usize];

        Zip::from(arena.components.rows_mut())
            .and(&mut arena.counts)
            .and(ArrayView1::from(frame.as_raw().as_slice()))
            .and(ArrayViewMut1::from(mask.as_mut_slice()))
            .for_each(|mut mixture, count, &value, label| {
                *label = update_pixel(&mut mixture, count, value as f32, &config);
            });

        self.frames_seen += 1;

        ForegroundMask::from_raw(width, height, mask).ok_or(DetectionError::EmptyFrame)
    }

    fn reset(&mut self) {
        tracing::info!("Resetting background model");
        self.arena = None;
        self.frames_seen = 0;
    }

    fn background_image(&self) -> Option<GrayImage> {
        let arena = self.arena.as_ref()?;
        let means = arena.components.column(0);

        Some(GrayImage::from_fn(arena.width, arena.height, |x, y| {
            let idx = y as usize * arena.width as usize + x as usize;
            Luma([means[idx].mean.round().clamp(0.0, 255.0) as u8])
        }))
    }

    fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

/// Classify one sample and fold it into that pixel's mixture
///
/// Slots `0..count` hold live components ranked by fitness, best first.
fn update_pixel(
    mixture: &mut ArrayViewMut1<Gaussian>,
    count: &mut u8,
    value: f32,
    config: &BackgroundConfig,
) -> u8 {
    let live = *count as usize;

    let mut background_len = live;
    let mut cumulative = 0.0;
    for k in 0..live {
        cumulative += mixture[k].weight;
        if cumulative > config.background_ratio {
            background_len = k + 1;
            break;
        }
    }

    let matched = (0..live).find(|&k| {
        let g = mixture[k];
        let d = value - g.mean;
        d * d < config.match_threshold * g.variance.max(config.min_variance)
    });

    let label = match matched {
        Some(k) if k < background_len => BACKGROUND,
        _ if config.detect_shadows && is_shadow(mixture, background_len, value, config) => {
            config.shadow_value
        }
        _ => FOREGROUND,
    };

    let alpha = config.learning_rate;
    for k in 0..live {
        mixture[k].weight *= 1.0 - alpha;
    }

    let live = match matched {
        Some(k) => {
            let g = &mut mixture[k];
            g.weight += alpha;
            let rho = (alpha / g.weight).min(1.0);
            let d = value - g.mean;
            g.mean += rho * d;
            g.variance = (g.variance + rho * (d * d - g.variance))
                .clamp(config.min_variance, config.max_variance);
            live
        }
        None => {
            let (slot, live) = if live < config.max_components {
                (live, live + 1)
            } else {
                (lowest_weight(mixture, live), live)
            };
            mixture[slot] = Gaussian {
                weight: alpha,
                mean: value,
                variance: config.initial_variance,
            };
            live
        }
    };
    *count = live as u8;

    let total: f32 = (0..live).map(|k| mixture[k].weight).sum();
    if total > 0.0 {
        for k in 0..live {
            mixture[k].weight /= total;
        }
    }

    // Insertion sort; at most one component moved this frame
    for i in 1..live {
        let mut j = i;
        while j > 0 && mixture[j].fitness() > mixture[j - 1].fitness() {
            mixture.swap(j, j - 1);
            j -= 1;
        }
    }

    label
}

fn lowest_weight(mixture: &ArrayViewMut1<Gaussian>, live: usize) -> usize {
    (1..live).fold(0, |lowest, k| {
        if mixture[k].weight < mixture[lowest].weight {
            k
        } else {
            lowest
        }
    })
}

/// A darker copy of a background component counts as shadow
fn is_shadow(
    mixture: &ArrayViewMut1<Gaussian>,
    background_len: usize,
    value: f32,
    config: &BackgroundConfig,
) -> bool {
    (0..background_len).any(|k| {
        let mean = mixture[k].mean;
        if mean <= 0.0 {
            return false;
        }
        let ratio = value / mean;
        ratio >= config.shadow_threshold && ratio < 1.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MixtureModel {
        MixtureModel::new(BackgroundConfig::default()).unwrap()
    }

    fn train(model: &mut MixtureModel, frame: &GrayImage, times: usize) {
        for _ in 0..times {
            model.apply(frame).unwrap();
        }
    }

    #[test]
    fn first_frame_seeds_and_reports_background() {
        let mut model = model();
        let frame = GrayImage::from_pixel(8, 6, Luma([90]));

        let mask = model.apply(&frame).unwrap();

        assert_eq!(mask.dimensions(), (8, 6));
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        assert_eq!(model.frames_seen(), 1);
    }

    #[test]
    fn unchanged_pixel_is_background_and_changed_pixel_foreground() {
        let mut model = model();
        let frame = GrayImage::from_pixel(4, 4, Luma([100]));
        train(&mut model, &frame, 5);

        let mut next = frame.clone();
        next.put_pixel(2, 1, Luma([200]));
        let mask = model.apply(&next).unwrap();

        assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);
        assert_eq!(mask.get_pixel(2, 1)[0], FOREGROUND);
        assert_eq!(mask.pixels().filter(|p| p[0] == FOREGROUND).count(), 1);
    }

    #[test]
    fn small_drift_within_threshold_stays_background() {
        let mut model = model();
        let frame = GrayImage::from_pixel(3, 3, Luma([100]));
        train(&mut model, &frame, 10);

        // Variance is still close to its initial 15, a match radius of about 15 levels
        let drifted = GrayImage::from_pixel(3, 3, Luma([106]));
        let mask = model.apply(&drifted).unwrap();

        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn persistent_change_is_eventually_absorbed() {
        let config = BackgroundConfig {
            learning_rate: 0.1,
            ..BackgroundConfig::default()
        };
        let mut model = MixtureModel::new(config).unwrap();
        train(&mut model, &GrayImage::from_pixel(2, 2, Luma([50])), 5);

        let moved = GrayImage::from_pixel(2, 2, Luma([220]));
        let first = model.apply(&moved).unwrap();
        assert!(first.pixels().all(|p| p[0] == FOREGROUND));

        train(&mut model, &moved, 60);
        let later = model.apply(&moved).unwrap();
        assert!(later.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn flat_history_never_divides_by_zero() {
        let mut model = model();
        let frame = GrayImage::from_pixel(2, 2, Luma([0]));
        train(&mut model, &frame, 50);

        let mask = model.apply(&frame).unwrap();
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));

        let arena = model.arena.as_ref().unwrap();
        for (mixture, &count) in arena.components.rows().into_iter().zip(arena.counts.iter()) {
            assert!(count >= 1);
            for g in mixture.iter().take(count as usize) {
                assert!(g.variance >= model.config.min_variance);
                assert!(g.weight.is_finite() && g.mean.is_finite());
            }
        }
    }

    #[test]
    fn background_image_of_wide_frame_keeps_layout() {
        let mut model = model();
        let frame = GrayImage::from_fn(5, 2, |x, y| Luma([(y * 5 + x) as u8 * 10]));
        model.apply(&frame).unwrap();

        let mask = model.apply(&frame).unwrap();
        assert_eq!(mask.dimensions(), (5, 2));
        assert_eq!(mask.as_raw().len(), 10);
        assert_eq!(model.background_image().unwrap(), frame);
    }

    #[test]
    fn capacity_replaces_weakest_component() {
        let config = BackgroundConfig {
            max_components: 2,
            ..BackgroundConfig::default()
        };
        let mut model = MixtureModel::new(config).unwrap();
        train(&mut model, &GrayImage::from_pixel(1, 1, Luma([10])), 3);

        for value in [100u8, 200, 150] {
            model.apply(&GrayImage::from_pixel(1, 1, Luma([value]))).unwrap();
        }

        let arena = model.arena.as_ref().unwrap();
        assert_eq!(arena.counts[0], 2);
        let means: Vec<f32> = arena.components.row(0).iter().map(|g| g.mean).collect();
        assert!(means.contains(&10.0));
        assert!(means.contains(&150.0));

        let total: f32 = arena.components.row(0).iter().map(|g| g.weight).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn shadows_are_flagged_when_enabled() {
        let config = BackgroundConfig {
            detect_shadows: true,
            ..BackgroundConfig::default()
        };
        let mut model = MixtureModel::new(config).unwrap();
        train(&mut model, &GrayImage::from_pixel(3, 1, Luma([200])), 5);

        let mut next = GrayImage::from_pixel(3, 1, Luma([200]));
        next.put_pixel(0, 0, Luma([140]));
        next.put_pixel(2, 0, Luma([20]));
        let mask = model.apply(&next).unwrap();

        assert_eq!(mask.get_pixel(0, 0)[0], 127);
        assert_eq!(mask.get_pixel(1, 0)[0], BACKGROUND);
        assert_eq!(mask.get_pixel(2, 0)[0], FOREGROUND);
    }

    #[test]
    fn rejects_frame_size_change() {
        let mut model = model();
        model.apply(&GrayImage::new(4, 4)).unwrap();

        let err = model.apply(&GrayImage::new(5, 4)).unwrap_err();
        assert_eq!(
            err,
            DetectionError::FrameSizeChanged {
                expected: (4, 4),
                actual: (5, 4)
            }
        );
    }

    #[test]
    fn reset_reseeds_on_next_frame() {
        let mut model = model();
        train(&mut model, &GrayImage::from_pixel(2, 2, Luma([30])), 3);
        model.reset();
        assert!(model.background_image().is_none());

        let mask = model.apply(&GrayImage::from_pixel(3, 3, Luma([240]))).unwrap();
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        assert_eq!(model.frames_seen(), 1);
        assert_eq!(model.background_image().unwrap().get_pixel(1, 1)[0], 240);
    }

    #[test]
    fn same_sequence_gives_same_masks() {
        let frames: Vec<GrayImage> = (0..6u32)
            .map(|i| GrayImage::from_fn(5, 5, |x, y| Luma([((x * 40 + y * 7 + i * 31) % 255) as u8])))
            .collect();

        let run = || {
            let mut model = model();
            frames.iter().map(|f| model.apply(f).unwrap()).collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let bad = [
            BackgroundConfig {
                max_components: 0,
                ..BackgroundConfig::default()
            },
            BackgroundConfig {
                learning_rate: 0.0,
                ..BackgroundConfig::default()
            },
            BackgroundConfig {
                background_ratio: 1.5,
                ..BackgroundConfig::default()
            },
            BackgroundConfig {
                min_variance: 0.0,
                ..BackgroundConfig::default()
            },
            BackgroundConfig {
                match_threshold: f32::NAN,
                ..BackgroundConfig::default()
            },
        ];

        for config in bad {
            assert!(matches!(
                MixtureModel::new(config),
                Err(DetectionError::InvalidConfig(_))
            ));
        }
    }
}

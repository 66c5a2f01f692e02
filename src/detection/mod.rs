mod annotate;
mod background;
mod contours;
mod grayscale;
mod refine;
pub mod types;

pub use annotate::Annotator;
pub use background::{BackgroundConfig, MixtureModel};
pub use contours::{Approximation, ContourExtractor};
pub use grayscale::{gray_to_rgb, to_grayscale};
pub use refine::{KernelShape, MaskRefiner, StructuringElement, DEFAULT_STALE_MARKER};
pub use types::{BackgroundSubtractor, Contour, ForegroundMask};

use crate::error::Result;

/// Create the default background model (Gaussian mixture)
pub fn create_default_model(config: BackgroundConfig) -> Result<Box<dyn BackgroundSubtractor>> {
    let model = MixtureModel::new(config)?;
    Ok(Box::new(model))
}

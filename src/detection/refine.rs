use super::types::{ForegroundMask, BACKGROUND, FOREGROUND};
use image::GrayImage;

/// Marker left behind by an earlier mask encoding; cleared before opening
pub const DEFAULT_STALE_MARKER: u8 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum KernelShape {
    #[default]
    Rect,
    Cross,
    Ellipse,
}

/// Binary structuring element anchored at its centre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    /// Offsets (dx, dy) of the set cells relative to the anchor
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// Build an element from a possibly fractional size, rounded up to at least 1x1
    pub fn new(shape: KernelShape, width: f32, height: f32) -> Self {
        let width = round_size(width);
        let height = round_size(height);
        let (ax, ay) = ((width / 2) as i32, (height / 2) as i32);

        let mut offsets = Vec::new();
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let set = match shape {
                    KernelShape::Rect => true,
                    KernelShape::Cross => x == ax || y == ay,
                    KernelShape::Ellipse => {
                        let rx = width as f32 / 2.0;
                        let ry = height as f32 / 2.0;
                        let nx = (x as f32 + 0.5 - rx) / rx;
                        let ny = (y as f32 + 0.5 - ry) / ry;
                        nx * nx + ny * ny <= 1.0
                    }
                };
                if set {
                    offsets.push((x - ax, y - ay));
                }
            }
        }

        Self {
            width,
            height,
            offsets,
        }
    }

    pub fn rect(width: f32, height: f32) -> Self {
        Self::new(KernelShape::Rect, width, height)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for StructuringElement {
    fn default() -> Self {
        Self::rect(2.5, 3.0)
    }
}

fn round_size(value: f32) -> u32 {
    if value.is_finite() && value > 1.0 {
        value.ceil() as u32
    } else {
        1
    }
}

/// Cleans a raw foreground mask before contour extraction
#[derive(Debug, Clone)]
pub struct MaskRefiner {
    stale_marker: Option<u8>,
    element: StructuringElement,
}

impl Default for MaskRefiner {
    fn default() -> Self {
        Self {
            stale_marker: Some(DEFAULT_STALE_MARKER),
            element: StructuringElement::default(),
        }
    }
}

impl MaskRefiner {
    pub fn new(stale_marker: Option<u8>, element: StructuringElement) -> Self {
        if stale_marker == Some(FOREGROUND) {
            tracing::warn!("Stale marker equals the foreground value; every detection will be cleared");
        }
        Self {
            stale_marker,
            element,
        }
    }

    /// Clear stale markers, binarize, then open with the structuring element
    pub fn refine(&self, mask: &ForegroundMask) -> ForegroundMask {
        let _span = tracing::debug_span!("refine_mask").entered();

        let stale = self.stale_marker;
        let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            let value = mask.get_pixel(x, y)[0];
            let keep = value != BACKGROUND && Some(value) != stale;
            image::Luma([if keep { FOREGROUND } else { BACKGROUND }])
        });

        self.open(&binary)
    }

    /// Morphological opening of a binary mask
    pub fn open(&self, mask: &ForegroundMask) -> ForegroundMask {
        let eroded = erode(mask, &self.element);
        dilate(&eroded, &self.element)
    }
}

/// A pixel survives when the element placed on it lies entirely on
/// foreground; cells outside the mask count as background.
fn erode(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);

    GrayImage::from_fn(width, height, |x, y| {
        let fits = element.offsets.iter().all(|&(dx, dy)| {
            let (sx, sy) = (x as i32 + dx, y as i32 + dy);
            sx >= 0 && sy >= 0 && sx < w && sy < h && mask.get_pixel(sx as u32, sy as u32)[0] != 0
        });
        image::Luma([if fits { FOREGROUND } else { BACKGROUND }])
    })
}

/// Dilation with the reflected element so that erode-then-dilate is a true opening
fn dilate(mask: &GrayImage, element: &StructuringElement) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);

    GrayImage::from_fn(width, height, |x, y| {
        let hit = element.offsets.iter().any(|&(dx, dy)| {
            let (sx, sy) = (x as i32 - dx, y as i32 - dy);
            sx >= 0 && sy >= 0 && sx < w && sy < h && mask.get_pixel(sx as u32, sy as u32)[0] != 0
        });
        image::Luma([if hit { FOREGROUND } else { BACKGROUND }])
    })
}

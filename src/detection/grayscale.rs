use crate::error::{DetectionError, Result};
use image::{GrayImage, Luma, RgbImage};

// BT.601 luma weights in 1/2^14 fixed point; they sum to 1 << 14
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Convert an RGB frame to single-channel luma of identical dimensions
pub fn to_grayscale(frame: &RgbImage) -> Result<GrayImage> {
    let _span = tracing::debug_span!("grayscale").entered();

    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectionError::EmptyFrame);
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    }))
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT;
    ((weighted + (1 << (SHIFT - 1))) >> SHIFT) as u8
}

/// Expand a single-channel image to RGB for display
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0];
        image::Rgb([value, value, value])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn keeps_dimensions() {
        let frame = RgbImage::from_pixel(7, 3, Rgb([10, 20, 30]));
        let gray = to_grayscale(&frame).unwrap();
        assert_eq!(gray.dimensions(), (7, 3));
    }

    #[test]
    fn uses_standard_luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
        assert_eq!(luma(128, 128, 128), 128);
    }

    #[test]
    fn rejects_empty_frame() {
        let frame = RgbImage::new(0, 5);
        assert_eq!(to_grayscale(&frame), Err(DetectionError::EmptyFrame));
    }

    #[test]
    fn gray_expands_to_equal_channels() {
        let gray = GrayImage::from_pixel(2, 2, Luma([99]));
        let rgb = gray_to_rgb(&gray);
        assert!(rgb.pixels().all(|p| p.0 == [99, 99, 99]));
    }
}

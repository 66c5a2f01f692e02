use crate::error::Result;
use image::GrayImage;

/// Mask value for background pixels
pub const BACKGROUND: u8 = 0;

/// Mask value for foreground pixels
pub const FOREGROUND: u8 = 255;

/// Foreground mask: 0 = background, 255 = foreground, optionally a
/// separate shadow value. Dimensions match the analysed frame.
pub type ForegroundMask = GrayImage;

/// Trait for adaptive background models
/// Allows swapping the mixture model for simpler subtractors in tests or tooling
pub trait BackgroundSubtractor {
    /// Classify a grayscale frame against the model and fold it into the model
    ///
    /// The returned mask reflects the model as it stood before this frame.
    fn apply(&mut self, frame: &GrayImage) -> Result<ForegroundMask>;

    /// Drop everything learned so far; the next frame seeds a fresh model
    fn reset(&mut self) {
        // Default implementation: no-op for stateless subtractors
    }

    /// Current estimate of the background, if the model has seen a frame
    fn background_image(&self) -> Option<GrayImage>;

    /// Number of frames folded into the model since the last reset
    fn frames_seen(&self) -> u64;
}

/// Integer pixel position, x to the right and y downwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in pixel coordinates, inclusive of both corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        (self.max.x - self.min.x + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max.y - self.min.y + 1) as u32
    }
}

/// Outer boundary of one 8-connected foreground component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub(crate) fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = *self.points.first()?;
        let bbox = self.points.iter().fold(
            BoundingBox {
                min: first,
                max: first,
            },
            |acc, p| BoundingBox {
                min: Point::new(acc.min.x.min(p.x), acc.min.y.min(p.y)),
                max: Point::new(acc.max.x.max(p.x), acc.max.y.max(p.y)),
            },
        );
        Some(bbox)
    }

    /// Polygon area enclosed by the vertices (shoelace formula)
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }

        let twice: i64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
            })
            .sum();

        twice.abs() as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_area_and_bounds() {
        let contour = Contour::new(vec![
            Point::new(2, 3),
            Point::new(2, 12),
            Point::new(11, 12),
            Point::new(11, 3),
        ]);

        assert_eq!(contour.area(), 81.0);
        let bbox = contour.bounding_box().unwrap();
        assert_eq!(bbox.min, Point::new(2, 3));
        assert_eq!(bbox.max, Point::new(11, 12));
        assert_eq!((bbox.width(), bbox.height()), (10, 10));
    }

    #[test]
    fn degenerate_contours_have_no_area() {
        let single = Contour::new(vec![Point::new(4, 4)]);
        assert_eq!(single.area(), 0.0);
        assert_eq!(single.bounding_box().unwrap().width(), 1);
        assert!(Contour::new(Vec::new()).bounding_box().is_none());
    }
}

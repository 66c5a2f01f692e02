use super::types::Contour;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

/// Draws contour outlines onto a copy of the colour frame
#[derive(Debug, Clone)]
pub struct Annotator {
    color: Rgb<u8>,
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            thickness: 2,
        }
    }
}

impl Annotator {
    pub fn new(color: Rgb<u8>, thickness: u32) -> Self {
        Self {
            color,
            thickness: thickness.max(1),
        }
    }

    /// Return a new frame with every contour drawn as a closed polyline
    pub fn annotate(&self, frame: &RgbImage, contours: &[Contour]) -> RgbImage {
        let _span = tracing::debug_span!("annotate").entered();

        let mut output = frame.clone();
        for contour in contours {
            self.draw_contour(&mut output, contour);
        }
        output
    }

    fn draw_contour(&self, image: &mut RgbImage, contour: &Contour) {
        if contour.is_empty() {
            return;
        }

        match contour.points() {
            [only] => self.stamp(image, only.x, only.y),
            points => {
                for (i, start) in points.iter().enumerate() {
                    let end = points[(i + 1) % points.len()];
                    for (dx, dy) in self.pen_offsets() {
                        draw_line_segment_mut(
                            image,
                            ((start.x + dx) as f32, (start.y + dy) as f32),
                            ((end.x + dx) as f32, (end.y + dy) as f32),
                            self.color,
                        );
                    }
                }
            }
        }
    }

    fn stamp(&self, image: &mut RgbImage, x: i32, y: i32) {
        let (width, height) = (image.width() as i32, image.height() as i32);
        for (dx, dy) in self.pen_offsets() {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && px < width && py < height {
                image.put_pixel(px as u32, py as u32, self.color);
            }
        }
    }

    /// Square pen footprint, centred on the stroke
    fn pen_offsets(&self) -> impl Iterator<Item = (i32, i32)> {
        let t = self.thickness as i32;
        let lo = -(t / 2);
        let hi = lo + t;
        (lo..hi).flat_map(move |dy| (lo..hi).map(move |dx| (dx, dy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Point;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8 * 3, y as u8 * 5, 77]))
    }

    fn square(x0: i32, y0: i32, size: i32) -> Contour {
        Contour::new(vec![
            Point::new(x0, y0),
            Point::new(x0, y0 + size - 1),
            Point::new(x0 + size - 1, y0 + size - 1),
            Point::new(x0 + size - 1, y0),
        ])
    }

    #[test]
    fn no_contours_returns_identical_frame() {
        let frame = gradient(20, 20);
        assert_eq!(Annotator::default().annotate(&frame, &[]), frame);
    }

    #[test]
    fn draws_closed_outline_and_keeps_other_pixels() {
        let frame = gradient(30, 30);
        let annotated = Annotator::new(Rgb([0, 255, 0]), 1).annotate(&frame, &[square(10, 10, 10)]);

        assert_eq!(annotated.dimensions(), frame.dimensions());
        for (x, y) in [(10, 10), (10, 19), (19, 19), (19, 10), (15, 10), (10, 15)] {
            assert_eq!(annotated.get_pixel(x, y), &Rgb([0, 255, 0]));
        }

        for (x, y, pixel) in annotated.enumerate_pixels() {
            let on_outline = (x == 10 || x == 19) && (10..=19).contains(&y)
                || (y == 10 || y == 19) && (10..=19).contains(&x);
            if !on_outline {
                assert_eq!(pixel, frame.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn thick_stroke_stays_near_the_outline() {
        let frame = gradient(40, 40);
        let annotated = Annotator::default().annotate(&frame, &[square(15, 15, 10)]);

        for (x, y, pixel) in annotated.enumerate_pixels() {
            let near = (13..=25).contains(&x) && (13..=25).contains(&y);
            let interior = (16..=22).contains(&x) && (16..=22).contains(&y);
            if !near || interior {
                assert_eq!(pixel, frame.get_pixel(x, y));
            }
        }
        assert_eq!(annotated.get_pixel(14, 20), &Rgb([0, 255, 0]));
        assert_eq!(annotated.get_pixel(15, 20), &Rgb([0, 255, 0]));
    }

    #[test]
    fn single_point_and_edge_contours_are_clipped() {
        let frame = gradient(8, 8);
        let contours = vec![
            Contour::new(vec![Point::new(0, 0)]),
            square(5, 5, 3),
        ];

        let annotated = Annotator::new(Rgb([255, 0, 0]), 3).annotate(&frame, &contours);

        assert_eq!(annotated.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(annotated.get_pixel(1, 1), &Rgb([255, 0, 0]));
        assert_eq!(annotated.get_pixel(7, 7), &Rgb([255, 0, 0]));
        assert_eq!(annotated.get_pixel(3, 0), frame.get_pixel(3, 0));
    }
}

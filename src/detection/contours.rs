use super::types::{Contour, ForegroundMask, Point};

/// How much of each traced boundary is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Approximation {
    /// Every boundary pixel
    None,
    /// Only the vertices where the trace changes direction
    #[default]
    Simple,
}

// Neighbour offsets in counter-clockwise order as seen on screen (y down),
// starting east.
const DIRECTIONS: [(isize, isize); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const EAST: usize = 0;
const WEST: usize = 4;

/// Label of the frame surrounding the image
const FRAME: i32 = 1;

/// Extracts the external boundaries of 8-connected foreground components
///
/// Border following after Suzuki and Abe (1985) over a copy of the mask padded
/// with one background pixel on each side, so components touching the image
/// edge are traced like any other. Outer borders run counter-clockwise on
/// screen and start at the component's first pixel in raster order. Holes and
/// anything nested inside a hole are skipped.
#[derive(Debug, Clone, Default)]
pub struct ContourExtractor {
    approximation: Approximation,
}

struct Border {
    is_hole: bool,
    parent: i32,
}

impl ContourExtractor {
    pub fn new(approximation: Approximation) -> Self {
        Self { approximation }
    }

    pub fn extract(&self, mask: &ForegroundMask) -> Vec<Contour> {
        let _span = tracing::debug_span!("find_contours").entered();

        let mut grid = LabelGrid::from_mask(mask);
        let mut borders = vec![
            Border {
                is_hole: false,
                parent: 0,
            },
            Border {
                is_hole: true,
                parent: 0,
            },
        ];
        let mut contours = Vec::new();

        for row in 1..grid.height - 1 {
            let mut last_border = FRAME;

            for col in 1..grid.width - 1 {
                let value = grid.get(col, row);
                if value == 0 {
                    continue;
                }

                let start = if value == 1 && grid.get(col - 1, row) == 0 {
                    Some((false, WEST))
                } else if value >= 1 && grid.get(col + 1, row) == 0 {
                    if value > 1 {
                        last_border = value;
                    }
                    Some((true, EAST))
                } else {
                    None
                };

                if let Some((is_hole, from)) = start {
                    let label = borders.len() as i32;
                    let previous = &borders[last_border as usize];
                    let parent = if is_hole == previous.is_hole {
                        previous.parent
                    } else {
                        last_border
                    };
                    borders.push(Border { is_hole, parent });

                    let trace = grid.follow(col, row, from, label);
                    if !is_hole && parent == FRAME {
                        contours.push(self.finish(trace));
                    }
                }

                let value = grid.get(col, row);
                if value != 1 {
                    last_border = value.abs();
                }
            }
        }

        tracing::debug!("Found {} external contours", contours.len());
        contours
    }

    fn finish(&self, trace: Vec<(usize, usize)>) -> Contour {
        let to_point = |(x, y): (usize, usize)| Point::new(x as i32 - 1, y as i32 - 1);

        let points = match self.approximation {
            Approximation::None => trace.into_iter().map(to_point).collect(),
            Approximation::Simple => compress(&trace).into_iter().map(to_point).collect(),
        };

        Contour::new(points)
    }
}

/// Keep only the pixels where the closed trace turns
fn compress(trace: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let n = trace.len();
    if n < 3 {
        return trace.to_vec();
    }

    let step = |a: (usize, usize), b: (usize, usize)| {
        (b.0 as isize - a.0 as isize, b.1 as isize - a.1 as isize)
    };

    (0..n)
        .filter(|&i| {
            let prev = trace[(i + n - 1) % n];
            let next = trace[(i + 1) % n];
            step(prev, trace[i]) != step(trace[i], next)
        })
        .map(|i| trace[i])
        .collect()
}

/// Padded working copy: 0 = background, 1 = unvisited foreground, other
/// values are border labels (negative where the pixel's east side is open).
struct LabelGrid {
    width: usize,
    height: usize,
    cells: Vec<i32>,
}

impl LabelGrid {
    fn from_mask(mask: &ForegroundMask) -> Self {
        let width = mask.width() as usize + 2;
        let height = mask.height() as usize + 2;
        let mut cells = vec![0; width * height];

        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel[0] != 0 {
                cells[(y as usize + 1) * width + x as usize + 1] = 1;
            }
        }

        Self {
            width,
            height,
            cells,
        }
    }

    fn get(&self, x: usize, y: usize) -> i32 {
        self.cells[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, value: i32) {
        self.cells[y * self.width + x] = value;
    }

    fn neighbour(x: usize, y: usize, dir: usize) -> (usize, usize) {
        let (dx, dy) = DIRECTIONS[dir];
        (x.wrapping_add_signed(dx), y.wrapping_add_signed(dy))
    }

    /// Follow the border starting at (x, y), whose background neighbour lies
    /// in direction `from`. Labels the border pixels and returns them in order.
    fn follow(&mut self, x: usize, y: usize, from: usize, label: i32) -> Vec<(usize, usize)> {
        // Clockwise sweep for the first foreground neighbour
        let Some(first_dir) = (0..8)
            .map(|i| (from + 8 - i) % 8)
            .find(|&dir| {
                let (nx, ny) = Self::neighbour(x, y, dir);
                self.get(nx, ny) != 0
            })
        else {
            self.set(x, y, -label);
            return vec![(x, y)];
        };

        let start = (x, y);
        let second = Self::neighbour(x, y, first_dir);
        let mut trace = vec![start];
        let mut previous = second;
        let mut current = start;

        loop {
            let back = direction_to(current, previous);
            let mut east_open = false;
            let mut next = current;

            // Counter-clockwise sweep starting just after the pixel we came from
            for i in 1..=8 {
                let dir = (back + i) % 8;
                let (nx, ny) = Self::neighbour(current.0, current.1, dir);
                if self.get(nx, ny) != 0 {
                    next = (nx, ny);
                    break;
                }
                if dir == EAST {
                    east_open = true;
                }
            }

            if east_open {
                self.set(current.0, current.1, -label);
            } else if self.get(current.0, current.1) == 1 {
                self.set(current.0, current.1, label);
            }

            if next == start && current == second {
                break;
            }

            trace.push(next);
            previous = current;
            current = next;
        }

        trace
    }
}

fn direction_to(from: (usize, usize), to: (usize, usize)) -> usize {
    let delta = (
        to.0 as isize - from.0 as isize,
        to.1 as isize - from.1 as isize,
    );
    DIRECTIONS
        .iter()
        .position(|&d| d == delta)
        .unwrap_or(EAST)
}

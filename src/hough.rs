//! Progressive probabilistic Hough transform.
//!
//! Edge points are visited in a seeded random order. Each point votes in a
//! `(theta, rho)` accumulator; as soon as a bin collects enough votes, the
//! corresponding line is walked in both directions over the remaining edge
//! points (tolerating gaps of up to `max_line_gap` pixels). Points on the walked
//! run are removed from further consideration and, if the run is long enough,
//! their votes are withdrawn and the run is emitted as a segment.

use std::f64::consts::PI;

use image::GrayImage;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::instrument;

use crate::LineSegment;

const SHIFT: i32 = 16;
/// Largest width or height the 16.16 fixed-point walker can address without
/// overflowing `i32`. Larger edge maps yield no segments.
pub const MAX_DIMENSION: u32 = (1 << (31 - SHIFT)) - 1;
const DEFAULT_SEED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy)]
pub struct HoughOptions {
    /// Distance resolution of the accumulator in pixels.
    pub rho: f64,
    /// Angular resolution of the accumulator in radians.
    pub theta: f64,
    pub vote_threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
    pub seed: u64,
}

impl Default for HoughOptions {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: PI / 180.0,
            vote_threshold: 50,
            min_line_length: 50,
            max_line_gap: 20,
            seed: DEFAULT_SEED,
        }
    }
}

struct Accumulator {
    num_angle: usize,
    num_rho: usize,
    trig: Vec<(f64, f64)>,
    votes: Vec<i32>,
}

impl Accumulator {
    fn new(width: u32, height: u32, options: &HoughOptions) -> Self {
        let num_angle = ((PI / options.theta).round() as usize).max(1);
        let num_rho = ((((width + height) * 2 + 1) as f64) / options.rho).round() as usize;
        let inv_rho = 1.0 / options.rho;
        let trig = (0..num_angle)
            .map(|n| {
                let angle = n as f64 * options.theta;
                (angle.cos() * inv_rho, angle.sin() * inv_rho)
            })
            .collect();
        Self {
            num_angle,
            num_rho,
            trig,
            votes: vec![0; num_angle * num_rho],
        }
    }

    fn bin(&self, n: usize, x: i32, y: i32) -> usize {
        let (cos, sin) = self.trig[n];
        let r = (x as f64 * cos + y as f64 * sin).round() as i64 + (self.num_rho as i64 - 1) / 2;
        n * self.num_rho + r as usize
    }

    /// Adds the point's votes and returns the strongest bin it touched.
    fn vote(&mut self, x: i32, y: i32) -> (i32, usize) {
        let mut best = (0, 0);
        for n in 0..self.num_angle {
            let bin = self.bin(n, x, y);
            self.votes[bin] += 1;
            if self.votes[bin] > best.0 {
                best = (self.votes[bin], n);
            }
        }
        best
    }

    fn withdraw(&mut self, x: i32, y: i32) {
        for n in 0..self.num_angle {
            let bin = self.bin(n, x, y);
            self.votes[bin] -= 1;
        }
    }
}

/// Fixed-point walker along a Hough line, stepping one pixel along the major axis.
#[derive(Clone, Copy)]
struct Walker {
    x: i32,
    y: i32,
    dx: i32,
    dy: i32,
    x_major: bool,
}

impl Walker {
    fn new(x0: i32, y0: i32, a: f64, b: f64) -> Self {
        if a.abs() > b.abs() {
            Walker {
                x: x0,
                y: (y0 << SHIFT) + (1 << (SHIFT - 1)),
                dx: if a > 0.0 { 1 } else { -1 },
                dy: (b * (1 << SHIFT) as f64 / a.abs()).round() as i32,
                x_major: true,
            }
        } else {
            Walker {
                x: (x0 << SHIFT) + (1 << (SHIFT - 1)),
                y: y0,
                dx: (a * (1 << SHIFT) as f64 / b.abs()).round() as i32,
                dy: if b > 0.0 { 1 } else { -1 },
                x_major: false,
            }
        }
    }

    fn reversed(self) -> Self {
        Walker {
            dx: -self.dx,
            dy: -self.dy,
            ..self
        }
    }

    fn pixel(&self) -> (i32, i32) {
        if self.x_major {
            (self.x, self.y >> SHIFT)
        } else {
            (self.x >> SHIFT, self.y)
        }
    }

    fn step(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
    }
}

struct EdgeMask {
    width: i32,
    height: i32,
    data: Vec<bool>,
}

impl EdgeMask {
    fn get(&self, x: i32, y: i32) -> Option<bool> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            None
        } else {
            Some(self.data[(y * self.width + x) as usize])
        }
    }

    fn clear(&mut self, x: i32, y: i32) {
        self.data[(y * self.width + x) as usize] = false;
    }
}

/// Finds line segments among the non-zero pixels of `edges`.
#[instrument(level = "debug", skip(edges), fields(width = edges.width(), height = edges.height()))]
pub fn detect_segments(edges: &GrayImage, options: &HoughOptions) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        log::warn!("Edge map {width}x{height} exceeds {MAX_DIMENSION}px, skipping Hough transform");
        return Vec::new();
    }
    let mut accumulator = Accumulator::new(width, height, options);
    let mut mask = EdgeMask {
        width: width as i32,
        height: height as i32,
        data: edges.as_raw().iter().map(|&p| p > 0).collect(),
    };

    let mut points = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x as i32, y as i32))
        .collect::<Vec<_>>();
    points.shuffle(&mut StdRng::seed_from_u64(options.seed));
    log::trace!("Hough transform over {} edge points", points.len());

    let threshold = options.vote_threshold as i32;
    let line_gap = options.max_line_gap as i32;
    let line_length = options.min_line_length as i32;
    let mut segments = Vec::new();

    for (x0, y0) in points {
        if mask.get(x0, y0) != Some(true) {
            continue;
        }
        let (votes, best_angle) = accumulator.vote(x0, y0);
        if votes < threshold {
            continue;
        }

        let (cos, sin) = accumulator.trig[best_angle];
        let walker = Walker::new(x0, y0, -sin, cos);

        let mut line_end = [(x0, y0); 2];
        for (k, end) in line_end.iter_mut().enumerate() {
            let mut walk = if k == 0 { walker } else { walker.reversed() };
            let mut gap = 0;
            loop {
                let (x, y) = walk.pixel();
                match mask.get(x, y) {
                    None => break,
                    Some(true) => {
                        gap = 0;
                        *end = (x, y);
                    }
                    Some(false) => {
                        gap += 1;
                        if gap > line_gap {
                            break;
                        }
                    }
                }
                walk.step();
            }
        }

        let good_line = (line_end[1].0 - line_end[0].0).abs() >= line_length
            || (line_end[1].1 - line_end[0].1).abs() >= line_length;

        for (k, end) in line_end.iter().enumerate() {
            let mut walk = if k == 0 { walker } else { walker.reversed() };
            loop {
                let (x, y) = walk.pixel();
                if mask.get(x, y) == Some(true) {
                    if good_line {
                        accumulator.withdraw(x, y);
                    }
                    mask.clear(x, y);
                }
                if (x, y) == *end {
                    break;
                }
                walk.step();
            }
        }

        if good_line {
            segments.push(LineSegment::new(
                line_end[0].0,
                line_end[0].1,
                line_end[1].0,
                line_end[1].1,
            ));
        }
    }

    log::debug!("Hough transform found {} segments", segments.len());
    segments
}

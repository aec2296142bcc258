//! Canny edge detection on an already smoothed image.
//!
//! Gradients come from 3x3 Sobel kernels and are combined as the L1 magnitude
//! `|gx| + |gy|`. Non-maximum suppression thins ridges to one pixel along the
//! quantized gradient direction, then hysteresis keeps weak pixels only when they
//! are 8-connected to a strong one.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::instrument;

/// tan(22.5 degrees), the boundary between axis-aligned and diagonal directions.
const TAN_22_5: f32 = 0.414_213_57;
const EDGE: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strength {
    Suppressed,
    Weak,
    Strong,
}

struct Gradients {
    width: usize,
    height: usize,
    gx: Vec<f32>,
    gy: Vec<f32>,
    magnitude: Vec<f32>,
}

impl Gradients {
    fn new(image: &GrayImage) -> Self {
        let gx = horizontal_sobel(image)
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect::<Vec<_>>();
        let gy = vertical_sobel(image)
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect::<Vec<_>>();
        let magnitude = gx.iter().zip(&gy).map(|(h, v)| h.abs() + v.abs()).collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            gx,
            gy,
            magnitude,
        }
    }

    /// Magnitude at `(x, y)`, zero outside the image.
    fn at(&self, x: isize, y: isize) -> f32 {
        if x < 0 || y < 0 || x >= self.width as isize || y >= self.height as isize {
            return 0.0;
        }
        self.magnitude[y as usize * self.width + x as usize]
    }

    fn is_local_max(&self, x: usize, y: usize) -> bool {
        let i = y * self.width + x;
        let m = self.magnitude[i];
        let (dx, dy) = (self.gx[i], self.gy[i]);
        let (x, y) = (x as isize, y as isize);
        if dy.abs() < TAN_22_5 * dx.abs() {
            m > self.at(x - 1, y) && m >= self.at(x + 1, y)
        } else if dy.abs() * TAN_22_5 > dx.abs() {
            m > self.at(x, y - 1) && m >= self.at(x, y + 1)
        } else {
            let s = if (dx < 0.0) != (dy < 0.0) { -1 } else { 1 };
            m > self.at(x - s, y - 1) && m > self.at(x + s, y + 1)
        }
    }
}

fn non_maximum_suppression(gradients: &Gradients, low: f32, high: f32) -> Vec<Strength> {
    let mut strengths = vec![Strength::Suppressed; gradients.magnitude.len()];
    for y in 0..gradients.height {
        for x in 0..gradients.width {
            let i = y * gradients.width + x;
            let m = gradients.magnitude[i];
            if m <= low || !gradients.is_local_max(x, y) {
                continue;
            }
            strengths[i] = if m > high {
                Strength::Strong
            } else {
                Strength::Weak
            };
        }
    }
    strengths
}

fn hysteresis(strengths: &[Strength], width: usize, height: usize) -> GrayImage {
    let mut edges = GrayImage::new(width as u32, height as u32);
    let pixels: &mut [u8] = &mut edges;
    let mut stack = strengths
        .iter()
        .enumerate()
        .filter(|(_, strength)| **strength == Strength::Strong)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    for &i in &stack {
        pixels[i] = EDGE;
    }

    while let Some(i) = stack.pop() {
        let (x, y) = (i % width, i / width);
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let j = ny * width + nx;
                if strengths[j] == Strength::Weak && pixels[j] == 0 {
                    pixels[j] = EDGE;
                    stack.push(j);
                }
            }
        }
    }
    edges
}

/// Binary edge map (0 or 255) of `image`. No smoothing is applied here; blur first.
#[instrument(level = "debug", skip(image), fields(width = image.width(), height = image.height()))]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let gradients = Gradients::new(image);
    let strengths = non_maximum_suppression(&gradients, low_threshold, high_threshold);
    hysteresis(&strengths, gradients.width, gradients.height)
}

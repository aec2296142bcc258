use std::f64::consts::PI;

use image::GrayImage;
use imageproc::{
    filter::separable_filter_equal,
    morphology::{grayscale_close, grayscale_open, Mask},
};
use tracing::instrument;

use crate::{
    canny::canny,
    hough::{detect_segments, HoughOptions},
    raster::RasterImage,
    util::{count_nonzero, gaussian_kernel},
    LineSegment,
};

pub const BLUR_KERNEL_SIZE: usize = 5;
pub const CANNY_LOW_THRESHOLD: f32 = 50.0;
pub const CANNY_HIGH_THRESHOLD: f32 = 150.0;
pub const HOUGH_VOTE_THRESHOLD: u32 = 50;
pub const HOUGH_THETA: f64 = PI / 180.0;
/// Radius of the square structuring element, i.e. a 3x3 kernel.
pub const MORPHOLOGY_RADIUS: u8 = 1;

#[derive(Debug, Clone)]
pub struct Extraction {
    pub segments: Vec<LineSegment>,
    pub edge_pixel_count: usize,
}

/// Grayscale close followed by open with a 3x3 square, bridging broken rules and
/// dropping speckle.
#[instrument(level = "debug", skip(image))]
pub fn apply_morphology(image: &RasterImage) -> GrayImage {
    let mask = Mask::square(MORPHOLOGY_RADIUS);
    let closed = grayscale_close(&image.to_luma8(), &mask);
    grayscale_open(&closed, &mask)
}

/// Canny edge map of `image` after a single 5x5 Gaussian blur, optionally cleaned up
/// with morphology first.
#[instrument(level = "debug", skip(image))]
pub fn edge_map(image: &RasterImage, use_morphology: bool) -> GrayImage {
    let gray = if use_morphology {
        apply_morphology(image)
    } else {
        image.to_luma8()
    };
    let kernel = gaussian_kernel(BLUR_KERNEL_SIZE);
    let blurred = separable_filter_equal(&gray, kernel.as_slice());
    canny(&blurred, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD)
}

#[instrument(level = "debug", skip(image), fields(width = image.width(), height = image.height()))]
pub fn extract(
    image: &RasterImage,
    use_morphology: bool,
    min_line_length: u32,
    max_line_gap: u32,
) -> Extraction {
    if image.width() == 0 || image.height() == 0 {
        return Extraction {
            segments: Vec::new(),
            edge_pixel_count: 0,
        };
    }
    let edges = edge_map(image, use_morphology);
    let edge_pixel_count = count_nonzero(&edges);
    log::debug!("Detected {edge_pixel_count} edge pixels");

    let options = HoughOptions {
        theta: HOUGH_THETA,
        vote_threshold: HOUGH_VOTE_THRESHOLD,
        min_line_length,
        max_line_gap,
        ..Default::default()
    };
    let segments = detect_segments(&edges, &options);
    log::debug!("Found {} line segments", segments.len());
    Extraction {
        segments,
        edge_pixel_count,
    }
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
    use imageproc::rect::Rect;

    use super::*;

    #[test]
    fn uniform_image_has_no_edges() {
        let image = RasterImage::from(RgbImage::from_pixel(120, 80, Rgb([200, 200, 200])));
        let extraction = extract(&image, false, 50, 20);
        assert_eq!(extraction.edge_pixel_count, 0);
        assert!(extraction.segments.is_empty());
    }

    #[test]
    fn thick_rule_yields_segments() {
        let mut gray = GrayImage::from_pixel(300, 120, Luma([255]));
        draw_filled_rect_mut(&mut gray, Rect::at(30, 58).of_size(240, 5), Luma([0]));
        let extraction = extract(&RasterImage::from(gray), false, 50, 20);
        assert!(extraction.edge_pixel_count > 0);
        assert!(!extraction.segments.is_empty());
        assert!(extraction.segments.iter().any(|s| s.length() > 200.0));
    }

    #[test]
    fn one_pixel_rule_yields_segments() {
        let mut gray = GrayImage::from_pixel(400, 300, Luma([255]));
        draw_line_segment_mut(&mut gray, (50.0, 150.0), (350.0, 150.0), Luma([0]));
        let extraction = extract(&RasterImage::from(gray), false, 50, 20);
        assert!(extraction.edge_pixel_count > 0);
        assert!(extraction.segments.iter().any(|s| s.length() > 200.0));
    }

    #[test]
    fn empty_image_has_nothing_to_extract() {
        let extraction = extract(&RasterImage::from(GrayImage::new(0, 0)), true, 50, 20);
        assert_eq!(extraction.edge_pixel_count, 0);
        assert!(extraction.segments.is_empty());
    }

    #[test]
    fn morphology_removes_speckle() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([255]));
        gray.put_pixel(20, 20, Luma([0]));
        gray.put_pixel(5, 33, Luma([0]));
        let cleaned = apply_morphology(&RasterImage::from(gray));
        assert!(cleaned.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn morphology_does_not_touch_input() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([255]));
        gray.put_pixel(20, 20, Luma([0]));
        let image = RasterImage::from(gray.clone());
        let _ = apply_morphology(&image);
        assert_eq!(image.as_bytes(), gray.as_raw().as_slice());
    }
}

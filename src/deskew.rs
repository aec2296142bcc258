use image::{Luma, Rgb};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use tracing::instrument;

use crate::{
    edges::extract,
    hough::MAX_DIMENSION,
    raster::RasterImage,
    selector::{count_horizontal, select, HORIZONTAL_THRESHOLD_DEGREES},
    util::rotation_matrix,
    DeskewDiagnostics, DeskewResult, EncodedDeskew, Error, Result,
};

pub const MIN_LINE_LENGTH_RANGE: (u32, u32) = (10, 500);
pub const MAX_LINE_GAP_RANGE: (u32, u32) = (1, 100);
pub const HORIZONTAL_THRESHOLD_RANGE: (f64, f64) = (0.0, 90.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeskewOptions {
    pub min_line_length: u32,
    pub max_line_gap: u32,
    /// Run a morphological close/open before edge detection. Only affects detection.
    pub use_morphology: bool,
    pub horizontal_threshold_degrees: f64,
}

impl Default for DeskewOptions {
    fn default() -> Self {
        Self {
            min_line_length: 50,
            max_line_gap: 20,
            use_morphology: false,
            horizontal_threshold_degrees: HORIZONTAL_THRESHOLD_DEGREES,
        }
    }
}

fn check_range<T: Into<f64> + PartialOrd + Copy>(
    name: &'static str,
    value: T,
    (min, max): (T, T),
) -> Result<()> {
    if value < min || value > max {
        return Err(Error::InvalidParameter {
            name,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

impl DeskewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_line_length(mut self, min_line_length: u32) -> Self {
        self.min_line_length = min_line_length;
        self
    }

    pub fn max_line_gap(mut self, max_line_gap: u32) -> Self {
        self.max_line_gap = max_line_gap;
        self
    }

    pub fn use_morphology(mut self, use_morphology: bool) -> Self {
        self.use_morphology = use_morphology;
        self
    }

    pub fn horizontal_threshold_degrees(mut self, threshold: f64) -> Self {
        self.horizontal_threshold_degrees = threshold;
        self
    }

    /// Out-of-range values are rejected rather than clamped.
    pub fn validate(&self) -> Result<()> {
        check_range("min_line_length", self.min_line_length, MIN_LINE_LENGTH_RANGE)?;
        check_range("max_line_gap", self.max_line_gap, MAX_LINE_GAP_RANGE)?;
        let threshold = self.horizontal_threshold_degrees;
        let (min, max) = HORIZONTAL_THRESHOLD_RANGE;
        if !threshold.is_finite() || threshold <= min || threshold > max {
            return Err(Error::InvalidParameter {
                name: "horizontal_threshold_degrees",
                value: threshold,
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Zero-sized buffers are not pixel data; oversized ones do not fit the Hough walker.
fn check_dimensions(image: &RasterImage) -> Result<()> {
    if image.is_empty() {
        return Err(Error::ImageDecode(format!(
            "image has zero-sized dimensions {}x{}",
            image.width(),
            image.height()
        )));
    }
    check_range("width", image.width(), (1, MAX_DIMENSION))?;
    check_range("height", image.height(), (1, MAX_DIMENSION))
}

fn rotation_projection(width: u32, height: u32, angle_degrees: f64) -> Result<Projection> {
    let center = ((width / 2) as f64, (height / 2) as f64);
    let [r0, r1] = rotation_matrix(center, angle_degrees, 1.0);
    let matrix = [
        r0[0] as f32,
        r0[1] as f32,
        r0[2] as f32,
        r1[0] as f32,
        r1[1] as f32,
        r1[2] as f32,
        0.0,
        0.0,
        1.0,
    ];
    Projection::from_matrix(matrix).ok_or(Error::InvalidParameter {
        name: "angle_degrees",
        value: angle_degrees,
        min: -180.0,
        max: 180.0,
    })
}

/// Rotates about the integer image center, keeping the canvas size and filling
/// uncovered pixels with white. Positive angles turn the content counter-clockwise.
#[instrument(level = "debug", skip(image))]
pub fn rotate_image(image: &RasterImage, angle_degrees: f64) -> Result<RasterImage> {
    let (width, height) = image.dimensions();
    let projection = rotation_projection(width, height, angle_degrees)?;
    Ok(match image {
        RasterImage::Gray(gray) => RasterImage::Gray(warp(
            gray,
            &projection,
            Interpolation::Bilinear,
            Luma([u8::MAX]),
        )),
        RasterImage::Rgb(rgb) => RasterImage::Rgb(warp(
            rgb,
            &projection,
            Interpolation::Bilinear,
            Rgb([u8::MAX; 3]),
        )),
    })
}

/// Detects the dominant horizontal rule and rotates `image` so that it becomes level.
///
/// Morphology, when enabled, is applied to a grayscale copy used for detection only;
/// the rotation is always applied to the untouched input.
#[instrument(skip(image, options), fields(width = image.width(), height = image.height()))]
pub fn deskew(image: &RasterImage, options: &DeskewOptions) -> Result<DeskewResult> {
    options.validate()?;
    check_dimensions(image)?;
    log::debug!("Deskewing {:?} image with {options:?}", image.channels());

    let extraction = extract(
        image,
        options.use_morphology,
        options.min_line_length,
        options.max_line_gap,
    );
    let threshold = options.horizontal_threshold_degrees;
    let diagnostics = DeskewDiagnostics {
        edge_pixel_count: extraction.edge_pixel_count,
        lines_found: extraction.segments.len(),
        horizontal_lines_found: count_horizontal(&extraction.segments, threshold),
        width: image.width(),
        height: image.height(),
        channels: image.channels(),
    };

    let Some(selection) = select(&extraction.segments, threshold) else {
        log::debug!("No lines found, leaving image unrotated");
        return Ok(DeskewResult {
            image: image.clone(),
            rotation_angle_degrees: 0.0,
            line_info: None,
            diagnostics,
        });
    };

    let angle = selection.rotation_angle_degrees;
    log::debug!("Applying rotation of {angle:.2} degrees");
    Ok(DeskewResult {
        image: rotate_image(image, angle)?,
        rotation_angle_degrees: angle,
        line_info: Some(selection),
        diagnostics,
    })
}

/// Decodes `bytes`, deskews, and re-encodes the result as PNG.
#[instrument(skip(bytes, options), fields(len = bytes.len()))]
pub fn deskew_encoded(bytes: &[u8], options: &DeskewOptions) -> Result<EncodedDeskew> {
    let image = RasterImage::decode(bytes)?;
    let result = deskew(&image, options)?;
    Ok(EncodedDeskew {
        png: result.image.encode_png()?,
        rotation_angle_degrees: result.rotation_angle_degrees,
        line_info: result.line_info,
        diagnostics: result.diagnostics,
    })
}

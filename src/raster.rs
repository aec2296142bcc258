use std::io::Cursor;

use image::{imageops::grayscale, DynamicImage, GrayImage, ImageFormat, RgbImage};
use tracing::instrument;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Gray,
    Rgb,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
        }
    }
}

/// Row-major 8-bit pixel buffer, either single channel or RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl RasterImage {
    pub fn from_raw(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::ImageDecode(format!(
                "image has zero-sized dimensions {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(Error::ImageDecode(format!(
                "expected {expected} bytes for {width}x{height}x{}, got {}",
                channels.count(),
                data.len()
            )));
        }
        let image = match channels {
            Channels::Gray => GrayImage::from_raw(width, height, data).map(RasterImage::Gray),
            Channels::Rgb => RgbImage::from_raw(width, height, data).map(RasterImage::Rgb),
        };
        image.ok_or_else(|| Error::ImageDecode("pixel buffer does not match dimensions".into()))
    }

    /// Decodes any container the `image` crate understands. Grayscale input stays single
    /// channel, everything else is flattened to RGB.
    #[instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::ImageDecode("empty input".into()));
        }
        let image =
            image::load_from_memory(bytes).map_err(|err| Error::ImageDecode(err.to_string()))?;
        log::debug!(
            "Decoded {:?} image of {}x{}",
            image.color(),
            image.width(),
            image.height()
        );
        Self::try_from(image)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        let written = match self {
            RasterImage::Gray(image) => image.write_to(&mut buffer, ImageFormat::Png),
            RasterImage::Rgb(image) => image.write_to(&mut buffer, ImageFormat::Png),
        };
        written.map_err(|err| Error::ImageEncode(err.to_string()))?;
        let bytes = buffer.into_inner();
        if bytes.is_empty() {
            return Err(Error::ImageEncode("encoder produced no data".into()));
        }
        log::debug!("Encoded PNG of {} bytes", bytes.len());
        Ok(bytes)
    }

    pub fn width(&self) -> u32 {
        match self {
            RasterImage::Gray(image) => image.width(),
            RasterImage::Rgb(image) => image.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            RasterImage::Gray(image) => image.height(),
            RasterImage::Rgb(image) => image.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn channels(&self) -> Channels {
        match self {
            RasterImage::Gray(_) => Channels::Gray,
            RasterImage::Rgb(_) => Channels::Rgb,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RasterImage::Gray(image) => image.as_raw(),
            RasterImage::Rgb(image) => image.as_raw(),
        }
    }

    /// Owned single channel copy; RGB input is converted with the usual luma weights.
    pub fn to_luma8(&self) -> GrayImage {
        match self {
            RasterImage::Gray(image) => image.clone(),
            RasterImage::Rgb(image) => grayscale(image),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            RasterImage::Gray(image) => DynamicImage::ImageLuma8(image),
            RasterImage::Rgb(image) => DynamicImage::ImageRgb8(image),
        }
    }
}

impl TryFrom<DynamicImage> for RasterImage {
    type Error = Error;

    fn try_from(image: DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::ImageDecode(format!(
                "image has zero-sized dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(match image {
            DynamicImage::ImageLuma8(gray) => RasterImage::Gray(gray),
            gray @ (DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_)) => RasterImage::Gray(gray.to_luma8()),
            DynamicImage::ImageRgb8(rgb) => RasterImage::Rgb(rgb),
            other => RasterImage::Rgb(other.to_rgb8()),
        })
    }
}

impl From<GrayImage> for RasterImage {
    fn from(image: GrayImage) -> Self {
        RasterImage::Gray(image)
    }
}

impl From<RgbImage> for RasterImage {
    fn from(image: RgbImage) -> Self {
        RasterImage::Rgb(image)
    }
}

#[cfg(test)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;

    #[test]
    fn from_raw_rejects_short_buffer() {
        let err = RasterImage::from_raw(4, 4, Channels::Rgb, vec![0; 47]).unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn from_raw_rejects_empty_dimensions() {
        let err = RasterImage::from_raw(0, 4, Channels::Gray, vec![]).unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            RasterImage::decode(b"definitely not a png"),
            Err(Error::ImageDecode(_))
        ));
        assert!(matches!(RasterImage::decode(&[]), Err(Error::ImageDecode(_))));
    }

    #[test]
    fn png_keeps_channel_layout() {
        let gray = RasterImage::from(GrayImage::from_pixel(7, 5, Luma([42])));
        let decoded = RasterImage::decode(&gray.encode_png().unwrap()).unwrap();
        assert_eq!(decoded, gray);

        let rgb = RasterImage::from(RgbImage::from_pixel(3, 9, Rgb([1, 2, 3])));
        let decoded = RasterImage::decode(&rgb.encode_png().unwrap()).unwrap();
        assert_eq!(decoded.channels(), Channels::Rgb);
        assert_eq!(decoded.as_bytes(), rgb.as_bytes());
    }

    #[test]
    fn rgba_is_flattened_to_rgb() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
        let raster = RasterImage::try_from(rgba).unwrap();
        assert_eq!(raster.channels(), Channels::Rgb);
        assert_eq!(raster.as_bytes().len(), 12);
    }

    #[test]
    fn dynamic_conversion_round_trips() {
        let gray = RasterImage::from_raw(2, 1, Channels::Gray, vec![0, 255]).unwrap();
        let back = RasterImage::try_from(gray.clone().into_dynamic()).unwrap();
        assert_eq!(back, gray);
    }
}

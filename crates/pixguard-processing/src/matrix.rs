use std::borrow::Cow;

use image::{DynamicImage, GrayImage};

/// A decoded image: a width x height grid of grayscale or multi-channel pixels.
#[derive(Debug, Clone)]
pub struct PixelMatrix {
    image: DynamicImage,
}

impl PixelMatrix {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn is_grayscale(&self) -> bool {
        matches!(self.image, DynamicImage::ImageLuma8(_))
    }

    /// Single-channel 8-bit luminance. Borrowed when the matrix already is one.
    pub fn luminance(&self) -> Cow<'_, GrayImage> {
        match &self.image {
            DynamicImage::ImageLuma8(gray) => Cow::Borrowed(gray),
            other => Cow::Owned(other.to_luma8()),
        }
    }
}

impl From<DynamicImage> for PixelMatrix {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl From<GrayImage> for PixelMatrix {
    fn from(image: GrayImage) -> Self {
        Self::new(DynamicImage::ImageLuma8(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn grayscale_luminance_is_borrowed() {
        let matrix = PixelMatrix::from(GrayImage::from_pixel(3, 2, Luma([7])));
        assert!(matches!(matrix.luminance(), Cow::Borrowed(_)));
        assert_eq!(matrix.pixel_count(), 6);
        assert_eq!(matrix.channels(), 1);
    }

    #[test]
    fn color_is_converted_to_luminance() {
        let matrix = PixelMatrix::from(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            Rgb([255, 255, 255]),
        )));
        let luma = matrix.luminance();
        assert!(!matrix.is_grayscale());
        assert_eq!(matrix.channels(), 3);
        assert!(luma.pixels().all(|p| p.0[0] == 255));
    }
}

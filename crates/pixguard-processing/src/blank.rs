//! Blank page detection.
//!
//! A pixel is background when its luminance is at or above `bin_threshold`.
//! An image is blank when the background share of all pixels is at or above
//! `blank_threshold_ratio`; both comparisons are inclusive.

use image::GrayImage;
use pixguard_core::models::{OutcomeField, PartialOutcome};
use pixguard_core::ValidationConfig;

use crate::detector::Detector;
use crate::matrix::PixelMatrix;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlankDetector {
    bin_threshold: u8,
    blank_threshold_ratio: f64,
}

impl Default for BlankDetector {
    fn default() -> Self {
        let config = ValidationConfig::default();
        Self::new(config.bin_threshold, config.blank_threshold_ratio)
    }
}

impl BlankDetector {
    pub fn new(bin_threshold: u8, blank_threshold_ratio: f64) -> Self {
        Self {
            bin_threshold,
            blank_threshold_ratio,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.bin_threshold, config.blank_threshold_ratio)
    }

    /// Share of pixels at or above the bin threshold. An image without
    /// pixels has no foreground and counts as all background.
    pub fn background_ratio(&self, gray: &GrayImage) -> f64 {
        let total = u64::from(gray.width()) * u64::from(gray.height());
        if total == 0 {
            return 1.0;
        }
        let background = gray
            .as_raw()
            .iter()
            .filter(|&&v| v >= self.bin_threshold)
            .count() as u64;
        background as f64 / total as f64
    }

    pub fn is_blank(&self, matrix: &PixelMatrix) -> bool {
        let ratio = self.background_ratio(&matrix.luminance());
        let blank = ratio >= self.blank_threshold_ratio;
        tracing::debug!(
            background_ratio = ratio,
            bin_threshold = self.bin_threshold,
            blank_threshold_ratio = self.blank_threshold_ratio,
            is_blank = blank,
            "Blank detection finished"
        );
        blank
    }
}

impl Detector for BlankDetector {
    fn name(&self) -> &'static str {
        "blank"
    }

    fn validate(&self, matrix: &PixelMatrix) -> PartialOutcome {
        PartialOutcome::new().with(OutcomeField::IsBlank(self.is_blank(matrix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma, Rgb, RgbImage};

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn with_dark_pixels(mut gray: GrayImage, count: u32) -> GrayImage {
        let width = gray.width();
        for i in 0..count {
            gray.put_pixel(i % width, i / width, Luma([0]));
        }
        gray
    }

    #[test]
    fn all_white_100x100_is_blank() {
        let detector = BlankDetector::new(150, 0.99999);
        assert!(detector.is_blank(&PixelMatrix::from(white(100, 100))));
    }

    #[test]
    fn small_black_square_is_not_blank() {
        let mut gray = white(100, 100);
        for x in 49..51 {
            for y in 49..51 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        let detector = BlankDetector::new(150, 0.99999);

        assert_eq!(detector.background_ratio(&gray), 0.9996);
        assert!(!detector.is_blank(&PixelMatrix::from(gray)));
    }

    #[test]
    fn every_pixel_at_threshold_counts_as_background() {
        let gray = GrayImage::from_pixel(10, 10, Luma([150]));
        let detector = BlankDetector::new(150, 0.99999);
        assert_eq!(detector.background_ratio(&gray), 1.0);
        assert!(detector.is_blank(&PixelMatrix::from(gray)));
    }

    #[test]
    fn pixel_just_below_threshold_is_foreground() {
        let gray = GrayImage::from_pixel(10, 10, Luma([149]));
        assert_eq!(BlankDetector::new(150, 0.5).background_ratio(&gray), 0.0);
    }

    #[test]
    fn ratio_exactly_at_threshold_is_blank() {
        // 400x250 = 100_000 pixels, one dark: ratio is exactly 0.99999
        let gray = with_dark_pixels(white(400, 250), 1);
        let detector = BlankDetector::new(150, 0.99999);

        assert_eq!(detector.background_ratio(&gray), 0.99999);
        assert!(detector.is_blank(&PixelMatrix::from(gray)));
    }

    #[test]
    fn one_pixel_below_ratio_is_not_blank() {
        let gray = with_dark_pixels(white(400, 250), 2);
        let detector = BlankDetector::new(150, 0.99999);
        assert!(!detector.is_blank(&PixelMatrix::from(gray)));
    }

    #[test]
    fn small_image_boundary_is_inclusive() {
        let gray = with_dark_pixels(white(2, 2), 1);
        let detector = BlankDetector::new(150, 0.75);
        assert!(detector.is_blank(&PixelMatrix::from(gray.clone())));
        assert!(!BlankDetector::new(150, 0.76).is_blank(&PixelMatrix::from(gray)));
    }

    #[test]
    fn color_images_are_judged_on_luminance() {
        let rgb = RgbImage::from_pixel(20, 20, Rgb([250, 250, 250]));
        let detector = BlankDetector::default();
        assert!(detector.is_blank(&PixelMatrix::from(DynamicImage::ImageRgb8(rgb))));

        let dark = RgbImage::from_pixel(20, 20, Rgb([10, 10, 10]));
        assert!(!detector.is_blank(&PixelMatrix::from(DynamicImage::ImageRgb8(dark))));
    }

    #[test]
    fn validate_reports_only_is_blank() {
        let partial = BlankDetector::default().validate(&PixelMatrix::from(white(4, 4)));
        assert_eq!(partial.fields(), &[OutcomeField::IsBlank(true)]);
    }
}

use pixguard_core::models::PartialOutcome;

use crate::matrix::PixelMatrix;

/// A quality classifier over a decoded image.
///
/// Detectors report only the outcome fields they own. The engine merges the
/// partial outcomes of all configured detectors in registration order.
pub trait Detector: Send + Sync {
    /// Stable name used in configuration and logs.
    fn name(&self) -> &'static str;

    fn validate(&self, matrix: &PixelMatrix) -> PartialOutcome;
}

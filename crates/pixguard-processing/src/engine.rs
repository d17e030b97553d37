use pixguard_core::models::ValidationOutcome;
use pixguard_core::ValidationConfig;

use crate::blank::BlankDetector;
use crate::detector::Detector;
use crate::matrix::PixelMatrix;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown detector {0:?} (known: blank)")]
    UnknownDetector(String),
}

/// Runs an ordered list of detectors and merges their partial outcomes.
///
/// Detectors run in registration order; when two report the same field the
/// later one wins. With no detectors the outcome is all defaults.
pub struct ValidationEngine {
    detectors: Vec<Box<dyn Detector>>,
}

impl ValidationEngine {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Build the detector list named by configuration, keeping its order.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, EngineError> {
        let detectors = config
            .detectors
            .iter()
            .map(|name| match name.as_str() {
                "blank" => Ok(Box::new(BlankDetector::from_config(config)) as Box<dyn Detector>),
                other => Err(EngineError::UnknownDetector(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(detectors))
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn validate(&self, matrix: &PixelMatrix) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for detector in &self.detectors {
            let partial = detector.validate(matrix);
            tracing::debug!(
                detector = detector.name(),
                fields = ?partial.fields().iter().map(|f| f.name()).collect::<Vec<_>>(),
                "Detector finished"
            );
            outcome.apply(&partial);
        }
        outcome
    }
}

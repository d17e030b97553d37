//! Message processing error types
//!
//! Every stage of the pipeline reports failures through [`ProcessingError`],
//! which records the stage that failed and whether the failure is permanent
//! (the message is dropped, retrying cannot help) or transient (the message is
//! handed back to the broker for redelivery).

use std::fmt;

/// Position of a message in the processing state machine.
///
/// The happy path walks the variants in declaration order; `Rejected` and
/// `Deferred` are the terminal failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Received,
    Parsed,
    Fetched,
    Decoded,
    Validated,
    Persisted,
    Published,
    Acknowledged,
    Rejected,
    Deferred,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Parsed => "parsed",
            PipelineStage::Fetched => "fetched",
            PipelineStage::Decoded => "decoded",
            PipelineStage::Validated => "validated",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Published => "published",
            PipelineStage::Acknowledged => "acknowledged",
            PipelineStage::Rejected => "rejected",
            PipelineStage::Deferred => "deferred",
        }
    }

    /// Whether this stage ends the message's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Acknowledged | PipelineStage::Rejected | PipelineStage::Deferred
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether retrying a failed message can ever succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed payload, invalid UUID, undecodable image. Never requeued.
    Permanent,
    /// Fetch, persist or publish failures. Eligible for broker redelivery.
    Transient,
}

impl FailureKind {
    /// Terminal stage a message lands in when it fails with this kind.
    pub fn terminal_stage(&self) -> PipelineStage {
        match self {
            FailureKind::Permanent => PipelineStage::Rejected,
            FailureKind::Transient => PipelineStage::Deferred,
        }
    }
}

/// A failure raised while moving a message through the pipeline.
#[derive(Debug)]
pub struct ProcessingError {
    inner: anyhow::Error,
    kind: FailureKind,
    /// The stage the message was trying to reach when it failed.
    stage: PipelineStage,
}

impl ProcessingError {
    /// Create a permanent error: the message will be dropped without retry.
    pub fn permanent(stage: PipelineStage, err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            kind: FailureKind::Permanent,
            stage,
        }
    }

    /// Create a transient error: the message will be returned to the broker.
    pub fn transient(stage: PipelineStage, err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            kind: FailureKind::Transient,
            stage,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (stage: {})", self.inner, self.stage)
    }
}

impl std::error::Error for ProcessingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Extension trait for tagging a stage result with its failure classification.
pub trait ProcessingResultExt<T> {
    fn permanent(self, stage: PipelineStage) -> Result<T, ProcessingError>;
    fn transient(self, stage: PipelineStage) -> Result<T, ProcessingError>;
}

impl<T, E: Into<anyhow::Error>> ProcessingResultExt<T> for Result<T, E> {
    fn permanent(self, stage: PipelineStage) -> Result<T, ProcessingError> {
        self.map_err(|e| ProcessingError::permanent(stage, e))
    }

    fn transient(self, stage: PipelineStage) -> Result<T, ProcessingError> {
        self.map_err(|e| ProcessingError::transient(stage, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_error() {
        let err = ProcessingError::permanent(PipelineStage::Parsed, anyhow::anyhow!("bad gid"));
        assert!(err.is_permanent());
        assert_eq!(err.kind().terminal_stage(), PipelineStage::Rejected);
        assert!(err.to_string().contains("bad gid"));
        assert!(err.to_string().contains("parsed"));
    }

    #[test]
    fn test_transient_error() {
        let err = ProcessingError::transient(PipelineStage::Fetched, anyhow::anyhow!("timeout"));
        assert!(!err.is_permanent());
        assert_eq!(err.stage(), PipelineStage::Fetched);
        assert_eq!(err.kind().terminal_stage(), PipelineStage::Deferred);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("corrupt png"));
        let err = result.permanent(PipelineStage::Decoded).unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.stage(), PipelineStage::Decoded);
    }

    #[test]
    fn stages_are_ordered_along_the_happy_path() {
        assert!(PipelineStage::Received < PipelineStage::Parsed);
        assert!(PipelineStage::Persisted < PipelineStage::Published);
        assert!(PipelineStage::Acknowledged.is_terminal());
        assert!(!PipelineStage::Validated.is_terminal());
    }
}

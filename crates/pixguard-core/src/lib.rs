//! Pixguard Core Library
//!
//! Domain models, failure classification and configuration shared by every
//! stage of the image validation worker.

pub mod config;
pub mod models;
pub mod processing_error;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BrokerConfig, DatabaseConfig, DocumentsConfig, LogFormat, StorageConfig, ValidationConfig,
    WorkerConfig,
};
pub use processing_error::{FailureKind, PipelineStage, ProcessingError, ProcessingResultExt};
pub use storage_types::StorageBackend;

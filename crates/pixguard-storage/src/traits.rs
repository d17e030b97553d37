//! Content fetcher abstraction
//!
//! This module defines the ContentFetcher trait that all storage backends implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Content retrieval errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Object too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether retrying the same bucket/key can never succeed.
    ///
    /// A missing object is not permanent: uploads and their notification
    /// messages may race, so the object can appear on redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::TooLarge { .. } | FetchError::InvalidKey(_))
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Content store abstraction
///
/// Implementations download the whole object into memory. There is no
/// streaming variant: the decoder needs the complete buffer.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Download `bucket/key` into a single buffer
    async fn fetch(&self, bucket: &str, key: &str) -> FetchResult<Bytes>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Enforce the configured object size cap.
pub(crate) fn check_size(size: u64, max: Option<u64>) -> FetchResult<()> {
    match max {
        Some(max) if size > max => Err(FetchError::TooLarge { size, max }),
        _ => Ok(()),
    }
}

//! Shared bucket/key validation for storage backends.

use crate::traits::{FetchError, FetchResult};

/// Reject bucket names and keys that could escape their namespace.
///
/// Buckets are a single path segment; keys may contain `/` but never `..`
/// segments or a leading `/`.
pub fn validate_object_ref(bucket: &str, key: &str) -> FetchResult<()> {
    if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
        return Err(FetchError::InvalidKey(format!("invalid bucket: {:?}", bucket)));
    }
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
        return Err(FetchError::InvalidKey(format!("invalid key: {:?}", key)));
    }
    Ok(())
}

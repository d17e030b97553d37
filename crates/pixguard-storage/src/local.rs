use crate::keys::validate_object_ref;
use crate::traits::{check_size, ContentFetcher, FetchError, FetchResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Local filesystem content fetcher
///
/// Buckets are directories directly below `base_path`.
#[derive(Clone)]
pub struct LocalFetcher {
    base_path: PathBuf,
    max_object_bytes: Option<u64>,
}

impl LocalFetcher {
    /// Create a new LocalFetcher
    ///
    /// # Arguments
    /// * `base_path` - Root directory holding one sub-directory per bucket
    /// * `max_object_bytes` - Optional size cap on fetched objects
    pub async fn new(
        base_path: impl Into<PathBuf>,
        max_object_bytes: Option<u64>,
    ) -> FetchResult<Self> {
        let base_path = base_path.into();

        let meta = fs::metadata(&base_path).await.map_err(|e| {
            FetchError::Config(format!(
                "Storage directory {} is not accessible: {}",
                base_path.display(),
                e
            ))
        })?;
        if !meta.is_dir() {
            return Err(FetchError::Config(format!(
                "Storage path {} is not a directory",
                base_path.display()
            )));
        }

        Ok(LocalFetcher {
            base_path,
            max_object_bytes,
        })
    }

    fn object_path(&self, bucket: &str, key: &str) -> FetchResult<PathBuf> {
        validate_object_ref(bucket, key)?;
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ContentFetcher for LocalFetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> FetchResult<Bytes> {
        let path = self.object_path(bucket, key)?;
        let start = std::time::Instant::now();

        let not_found = || FetchError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(FetchError::Io(e)),
        };
        check_size(meta.len(), self.max_object_bytes)?;

        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(),
            _ => FetchError::Io(e),
        })?;
        check_size(data.len() as u64, self.max_object_bytes)?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local read successful"
        );

        Ok(Bytes::from(data))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

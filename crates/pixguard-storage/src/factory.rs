#[cfg(feature = "storage-s3")]
use crate::documents::{DocumentStore, ObjectStoreDocuments};
#[cfg(feature = "storage-local")]
use crate::LocalFetcher;
#[cfg(feature = "storage-s3")]
use crate::S3Fetcher;
use crate::{ContentFetcher, FetchError, FetchResult, StorageBackend};
#[cfg(feature = "storage-s3")]
use pixguard_core::DocumentsConfig;
use pixguard_core::StorageConfig;
use std::sync::Arc;

/// Create a content fetcher based on configuration
pub async fn create_fetcher(config: &StorageConfig) -> FetchResult<Arc<dyn ContentFetcher>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let fetcher = S3Fetcher::new(config.into(), config.max_object_bytes);
            tracing::info!(
                endpoint = config.s3_endpoint.as_deref().unwrap_or("aws"),
                region = %config.s3_region,
                "S3 content fetcher configured"
            );
            Ok(Arc::new(fetcher))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(FetchError::Config(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                FetchError::Config("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let fetcher = LocalFetcher::new(base_path, config.max_object_bytes).await?;
            Ok(Arc::new(fetcher))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(FetchError::Config(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

/// Create the secondary document store, or `None` when it is disabled.
///
/// Documents go to the same kind of store the uploads come from: an S3
/// bucket for the S3 backend, `{LOCAL_STORAGE_PATH}/{bucket}` for the local one.
#[cfg(feature = "storage-s3")]
pub fn create_document_store(
    storage: &StorageConfig,
    documents: &DocumentsConfig,
) -> FetchResult<Option<Arc<dyn DocumentStore>>> {
    if !documents.enabled {
        return Ok(None);
    }

    let store: Arc<dyn object_store::ObjectStore> = match storage.backend {
        StorageBackend::S3 => crate::s3::S3Settings::from(storage).build(&documents.bucket)?,
        StorageBackend::Local => {
            let root = storage.local_storage_path.as_ref().ok_or_else(|| {
                FetchError::Config("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let dir = std::path::Path::new(root).join(&documents.bucket);
            std::fs::create_dir_all(&dir)?;
            let fs = object_store::local::LocalFileSystem::new_with_prefix(&dir)
                .map_err(|e| FetchError::Config(e.to_string()))?;
            Arc::new(fs)
        }
    };

    tracing::info!(
        bucket = %documents.bucket,
        prefix = %documents.prefix,
        "Document store enabled"
    );
    Ok(Some(Arc::new(ObjectStoreDocuments::new(
        store,
        documents.prefix.clone(),
    ))))
}

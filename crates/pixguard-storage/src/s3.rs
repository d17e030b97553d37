use crate::keys::validate_object_ref;
use crate::traits::{check_size, ContentFetcher, FetchError, FetchResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{GetOptions, ObjectStore};
use pixguard_core::StorageConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Connection settings shared by every bucket the worker reads from.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub region: String,
    /// Custom endpoint for S3-compatible providers (e.g. "http://localhost:9000" for MinIO)
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl From<&StorageConfig> for S3Settings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            region: config.s3_region.clone(),
            endpoint_url: config.s3_endpoint.clone(),
            access_key_id: config.s3_access_key_id.clone(),
            secret_access_key: config.s3_secret_access_key.clone(),
        }
    }
}

impl S3Settings {
    /// Build an object store client bound to `bucket`.
    pub fn build(&self, bucket: &str) -> FetchResult<Arc<dyn ObjectStore>> {
        // Ambient AWS_* variables first, explicit settings override them.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket);

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http)
                .with_virtual_hosted_style_request(false);
        }
        if let Some(ref key_id) = self.access_key_id {
            builder = builder.with_access_key_id(key_id.clone());
        }
        if let Some(ref secret) = self.secret_access_key {
            builder = builder.with_secret_access_key(secret.clone());
        }

        let store = builder
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;
        Ok(Arc::new(store))
    }
}

/// S3-compatible content fetcher
///
/// Messages may name any bucket, so one client is built lazily per bucket
/// and cached for the lifetime of the fetcher.
pub struct S3Fetcher {
    settings: S3Settings,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
    max_object_bytes: Option<u64>,
}

impl S3Fetcher {
    pub fn new(settings: S3Settings, max_object_bytes: Option<u64>) -> Self {
        Self {
            settings,
            stores: RwLock::new(HashMap::new()),
            max_object_bytes,
        }
    }

    /// Pin `bucket` to an already-built store instead of building an S3 client.
    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.get_mut().insert(bucket.into(), store);
        self
    }

    async fn store_for(&self, bucket: &str) -> FetchResult<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.read().await.get(bucket) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store = self.settings.build(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        tracing::debug!(bucket = %bucket, "S3 client created for bucket");
        Ok(store)
    }
}

#[async_trait]
impl ContentFetcher for S3Fetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> FetchResult<Bytes> {
        validate_object_ref(bucket, key)?;
        let store = self.store_for(bucket).await?;
        let location = Path::from(key);
        let start = std::time::Instant::now();

        let result = store
            .get_opts(&location, GetOptions::default())
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => FetchError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                other => {
                    tracing::error!(
                        error = %other,
                        bucket = %bucket,
                        key = %key,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 download failed"
                    );
                    FetchError::Transport(other.to_string())
                }
            })?;

        // Refuse before buffering when the advertised size is already too big.
        check_size(result.meta.size as u64, self.max_object_bytes)?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        check_size(bytes.len() as u64, self.max_object_bytes)?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

//! Secondary document store
//!
//! Validation results can be mirrored as JSON documents next to the uploads,
//! one object per persisted record at `{prefix}/{gid}/{record_id}.json`.
//! Writes here are independent of the relational write; see the db crate's
//! result store for how the two are sequenced.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutOptions, PutPayload};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Document write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write one document describing a persisted validation record.
    async fn put_document(
        &self,
        gid: Uuid,
        record_id: Uuid,
        document: &serde_json::Value,
    ) -> Result<(), DocumentError>;
}

/// Document store backed by any `object_store` implementation.
pub struct ObjectStoreDocuments {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreDocuments {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    fn document_path(&self, gid: Uuid, record_id: Uuid) -> Path {
        if self.prefix.is_empty() {
            Path::from(format!("{}/{}.json", gid, record_id))
        } else {
            Path::from(format!("{}/{}/{}.json", self.prefix, gid, record_id))
        }
    }
}

#[async_trait]
impl DocumentStore for ObjectStoreDocuments {
    async fn put_document(
        &self,
        gid: Uuid,
        record_id: Uuid,
        document: &serde_json::Value,
    ) -> Result<(), DocumentError> {
        let location = self.document_path(gid, record_id);
        let body = Bytes::from(serde_json::to_vec(document)?);
        let size = body.len();

        self.store
            .put_opts(&location, PutPayload::from(body), PutOptions::default())
            .await
            .map_err(|e| DocumentError::Write(e.to_string()))?;

        tracing::debug!(
            path = %location,
            size_bytes = size,
            "Validation document written"
        );
        Ok(())
    }
}

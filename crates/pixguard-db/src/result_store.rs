//! Result persistence across the relational table and the document store.
//!
//! The two writes are NOT one transaction. The relational row is written and
//! committed first; the document is written afterwards. If the document write
//! fails the row stays, the failure is logged with `consistency_gap = true`
//! and counted, and the message still succeeds. If the row fails nothing else
//! is written and the caller defers the message. Redelivery after a partial
//! success can therefore produce a second row for the same gid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pixguard_core::models::{
    InboundRequest, ProcessingTimings, ValidationOutcome, ValidationResultRecord,
};
use pixguard_storage::DocumentStore;
use serde::Serialize;

use crate::repository::ValidationRecordWriter;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Relational write failed: {0:#}")]
    Relational(#[source] anyhow::Error),
}

/// Decoded-image facts mirrored into the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist one validation outcome and return the stored record.
    async fn persist(
        &self,
        request: &InboundRequest,
        outcome: &ValidationOutcome,
        timings: ProcessingTimings,
        image: &ImageSummary,
    ) -> Result<ValidationResultRecord, StoreError>;
}

pub struct DualWriteResultStore {
    records: Arc<dyn ValidationRecordWriter>,
    documents: Option<Arc<dyn DocumentStore>>,
    secondary_write_failures: AtomicU64,
}

impl DualWriteResultStore {
    pub fn new(
        records: Arc<dyn ValidationRecordWriter>,
        documents: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            records,
            documents,
            secondary_write_failures: AtomicU64::new(0),
        }
    }

    /// Document writes that failed after their relational row committed.
    pub fn secondary_write_failures(&self) -> u64 {
        self.secondary_write_failures.load(Ordering::Relaxed)
    }

    fn document_for(
        request: &InboundRequest,
        record: &ValidationResultRecord,
        image: &ImageSummary,
    ) -> serde_json::Value {
        serde_json::json!({
            "record_id": record.id,
            "gid": request.gid_text,
            "trace_id": request.trace_id,
            "bucket": request.bucket,
            "object_key": request.object_key,
            "validation_result": record.outcome(),
            "image": image,
            "message_received_time": record.message_received_time,
            "file_received_time": record.file_received_time,
            "created_time": record.created_time,
        })
    }
}

#[async_trait]
impl ResultStore for DualWriteResultStore {
    async fn persist(
        &self,
        request: &InboundRequest,
        outcome: &ValidationOutcome,
        timings: ProcessingTimings,
        image: &ImageSummary,
    ) -> Result<ValidationResultRecord, StoreError> {
        let record = ValidationResultRecord::new(request.gid, outcome, timings);

        self.records
            .insert(&record)
            .await
            .map_err(StoreError::Relational)?;

        if let Some(documents) = &self.documents {
            let document = Self::document_for(request, &record, image);
            if let Err(e) = documents.put_document(record.gid, record.id, &document).await {
                let failures = self.secondary_write_failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    error = %e,
                    gid = %record.gid,
                    record_id = %record.id,
                    consistency_gap = true,
                    secondary_write_failures = failures,
                    "Document write failed after relational commit"
                );
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pixguard_storage::DocumentError;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Records {
        rows: Mutex<Vec<ValidationResultRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl ValidationRecordWriter for Records {
        async fn insert(&self, record: &ValidationResultRecord) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Documents {
        written: Mutex<Vec<serde_json::Value>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentStore for Documents {
        async fn put_document(
            &self,
            _gid: Uuid,
            _record_id: Uuid,
            document: &serde_json::Value,
        ) -> Result<(), DocumentError> {
            if self.fail {
                return Err(DocumentError::Write("bucket missing".into()));
            }
            self.written.lock().unwrap().push(document.clone());
            Ok(())
        }
    }

    const GID: &str = "{0F8FAD5B-D9CB-469F-A165-70867728950E}";

    fn request() -> InboundRequest {
        InboundRequest {
            gid: Uuid::parse_str(GID).unwrap(),
            gid_text: GID.into(),
            object_key: "scan.png".into(),
            bucket: "uploads".into(),
            trace_id: "trace-1".into(),
        }
    }

    fn summary() -> ImageSummary {
        ImageSummary {
            format: "png".into(),
            width: 10,
            height: 10,
            size_bytes: 120,
        }
    }

    fn timings() -> ProcessingTimings {
        let now = Utc::now();
        ProcessingTimings::new(now, now)
    }

    #[tokio::test]
    async fn writes_row_then_document() {
        let records = Arc::new(Records::default());
        let documents = Arc::new(Documents::default());
        let store = DualWriteResultStore::new(records.clone(), Some(documents.clone()));
        let req = request();

        let record = store
            .persist(&req, &ValidationOutcome::default(), timings(), &summary())
            .await
            .unwrap();

        assert_eq!(records.rows.lock().unwrap().len(), 1);
        let written = documents.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["gid"], req.gid_text);
        assert_eq!(written[0]["gid"], GID);
        assert_eq!(written[0]["record_id"], record.id.to_string());
        assert_eq!(written[0]["image"]["format"], "png");
        assert_eq!(store.secondary_write_failures(), 0);
    }

    #[tokio::test]
    async fn document_failure_keeps_row_and_is_counted() {
        let records = Arc::new(Records::default());
        let documents = Arc::new(Documents {
            fail: true,
            ..Default::default()
        });
        let store = DualWriteResultStore::new(records.clone(), Some(documents));

        let result = store
            .persist(&request(), &ValidationOutcome::default(), timings(), &summary())
            .await;

        assert!(result.is_ok());
        assert_eq!(records.rows.lock().unwrap().len(), 1);
        assert_eq!(store.secondary_write_failures(), 1);
    }

    #[tokio::test]
    async fn relational_failure_skips_document() {
        let records = Arc::new(Records {
            fail: true,
            ..Default::default()
        });
        let documents = Arc::new(Documents::default());
        let store = DualWriteResultStore::new(records, Some(documents.clone()));

        let result = store
            .persist(&request(), &ValidationOutcome::default(), timings(), &summary())
            .await;

        assert!(matches!(result, Err(StoreError::Relational(_))));
        assert!(documents.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_request_twice_creates_two_rows() {
        let records = Arc::new(Records::default());
        let store = DualWriteResultStore::new(records.clone(), None);
        let req = request();

        for _ in 0..2 {
            store
                .persist(&req, &ValidationOutcome::default(), timings(), &summary())
                .await
                .unwrap();
        }

        let rows = records.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].gid, rows[1].gid);
        assert_ne!(rows[0].id, rows[1].id);
    }
}

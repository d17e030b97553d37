use anyhow::{Context, Result};
use async_trait::async_trait;
use pixguard_core::models::ValidationResultRecord;
use sqlx::PgPool;

/// Write side of the relational result table.
///
/// The result store depends on this seam rather than on the concrete
/// repository so the dual-write policy can be exercised without a database.
#[async_trait]
pub trait ValidationRecordWriter: Send + Sync {
    async fn insert(&self, record: &ValidationResultRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct ValidationResultRepository {
    pool: PgPool,
}

impl ValidationResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ValidationRecordWriter for ValidationResultRepository {
    #[tracing::instrument(skip(self, record), fields(db.table = "image_validation_result", db.operation = "insert", db.record_id = %record.id, gid = %record.gid))]
    async fn insert(&self, record: &ValidationResultRecord) -> Result<()> {
        // Each write gets its own transaction; returning early drops it
        // uncommitted, which rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO image_validation_result
                (id, gid, is_blank, is_folded, tilt_angle,
                 message_received_time, file_received_time, created_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.gid)
        .bind(record.is_blank)
        .bind(record.is_folded)
        .bind(record.tilt_angle)
        .bind(record.message_received_time)
        .bind(record.file_received_time)
        .bind(record.created_time)
        .execute(&mut *tx)
        .await
        .context("Failed to insert validation result")?;

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::debug!("Validation result stored");
        Ok(())
    }
}

//! Per-message processing.
//!
//! A delivery walks `Received -> Parsed -> Fetched -> Decoded -> Validated ->
//! Persisted -> Published -> Acknowledged`. Any stage can end it early:
//!
//! | failure                           | kind      | settlement                |
//! |-----------------------------------|-----------|---------------------------|
//! | malformed body, missing field     | permanent | ack                       |
//! | gid not a UUID                    | permanent | ack                       |
//! | object too large, invalid key     | permanent | ack + `fail` event        |
//! | undecodable image                 | permanent | ack + `fail` event        |
//! | object missing, transport error   | transient | retry                     |
//! | persist error                     | transient | retry                     |
//! | publish error                     | transient | retry                     |
//! | any transient, x-death budget hit | transient | park in `{queue}.dead`    |
//!
//! A retry is a nack without requeue. The consume queue dead-letters the
//! message into `{queue}.retry`, whose TTL routes it back to the consume
//! exchange; every such cycle, and every TTL expiry in the consume queue,
//! adds to the `x-death` count the budget is measured against.
//!
//! Delivery is at-least-once. A message that fails at the publish stage has
//! already been persisted, so its redelivery writes a second record and may
//! emit a second event for the same gid.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixguard_core::models::{
    InboundRequest, OutboundEvent, ProcessingTimings, ValidationResultRecord,
};
use pixguard_core::{BrokerConfig, FailureKind, PipelineStage, ProcessingError, ProcessingResultExt};
use pixguard_db::{ImageSummary, ResultStore};
use pixguard_processing::decoder::format_name;
use pixguard_processing::{ImageDecoder, ValidationEngine};
use pixguard_storage::ContentFetcher;
use tracing::Instrument;

use crate::broker::{Delivery, InboundMessage, Settlement};
use crate::codec::MessageCodec;
use crate::publisher::ResultPublisher;

/// How transient failures are handed back to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Held in process before a deferred message is handed back to the broker
    pub requeue_delay: Duration,
    /// Dead-letter cycles after which a transient failure is parked instead of retried. 0 = unbounded.
    pub max_dead_letter_cycles: u32,
}

impl DeliveryPolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            requeue_delay: config.requeue_delay(),
            max_dead_letter_cycles: config.max_dead_letter_cycles,
        }
    }

    pub fn settlement_for(&self, kind: FailureKind, death_count: u32) -> Settlement {
        match kind {
            FailureKind::Permanent => Settlement::Ack,
            FailureKind::Transient if self.budget_exhausted(death_count) => Settlement::Park,
            FailureKind::Transient => Settlement::Retry,
        }
    }

    fn budget_exhausted(&self, death_count: u32) -> bool {
        self.max_dead_letter_cycles > 0 && death_count >= self.max_dead_letter_cycles
    }
}

/// A message that made it all the way through.
#[derive(Debug)]
pub struct Processed {
    pub record: ValidationResultRecord,
    pub event: OutboundEvent,
}

pub struct ConsumerPipeline {
    codec: MessageCodec,
    fetcher: Arc<dyn ContentFetcher>,
    decoder: ImageDecoder,
    engine: Arc<ValidationEngine>,
    store: Arc<dyn ResultStore>,
    publisher: ResultPublisher,
    policy: DeliveryPolicy,
}

impl ConsumerPipeline {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        engine: Arc<ValidationEngine>,
        store: Arc<dyn ResultStore>,
        publisher: ResultPublisher,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            codec: MessageCodec::new(),
            fetcher,
            decoder: ImageDecoder::new(),
            engine,
            store,
            publisher,
            policy,
        }
    }

    /// Process one delivery and settle it exactly once.
    pub async fn handle(&self, delivery: Delivery) -> Settlement {
        let span = tracing::info_span!(
            "message",
            delivery_tag = delivery.message.delivery_tag,
            redelivered = delivery.message.redelivered,
            gid = tracing::field::Empty,
            trace_id = tracing::field::Empty
        );

        async move {
            let settlement = self.run(&delivery.message).await;
            match delivery.settle(settlement).await {
                Ok(()) => tracing::debug!(%settlement, "Delivery settled"),
                // The broker redelivers anything left unsettled when the channel closes.
                Err(e) => tracing::error!(error = %e, %settlement, "Failed to settle delivery"),
            }
            settlement
        }
        .instrument(span)
        .await
    }

    async fn run(&self, message: &InboundMessage) -> Settlement {
        let received_at = Utc::now();

        let request = match self
            .codec
            .decode(&message.body, &message.headers)
            .permanent(PipelineStage::Parsed)
        {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    body_bytes = message.body.len(),
                    stage = %PipelineStage::Rejected,
                    "Unparseable message rejected"
                );
                return Settlement::Ack;
            }
        };

        let span = tracing::Span::current();
        span.record("gid", request.gid_text.as_str());
        span.record("trace_id", request.trace_id.as_str());

        match self.process(&request, received_at).await {
            Ok(processed) => {
                tracing::info!(
                    record_id = %processed.record.id,
                    is_blank = processed.record.is_blank,
                    event_id = %processed.event.header.event_id,
                    stage = %PipelineStage::Acknowledged,
                    "Message processed"
                );
                Settlement::Ack
            }
            Err(err) => self.on_failure(&request, err, message.death_count).await,
        }
    }

    /// Run a parsed request from fetch through publish.
    pub async fn process(
        &self,
        request: &InboundRequest,
        received_at: DateTime<Utc>,
    ) -> Result<Processed, ProcessingError> {
        let content = self
            .fetcher
            .fetch(&request.bucket, &request.object_key)
            .await
            .map_err(|e| {
                if e.is_permanent() {
                    ProcessingError::permanent(PipelineStage::Fetched, e)
                } else {
                    ProcessingError::transient(PipelineStage::Fetched, e)
                }
            })?;
        let file_received = Utc::now();
        tracing::debug!(stage = %PipelineStage::Fetched, size_bytes = content.len());

        let decoded = self
            .decoder
            .decode(&content)
            .permanent(PipelineStage::Decoded)?;
        drop(content);
        tracing::debug!(
            stage = %PipelineStage::Decoded,
            format = format_name(decoded.format),
            width = decoded.width,
            height = decoded.height
        );

        let outcome = self.engine.validate(&decoded.matrix);
        tracing::debug!(stage = %PipelineStage::Validated, is_blank = outcome.is_blank);

        let image = ImageSummary {
            format: format_name(decoded.format).to_string(),
            width: decoded.width,
            height: decoded.height,
            size_bytes: decoded.size_bytes,
        };
        let record = self
            .store
            .persist(
                request,
                &outcome,
                ProcessingTimings::new(received_at, file_received),
                &image,
            )
            .await
            .transient(PipelineStage::Persisted)?;
        tracing::debug!(stage = %PipelineStage::Persisted, record_id = %record.id);

        let event = self
            .publisher
            .publish_success(request, outcome)
            .await
            .transient(PipelineStage::Published)?;
        tracing::debug!(stage = %PipelineStage::Published, event_id = %event.header.event_id);

        Ok(Processed { record, event })
    }

    async fn on_failure(
        &self,
        request: &InboundRequest,
        err: ProcessingError,
        death_count: u32,
    ) -> Settlement {
        let settlement = self.policy.settlement_for(err.kind(), death_count);

        match settlement {
            Settlement::Ack => {
                tracing::warn!(
                    error = %err,
                    failed_stage = %err.stage(),
                    stage = %PipelineStage::Rejected,
                    "Message rejected"
                );
                if let Err(e) = self.publisher.publish_failure(request, err.inner().to_string()).await {
                    tracing::warn!(error = %e, "Failed to publish failure event");
                }
            }
            Settlement::Retry => {
                tracing::warn!(
                    error = %err,
                    failed_stage = %err.stage(),
                    stage = %PipelineStage::Deferred,
                    requeue_delay_ms = self.policy.requeue_delay.as_millis() as u64,
                    "Message deferred"
                );
                if !self.policy.requeue_delay.is_zero() {
                    tokio::time::sleep(self.policy.requeue_delay).await;
                }
            }
            Settlement::Park => {
                tracing::error!(
                    error = %err,
                    failed_stage = %err.stage(),
                    stage = %PipelineStage::Deferred,
                    death_count,
                    max_dead_letter_cycles = self.policy.max_dead_letter_cycles,
                    "Retry budget exhausted, parking message"
                );
            }
        }

        settlement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            requeue_delay: Duration::ZERO,
            max_dead_letter_cycles: max,
        }
    }

    #[test]
    fn permanent_failures_are_acked() {
        assert_eq!(
            policy(3).settlement_for(FailureKind::Permanent, 10),
            Settlement::Ack
        );
    }

    #[test]
    fn transient_failures_retry_until_budget_is_spent() {
        let policy = policy(3);
        assert_eq!(
            policy.settlement_for(FailureKind::Transient, 0),
            Settlement::Retry
        );
        assert_eq!(
            policy.settlement_for(FailureKind::Transient, 2),
            Settlement::Retry
        );
        assert_eq!(
            policy.settlement_for(FailureKind::Transient, 3),
            Settlement::Park
        );
    }

    #[test]
    fn zero_budget_never_parks() {
        assert_eq!(
            policy(0).settlement_for(FailureKind::Transient, 50),
            Settlement::Retry
        );
    }

    #[test]
    fn policy_reads_broker_config() {
        let config = BrokerConfig::default();
        let policy = DeliveryPolicy::from_config(&config);
        assert_eq!(policy.requeue_delay, Duration::from_millis(1_000));
        assert_eq!(policy.max_dead_letter_cycles, 3);
    }
}

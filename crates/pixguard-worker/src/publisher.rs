use std::sync::Arc;

use pixguard_core::models::{InboundRequest, OutboundEvent, ValidationOutcome};

use crate::broker::{BrokerError, RawPublisher};

/// Publishes correlated result events to the result exchange.
///
/// Every publish builds a new event, so a retried message gets a new
/// `event_id`; `gid` and `trace_id` always come from the inbound request.
pub struct ResultPublisher {
    broker: Arc<dyn RawPublisher>,
    exchange: String,
    routing_key: String,
    source_service: String,
}

impl ResultPublisher {
    pub fn new(
        broker: Arc<dyn RawPublisher>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            source_service: source_service.into(),
        }
    }

    pub fn build_event(&self, request: &InboundRequest, outcome: ValidationOutcome) -> OutboundEvent {
        OutboundEvent::success(&request.gid_text, &request.trace_id, &self.source_service, outcome)
    }

    pub async fn publish_success(
        &self,
        request: &InboundRequest,
        outcome: ValidationOutcome,
    ) -> Result<OutboundEvent, BrokerError> {
        let event = self.build_event(request, outcome);
        self.send(&event).await?;
        Ok(event)
    }

    pub async fn publish_failure(
        &self,
        request: &InboundRequest,
        reason: impl Into<String>,
    ) -> Result<OutboundEvent, BrokerError> {
        let event = OutboundEvent::failure(
            &request.gid_text,
            &request.trace_id,
            &self.source_service,
            reason.into(),
        );
        self.send(&event).await?;
        Ok(event)
    }

    async fn send(&self, event: &OutboundEvent) -> Result<(), BrokerError> {
        let body = event
            .body_bytes()
            .map_err(|e| BrokerError::Other(format!("Failed to serialize event: {}", e)))?;
        self.broker
            .publish(
                &self.exchange,
                &self.routing_key,
                &event.header.to_headers(),
                &body,
            )
            .await?;

        tracing::debug!(
            event_id = %event.header.event_id,
            status = ?event.body.status,
            exchange = %self.exchange,
            "Result event published"
        );
        Ok(())
    }
}

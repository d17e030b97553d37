//! Broker abstraction
//!
//! The pipeline only sees deliveries that carry their own settlement handle,
//! a stream of such deliveries, and a raw publish primitive. The AMQP adapter
//! implements all three over one connection and one channel.

#[cfg(feature = "amqp")]
pub mod amqp;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Publish to exchange {exchange:?} was not confirmed")]
    NotConfirmed { exchange: String },

    #[error("Broker connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// What the broker sees once a message is done with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processed, or permanently rejected
    Ack,
    /// Nack without requeue. The consume queue dead-letters it into the retry
    /// queue, which routes it back after the retry delay with `x-death` bumped.
    Retry,
    /// Retry budget spent: copied to the parking queue, then acked
    Park,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Settlement::Ack => "ack",
            Settlement::Retry => "retry",
            Settlement::Park => "park",
        })
    }
}

/// A received message, detached from its transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub body: Bytes,
    /// String-valued headers only
    pub headers: BTreeMap<String, String>,
    pub redelivered: bool,
    /// Times this message has been dead-lettered from the consume queue (`x-death`)
    pub death_count: u32,
    pub delivery_tag: u64,
}

/// Settlement capability of one delivery. Consumed on use.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    /// Reject without requeue so the broker dead-letters the message.
    async fn reject(self: Box<Self>) -> Result<(), BrokerError>;
    /// Move the message to terminal storage and ack it.
    async fn park(self: Box<Self>) -> Result<(), BrokerError>;
}

/// A message plus the handle that settles it.
///
/// `settle` takes `self`, so a delivery can be settled at most once.
pub struct Delivery {
    pub message: InboundMessage,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: InboundMessage, acker: Box<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    pub async fn settle(self, settlement: Settlement) -> Result<(), BrokerError> {
        match settlement {
            Settlement::Ack => self.acker.ack().await,
            Settlement::Retry => self.acker.reject().await,
            Settlement::Park => self.acker.park().await,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Source of deliveries for the supervisor.
#[async_trait]
pub trait DeliveryStream: Send {
    /// `None` once the consumer has been cancelled. An error means the
    /// connection or channel is gone.
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>>;
}

/// Persistent publish to an exchange.
#[async_trait]
pub trait RawPublisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<(), BrokerError>;
}

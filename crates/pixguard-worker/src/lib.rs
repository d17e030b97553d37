//! Pixguard Worker Library
//!
//! Queue-driven image validation: decode a request, fetch the object,
//! classify it, persist the outcome and publish a result event.
//!
//! - [`codec`]: inbound message parsing
//! - [`broker`]: delivery/settlement abstraction and the AMQP adapter
//! - [`pipeline`]: the per-message state machine and failure classification
//! - [`publisher`]: result events
//! - [`supervisor`]: prefetch-bounded consumption and graceful drain

pub mod broker;
pub mod codec;
pub mod pipeline;
pub mod publisher;
pub mod supervisor;
pub mod telemetry;

pub use broker::{
    Acknowledger, BrokerError, Delivery, DeliveryStream, InboundMessage, RawPublisher, Settlement,
};
pub use codec::{MessageCodec, ParseFailure};
pub use pipeline::{ConsumerPipeline, DeliveryPolicy, Processed};
pub use publisher::ResultPublisher;
pub use supervisor::{reconnect_backoff, Supervisor};

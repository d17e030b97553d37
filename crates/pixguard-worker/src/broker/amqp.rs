//! AMQP 0-9-1 adapter (RabbitMQ)
//!
//! One connection, one channel. The channel runs in publisher-confirm mode so
//! a result event only counts as published once the broker has confirmed it.
//!
//! Topology:
//!
//! ```text
//! consume exchange -> {queue} --(reject / TTL expiry)--> DLX
//! DLX --dead_letter_routing_key--> {queue}.retry --(retry TTL)--> consume exchange
//! DLX --{dead_letter_routing_key}.parked--> {queue}.dead   (terminal)
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use pixguard_core::BrokerConfig;

use super::{Acknowledger, BrokerError, Delivery, DeliveryStream, InboundMessage, RawPublisher};

const PERSISTENT: u8 = 2;
const CONSUMER_TAG: &str = "pixguard-worker";

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        tracing::info!(channel_id = channel.id(), "Connected to broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare exchanges, queues and bindings. Idempotent as long as the
    /// arguments match what already exists on the broker.
    pub async fn declare_topology(&self, config: &BrokerConfig) -> Result<(), BrokerError> {
        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        let durable_queue = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        for exchange in [
            &config.consume_exchange,
            &config.publish_exchange,
            &config.dead_letter_exchange,
        ] {
            self.channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Direct,
                    durable_exchange,
                    FieldTable::default(),
                )
                .await?;
        }

        self.channel
            .queue_declare(
                &config.consume_queue,
                durable_queue,
                consume_queue_arguments(config),
            )
            .await?;
        self.channel
            .queue_bind(
                &config.consume_queue,
                &config.consume_exchange,
                &config.consume_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let retry_queue = config.retry_queue();
        self.channel
            .queue_declare(&retry_queue, durable_queue, retry_queue_arguments(config))
            .await?;
        self.channel
            .queue_bind(
                &retry_queue,
                &config.dead_letter_exchange,
                &config.dead_letter_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let parking_queue = config.parking_queue();
        self.channel
            .queue_declare(&parking_queue, durable_queue, FieldTable::default())
            .await?;
        self.channel
            .queue_bind(
                &parking_queue,
                &config.dead_letter_exchange,
                &config.parking_routing_key(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            consume_queue = %config.consume_queue,
            retry_queue = %retry_queue,
            parking_queue = %parking_queue,
            message_ttl_ms = config.message_ttl_ms,
            retry_delay_ms = config.retry_delay_ms,
            "Broker topology declared"
        );
        Ok(())
    }

    /// Apply the prefetch limit and start consuming.
    pub async fn consume(&self, config: &BrokerConfig) -> Result<AmqpDeliveryStream, BrokerError> {
        self.channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await?;
        let consumer = self
            .channel
            .basic_consume(
                &config.consume_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            queue = %config.consume_queue,
            prefetch_count = config.prefetch_count,
            "Consuming"
        );
        Ok(AmqpDeliveryStream {
            consumer,
            channel: self.channel.clone(),
            consume_queue: config.consume_queue.clone(),
            parking: ParkingTarget {
                exchange: config.dead_letter_exchange.clone(),
                routing_key: config.parking_routing_key(),
            },
        })
    }

    pub fn publisher(&self) -> AmqpPublisher {
        AmqpPublisher {
            channel: self.channel.clone(),
        }
    }

    pub async fn close(self) -> Result<(), BrokerError> {
        self.channel.close(200, "worker shutdown").await?;
        self.connection.close(200, "worker shutdown").await?;
        tracing::info!("Broker connection closed");
        Ok(())
    }
}

pub struct AmqpDeliveryStream {
    consumer: Consumer,
    channel: Channel,
    consume_queue: String,
    parking: ParkingTarget,
}

/// Where deliveries with a spent retry budget are copied to.
#[derive(Clone, Debug)]
struct ParkingTarget {
    exchange: String,
    routing_key: String,
}

#[async_trait]
impl DeliveryStream for AmqpDeliveryStream {
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let delivery = match self.consumer.next().await? {
            Ok(delivery) => delivery,
            Err(e) => return Some(Err(e.into())),
        };

        let (headers, deaths) = match delivery.properties.headers() {
            Some(table) => (string_headers(table), death_count(table, &self.consume_queue)),
            None => (BTreeMap::new(), 0),
        };
        let body = Bytes::from(delivery.data);
        let message = InboundMessage {
            body: body.clone(),
            headers,
            redelivered: delivery.redelivered,
            death_count: deaths,
            delivery_tag: delivery.delivery_tag,
        };

        Some(Ok(Delivery::new(
            message,
            Box::new(AmqpAcker {
                acker: delivery.acker,
                channel: self.channel.clone(),
                parking: self.parking.clone(),
                body,
                properties: delivery.properties,
            }),
        )))
    }
}

struct AmqpAcker {
    acker: Acker,
    channel: Channel,
    parking: ParkingTarget,
    body: Bytes,
    properties: BasicProperties,
}

impl AmqpAcker {
    async fn nack_without_requeue(&self) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Confirmed copy to the parking queue, original headers (and `x-death`) kept.
    async fn copy_to_parking(&self) -> Result<(), BrokerError> {
        let confirmation = self
            .channel
            .basic_publish(
                &self.parking.exchange,
                &self.parking.routing_key,
                BasicPublishOptions::default(),
                &self.body,
                self.properties.clone().with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;

        match confirmation {
            Confirmation::Nack(_) => Err(BrokerError::NotConfirmed {
                exchange: self.parking.exchange.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(self: Box<Self>) -> Result<(), BrokerError> {
        self.nack_without_requeue().await
    }

    async fn park(self: Box<Self>) -> Result<(), BrokerError> {
        if let Err(e) = self.copy_to_parking().await {
            // Keep it cycling through the retry queue rather than holding
            // an unacked delivery; the next attempt tries to park it again.
            self.nack_without_requeue().await?;
            return Err(e);
        }
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AmqpPublisher {
    channel: Channel,
}

#[async_trait]
impl RawPublisher for AmqpPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let mut table = FieldTable::default();
        for (name, value) in headers {
            table.insert(
                ShortString::from(name.as_str()),
                AMQPValue::LongString(value.clone().into()),
            );
        }
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(ShortString::from("application/json"))
            .with_headers(table);

        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        match confirmation {
            Confirmation::Nack(_) => Err(BrokerError::NotConfirmed {
                exchange: exchange.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

fn string_headers(table: &FieldTable) -> BTreeMap<String, String> {
    table
        .inner()
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                AMQPValue::ShortString(s) => s.as_str().to_string(),
                _ => return None,
            };
            Some((name.as_str().to_string(), value))
        })
        .collect()
}

fn consume_queue_arguments(config: &BrokerConfig) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(config.dead_letter_exchange.clone().into()),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(config.dead_letter_routing_key.clone().into()),
    );
    arguments.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongUInt(config.message_ttl_ms),
    );
    arguments
}

fn retry_queue_arguments(config: &BrokerConfig) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(config.consume_exchange.clone().into()),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(config.consume_routing_key.clone().into()),
    );
    arguments.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongUInt(config.retry_delay_ms),
    );
    arguments
}

/// Times the broker has dead-lettered this message out of `queue`, summed
/// over every reason (`rejected`, `expired`) recorded in `x-death`.
fn death_count(table: &FieldTable, queue: &str) -> u32 {
    let Some(AMQPValue::FieldArray(entries)) = table.inner().get(&ShortString::from("x-death")) else {
        return 0;
    };

    entries
        .as_slice()
        .iter()
        .filter_map(|entry| match entry {
            AMQPValue::FieldTable(death) => Some(death.inner()),
            _ => None,
        })
        .filter(|death| match death.get(&ShortString::from("queue")) {
            Some(AMQPValue::LongString(q)) => q.as_bytes() == queue.as_bytes(),
            Some(AMQPValue::ShortString(q)) => q.as_str() == queue,
            _ => false,
        })
        .filter_map(|death| match death.get(&ShortString::from("count")) {
            Some(AMQPValue::LongLongInt(n)) => u32::try_from(*n).ok(),
            Some(AMQPValue::LongInt(n)) => u32::try_from(*n).ok(),
            Some(AMQPValue::LongUInt(n)) => Some(*n),
            _ => None,
        })
        .fold(0u32, u32::saturating_add)
}

//! Test fakes for the worker: an in-memory broker, counting fetcher and
//! record writer, and image generators.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use pixguard_core::models::ValidationResultRecord;
use pixguard_core::{StorageBackend, ValidationConfig};
use pixguard_db::{DualWriteResultStore, ValidationRecordWriter};
use pixguard_processing::ValidationEngine;
use pixguard_storage::{ContentFetcher, FetchError, FetchResult};
use pixguard_worker::{
    Acknowledger, BrokerError, ConsumerPipeline, Delivery, DeliveryPolicy, DeliveryStream,
    InboundMessage, RawPublisher, ResultPublisher, Settlement,
};
use tokio::sync::mpsc;

pub const BUCKET: &str = "uploads";
pub const RESULT_EXCHANGE: &str = "image.validation.result";

// ----- images -----

pub fn png(gray: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(gray.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn white_png(width: u32, height: u32) -> Vec<u8> {
    png(&GrayImage::from_pixel(width, height, Luma([255])))
}

/// 100x100 white page with a 2x2 black square in the middle.
pub fn square_png() -> Vec<u8> {
    let mut gray = GrayImage::from_pixel(100, 100, Luma([255]));
    for x in 49..51 {
        for y in 49..51 {
            gray.put_pixel(x, y, Luma([0]));
        }
    }
    png(&gray)
}

pub fn body(gid: &str, key: &str) -> Vec<u8> {
    format!(r#"{{"gid":"{gid}","objectKey":"{key}","bucket":"{BUCKET}"}}"#).into_bytes()
}

// ----- content store -----

#[derive(Default)]
pub struct CountingFetcher {
    objects: Mutex<HashMap<String, Bytes>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub fail_transport: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingFetcher {
    pub fn with_object(self, key: &str, data: Vec<u8>) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(data));
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for CountingFetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> FetchResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("connection reset".into()));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

// ----- relational store -----

#[derive(Default)]
pub struct MemoryRecords {
    pub rows: Mutex<Vec<ValidationResultRecord>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MemoryRecords {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<ValidationResultRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ValidationRecordWriter for MemoryRecords {
    async fn insert(&self, record: &ValidationResultRecord) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ----- broker -----

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
pub struct MemoryBroker {
    published: Mutex<Vec<Published>>,
    settlements: Arc<Mutex<Vec<(u64, Settlement)>>>,
    pub fail_publish: AtomicBool,
    next_tag: AtomicUsize,
}

impl MemoryBroker {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn settlements(&self) -> Vec<(u64, Settlement)> {
        self.settlements.lock().unwrap().clone()
    }

    pub fn delivery(&self, body: Vec<u8>, trace_id: Option<&str>) -> Delivery {
        self.delivery_with_deaths(body, trace_id, 0)
    }

    pub fn delivery_with_deaths(
        &self,
        body: Vec<u8>,
        trace_id: Option<&str>,
        death_count: u32,
    ) -> Delivery {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut headers = BTreeMap::new();
        if let Some(trace_id) = trace_id {
            headers.insert("trace_id".to_string(), trace_id.to_string());
        }
        Delivery::new(
            InboundMessage {
                body: Bytes::from(body),
                headers,
                redelivered: death_count > 0,
                death_count,
                delivery_tag: tag,
            },
            Box::new(MemoryAcker {
                tag,
                settlements: Arc::clone(&self.settlements),
            }),
        )
    }
}

#[async_trait]
impl RawPublisher for MemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConfirmed {
                exchange: exchange.to_string(),
            });
        }
        self.published.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            headers: headers.clone(),
            body: serde_json::from_slice(body).unwrap(),
        });
        Ok(())
    }
}

struct MemoryAcker {
    tag: u64,
    settlements: Arc<Mutex<Vec<(u64, Settlement)>>>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.tag, Settlement::Ack));
        Ok(())
    }

    async fn reject(self: Box<Self>) -> Result<(), BrokerError> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.tag, Settlement::Retry));
        Ok(())
    }

    async fn park(self: Box<Self>) -> Result<(), BrokerError> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.tag, Settlement::Park));
        Ok(())
    }
}

/// Delivery stream fed from a channel; closing the sender ends the stream.
pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Result<Delivery, BrokerError>>,
}

pub fn channel_stream() -> (
    mpsc::UnboundedSender<Result<Delivery, BrokerError>>,
    ChannelStream,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelStream { rx })
}

#[async_trait]
impl DeliveryStream for ChannelStream {
    async fn next(&mut self) -> Option<Result<Delivery, BrokerError>> {
        self.rx.recv().await
    }
}

// ----- wiring -----

pub struct Harness {
    pub fetcher: Arc<CountingFetcher>,
    pub records: Arc<MemoryRecords>,
    pub store: Arc<DualWriteResultStore>,
    pub broker: Arc<MemoryBroker>,
    pub pipeline: Arc<ConsumerPipeline>,
}

pub fn harness(fetcher: CountingFetcher) -> Harness {
    harness_with_policy(
        fetcher,
        DeliveryPolicy {
            requeue_delay: Duration::ZERO,
            max_dead_letter_cycles: 3,
        },
    )
}

pub fn harness_with_policy(fetcher: CountingFetcher, policy: DeliveryPolicy) -> Harness {
    let fetcher = Arc::new(fetcher);
    let records = Arc::new(MemoryRecords::default());
    let store = Arc::new(DualWriteResultStore::new(records.clone(), None));
    let broker = Arc::new(MemoryBroker::default());
    let engine = Arc::new(ValidationEngine::from_config(&ValidationConfig::default()).unwrap());

    let pipeline = Arc::new(ConsumerPipeline::new(
        fetcher.clone(),
        engine,
        store.clone(),
        ResultPublisher::new(
            broker.clone(),
            RESULT_EXCHANGE,
            "image.validation.result",
            "image-validation-worker",
        ),
        policy,
    ));

    Harness {
        fetcher,
        records,
        store,
        broker,
        pipeline,
    }
}

//! Durable job queues.
//!
//! A [`Connector`] opens a [`Broker`] connection. Brokers publish raw
//! payloads to named durable queues, broadcast them through exchanges to
//! every bound queue, and hand out [`Delivery`] values that must be
//! acknowledged manually.
//!
//! Two transports are provided: NATS JetStream (`nats` feature) and an
//! in-process broker used by tests and single-process setups.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;

pub use memory::MemoryBroker;
#[cfg(feature = "nats")]
pub use nats::{NatsBroker, NatsConnector};

/// Exchange that fans pin jobs out to every pin consumer group.
pub const PIN_EXCHANGE: &str = "ipfs-pin";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed")]
    Closed,
}

/// A durable queue, optionally bound to an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueSpec {
    pub name: Cow<'static, str>,
    pub exchange: Option<Cow<'static, str>>,
}

impl QueueSpec {
    pub const PIN: QueueSpec = QueueSpec::bound("ipfs-pin-queue", PIN_EXCHANGE);
    pub const FILE: QueueSpec = QueueSpec::plain("ipfs-file-queue");
    pub const CLUSTER_PIN: QueueSpec = QueueSpec::plain("ipfs-cluster-pin-queue");
    pub const IPNS_ENTRY: QueueSpec = QueueSpec::plain("ipns-entry-queue");
    pub const KEY_CREATION: QueueSpec = QueueSpec::plain("ipfs-key-creation-queue");
    pub const EMAIL_SEND: QueueSpec = QueueSpec::plain("email-send-queue");
    pub const PIN_REMOVAL: QueueSpec = QueueSpec::plain("ipfs-pin-removal-queue");

    pub const fn plain(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            exchange: None,
        }
    }

    pub const fn bound(name: &'static str, exchange: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            exchange: Some(Cow::Borrowed(exchange)),
        }
    }

    /// Queue that receives messages this queue gave up on.
    pub fn dead_letter(&self) -> QueueSpec {
        QueueSpec {
            name: Cow::Owned(format!("{}-dead-letter", self.name)),
            exchange: None,
        }
    }
}

/// A message handed to a consumer. Exactly one of `ack` or `nack` must be
/// called.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Delivery attempt, starting at 1.
    fn attempt(&self) -> u32;

    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Returns the message to the queue, redelivered after `delay`.
    async fn nack(self: Box<Self>, delay: Option<Duration>) -> Result<(), QueueError>;
}

/// Infinite stream of deliveries for one queue.
pub type Deliveries = BoxStream<'static, Result<Box<dyn Delivery>, QueueError>>;

/// One broker connection.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Creates the queue (and its exchange binding) if it does not exist.
    async fn declare(&self, queue: &QueueSpec) -> Result<(), QueueError>;

    async fn publish(&self, queue: &QueueSpec, payload: Bytes) -> Result<(), QueueError>;

    /// Publishes to every queue bound to `exchange`.
    async fn broadcast(&self, exchange: &str, payload: Bytes) -> Result<(), QueueError>;

    async fn consume(&self, queue: &QueueSpec) -> Result<Deliveries, QueueError>;

    async fn close(&self) -> Result<(), QueueError>;
}

/// Opens broker connections. Every worker owns its own connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError>;
}

/// JSON publisher on top of a broker connection.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn publish<T: Serialize + Sync>(
        &self,
        queue: &QueueSpec,
        message: &T,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(message)?;
        self.broker.publish(queue, payload.into()).await
    }

    pub async fn broadcast<T: Serialize + Sync>(
        &self,
        exchange: &str,
        message: &T,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(message)?;
        self.broker.broadcast(exchange, payload.into()).await
    }
}

/// A message set aside after exhausting its delivery attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    /// Original payload, lossily decoded as UTF-8.
    pub payload: String,
    pub reason: String,
    pub attempts: u32,
    /// Unix timestamp when the message was dead-lettered
    pub dead_lettered_at: i64,
}

impl DeadLetter {
    pub fn new(queue: &QueueSpec, payload: &[u8], reason: String, attempts: u32) -> Self {
        Self {
            queue: queue.name.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            reason,
            attempts,
            dead_lettered_at: chrono::Utc::now().timestamp(),
        }
    }
}

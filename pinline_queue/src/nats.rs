//! NATS JetStream transport.
//!
//! A plain queue is a work-queue stream with a single durable pull
//! consumer shared by all workers. An exchange is a limits stream; every
//! queue bound to it is a separate durable consumer on that stream, so each
//! bound queue sees every broadcast message once.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer::AckPolicy, stream::RetentionPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::{Broker, Connector, Deliveries, Delivery, QueueError, QueueSpec};

const SUBJECT_PREFIX: &str = "pinline";

// Longest expected handler run, RSA key generation included.
const ACK_WAIT: Duration = Duration::from_secs(300);

const EXCHANGE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

fn transport<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> QueueError {
    move |e| QueueError::Transport(format!("{context}: {e}"))
}

fn exchange_subject(exchange: &str) -> String {
    format!("{SUBJECT_PREFIX}.{exchange}")
}

fn queue_subject(queue: &QueueSpec) -> String {
    match &queue.exchange {
        Some(exchange) => format!("{}.{}", exchange_subject(exchange), queue.name),
        None => format!("{SUBJECT_PREFIX}.{}", queue.name),
    }
}

fn exchange_config(exchange: &str) -> jetstream::stream::Config {
    jetstream::stream::Config {
        name: exchange.to_string(),
        subjects: vec![
            exchange_subject(exchange),
            format!("{}.>", exchange_subject(exchange)),
        ],
        retention: RetentionPolicy::Limits,
        max_age: EXCHANGE_MAX_AGE,
        ..Default::default()
    }
}

/// Connects to a NATS server.
#[derive(Debug, Clone)]
pub struct NatsConnector {
    url: String,
    name: String,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
        let client = async_nats::ConnectOptions::new()
            .name(&self.name)
            .connection_timeout(Duration::from_secs(5))
            .connect(self.url.as_str())
            .await
            .map_err(transport("failed to connect"))?;
        info!(url = %self.url, "connected to nats");
        Ok(Arc::new(NatsBroker::new(client)))
    }
}

pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsBroker {
    pub fn new(client: async_nats::Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    async fn stream(&self, queue: &QueueSpec) -> Result<jetstream::stream::Stream, QueueError> {
        let config = match &queue.exchange {
            Some(exchange) => exchange_config(exchange),
            None => jetstream::stream::Config {
                name: queue.name.to_string(),
                subjects: vec![queue_subject(queue)],
                retention: RetentionPolicy::WorkQueue,
                ..Default::default()
            },
        };
        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(transport("failed to create stream"))
    }

    async fn send(&self, subject: String, payload: Bytes) -> Result<(), QueueError> {
        self.jetstream
            .publish(subject, payload)
            .await
            .map_err(transport("failed to publish"))?
            .await
            .map_err(transport("failed to confirm publish"))?;
        Ok(())
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn declare(&self, queue: &QueueSpec) -> Result<(), QueueError> {
        self.stream(queue).await.map(|_| ())
    }

    async fn publish(&self, queue: &QueueSpec, payload: Bytes) -> Result<(), QueueError> {
        self.declare(queue).await?;
        self.send(queue_subject(queue), payload).await
    }

    async fn broadcast(&self, exchange: &str, payload: Bytes) -> Result<(), QueueError> {
        // Bound queues may not have been declared yet.
        self.jetstream
            .get_or_create_stream(exchange_config(exchange))
            .await
            .map_err(transport("failed to create exchange"))?;
        self.send(exchange_subject(exchange), payload).await
    }

    async fn consume(&self, queue: &QueueSpec) -> Result<Deliveries, QueueError> {
        let stream = self.stream(queue).await?;
        let filter_subjects = match &queue.exchange {
            Some(exchange) => vec![exchange_subject(exchange), queue_subject(queue)],
            None => Vec::new(),
        };
        let consumer = stream
            .get_or_create_consumer(
                &queue.name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(queue.name.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    filter_subjects,
                    ..Default::default()
                },
            )
            .await
            .map_err(transport("failed to create consumer"))?;
        debug!(queue = %queue.name, "consumer ready");

        let messages = consumer
            .messages()
            .await
            .map_err(transport("failed to open message stream"))?;
        let deliveries = messages.map(|message| {
            message
                .map(|message| Box::new(NatsDelivery { message }) as Box<dyn Delivery>)
                .map_err(transport("failed to receive message"))
        });
        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.client
            .flush()
            .await
            .map_err(transport("failed to flush"))
    }
}

struct NatsDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn attempt(&self) -> u32 {
        self.message
            .info()
            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
            .unwrap_or(1)
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        self.message.ack().await.map_err(transport("failed to ack"))
    }

    async fn nack(self: Box<Self>, delay: Option<Duration>) -> Result<(), QueueError> {
        self.message
            .ack_with(AckKind::Nak(delay))
            .await
            .map_err(transport("failed to nak"))
    }
}

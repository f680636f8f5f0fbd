use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc};

use crate::{Broker, Connector, Deliveries, Delivery, QueueError, QueueSpec};

/// In-process broker.
///
/// Clones share the same queues, so the broker doubles as its own
/// [`Connector`]: every connection sees the same state, like clients of one
/// server. Consumers of the same queue compete for messages.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    queues: DashMap<String, Arc<QueueState>>,
    // exchange -> bound queue names
    bindings: DashMap<String, Vec<String>>,
    // queue or exchange name -> every payload published to it
    published: DashMap<String, Vec<Bytes>>,
}

struct QueueState {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    acked: AtomicUsize,
    nacked: AtomicUsize,
}

struct Message {
    payload: Bytes,
    attempt: u32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<QueueState> {
        self.inner
            .queues
            .entry(name.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                Arc::new(QueueState {
                    tx,
                    rx: Mutex::new(rx),
                    acked: AtomicUsize::new(0),
                    nacked: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    fn record(&self, target: &str, payload: &Bytes) {
        self.inner
            .published
            .entry(target.to_string())
            .or_default()
            .push(payload.clone());
    }

    /// Every payload published to a queue or broadcast to an exchange.
    pub fn published(&self, target: &str) -> Vec<Bytes> {
        self.inner
            .published
            .get(target)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Published payloads decoded as JSON. Undecodable payloads are skipped.
    pub fn published_json<T: DeserializeOwned>(&self, target: &str) -> Vec<T> {
        self.published(target)
            .iter()
            .filter_map(|payload| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// Number of acknowledged deliveries on a queue.
    pub fn acked(&self, queue: &str) -> usize {
        self.queue(queue).acked.load(Ordering::SeqCst)
    }

    /// Number of negatively acknowledged deliveries on a queue.
    pub fn nacked(&self, queue: &str) -> usize {
        self.queue(queue).nacked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare(&self, queue: &QueueSpec) -> Result<(), QueueError> {
        self.queue(&queue.name);
        if let Some(exchange) = &queue.exchange {
            let mut bound = self.inner.bindings.entry(exchange.to_string()).or_default();
            if !bound.iter().any(|name| name == &queue.name) {
                bound.push(queue.name.to_string());
            }
        }
        Ok(())
    }

    async fn publish(&self, queue: &QueueSpec, payload: Bytes) -> Result<(), QueueError> {
        self.declare(queue).await?;
        self.record(&queue.name, &payload);
        self.queue(&queue.name)
            .tx
            .send(Message {
                payload,
                attempt: 1,
            })
            .map_err(|_| QueueError::Closed)
    }

    async fn broadcast(&self, exchange: &str, payload: Bytes) -> Result<(), QueueError> {
        self.record(exchange, &payload);
        let bound = self
            .inner
            .bindings
            .get(exchange)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for name in bound {
            self.queue(&name)
                .tx
                .send(Message {
                    payload: payload.clone(),
                    attempt: 1,
                })
                .map_err(|_| QueueError::Closed)?;
        }
        Ok(())
    }

    async fn consume(&self, queue: &QueueSpec) -> Result<Deliveries, QueueError> {
        self.declare(queue).await?;
        let state = self.queue(&queue.name);
        let stream = futures::stream::unfold(state, |state| async move {
            let message = state.rx.lock().await.recv().await?;
            let delivery: Box<dyn Delivery> = Box::new(MemoryDelivery {
                message,
                queue: state.clone(),
            });
            Some((Ok(delivery), state))
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn Broker>, QueueError> {
        Ok(Arc::new(self.clone()))
    }
}

struct MemoryDelivery {
    message: Message,
    queue: Arc<QueueState>,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn attempt(&self) -> u32 {
        self.message.attempt
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        self.queue.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(self: Box<Self>, delay: Option<Duration>) -> Result<(), QueueError> {
        self.queue.nacked.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            payload: self.message.payload,
            attempt: self.message.attempt + 1,
        };
        match delay.filter(|d| !d.is_zero()) {
            Some(delay) => {
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = queue.tx.send(message);
                });
                Ok(())
            }
            None => self.queue.tx.send(message).map_err(|_| QueueError::Closed),
        }
    }
}

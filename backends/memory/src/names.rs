use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinline_core::{NamePublisher, NameSession, PrivateKey};
use tokio::sync::Mutex;

/// A record accepted by [`MemoryNamePublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub peer_id: String,
    pub transport_peer_id: String,
    pub cid: String,
    pub eol: DateTime<Utc>,
    pub ttl: Duration,
}

#[derive(Debug, Default)]
struct PublisherState {
    published: Mutex<Vec<Published>>,
    sessions: AtomicUsize,
    failing: AtomicBool,
}

/// Naming publisher that records what it would have published.
#[derive(Debug, Default)]
pub struct MemoryNamePublisher {
    state: Arc<PublisherState>,
}

impl MemoryNamePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<Published> {
        self.state.published.lock().await.clone()
    }
}

#[async_trait]
impl NamePublisher for MemoryNamePublisher {
    async fn session(&self, transport: &PrivateKey) -> anyhow::Result<Box<dyn NameSession>> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            transport_peer_id: transport.peer_id(),
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    transport_peer_id: String,
    state: Arc<PublisherState>,
}

#[async_trait]
impl NameSession for MemorySession {
    async fn publish(
        &self,
        key: &PrivateKey,
        cid: &str,
        eol: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        if self.state.failing.load(Ordering::SeqCst) {
            bail!("publish of {cid} failed");
        }
        self.state.published.lock().await.push(Published {
            peer_id: key.peer_id(),
            transport_peer_id: self.transport_peer_id.clone(),
            cid: cid.to_string(),
            eol,
            ttl,
        });
        Ok(())
    }
}

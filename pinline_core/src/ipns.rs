use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::network::Network;

/// A published naming record, keyed by the peer id of its signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpnsRecord {
    pub ipns_hash: String,
    pub ipfs_hash: String,
    pub key: String,
    pub network: Network,
    pub username: String,
    pub lifetime: Duration,
    pub ttl: Duration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`IpnsLedger::record_publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnsUpsert {
    Inserted,
    Updated,
}

impl IpnsRecord {
    /// Refreshes the pointer, owner and timers after a later publish. The
    /// key name stays the one the record was first published with.
    pub fn refresh(&mut self, newer: &IpnsRecord) {
        self.ipfs_hash = newer.ipfs_hash.clone();
        self.network = newer.network.clone();
        self.username = newer.username.clone();
        self.lifetime = newer.lifetime;
        self.ttl = newer.ttl;
        self.updated_at = newer.updated_at;
    }
}

/// Persistent store of naming records.
#[async_trait]
pub trait IpnsLedger: Send + Sync + 'static {
    /// Inserts the record or, when one exists for the same peer id,
    /// updates it in place.
    async fn record_publish(&self, record: IpnsRecord) -> anyhow::Result<IpnsUpsert>;

    async fn find(&self, ipns_hash: &str) -> anyhow::Result<Option<IpnsRecord>>;
}

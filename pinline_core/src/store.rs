use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cid::Cid;

use crate::keys::PrivateKey;

/// Where the content store for a job lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// The node serving the public network.
    Default,
    /// The API of a private network.
    Private { network: String, api_url: String },
}

/// Opens content store clients for an endpoint.
#[async_trait]
pub trait ContentStoreConnector: Send + Sync + 'static {
    /// Connects and verifies the store is reachable.
    async fn connect(&self, endpoint: &StoreEndpoint) -> anyhow::Result<Box<dyn ContentStore>>;
}

/// A content-addressed storage node.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn pin(&self, cid: &str) -> anyhow::Result<()>;

    async fn unpin(&self, cid: &str) -> anyhow::Result<()>;

    /// Adds `data` without pinning it and returns its content hash.
    async fn add(&self, data: Bytes) -> anyhow::Result<String>;
}

/// Cluster replication service.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Decodes `cid` into the cluster's native address form.
    fn decode_cid(&self, cid: &str) -> anyhow::Result<Cid> {
        Ok(Cid::try_from(cid)?)
    }

    async fn pin(&self, cid: &Cid) -> anyhow::Result<()>;
}

/// Staging area for uploads waiting to be added.
#[async_trait]
pub trait ObjectStaging: Send + Sync + 'static {
    async fn get_object(&self, bucket: &str, object: &str) -> anyhow::Result<Bytes>;

    async fn delete_object(&self, bucket: &str, object: &str) -> anyhow::Result<()>;
}

/// Creates short-lived naming publishers.
#[async_trait]
pub trait NamePublisher: Send + Sync + 'static {
    /// Starts a publishing session whose transport identity is `transport`.
    async fn session(&self, transport: &PrivateKey) -> anyhow::Result<Box<dyn NameSession>>;
}

/// One naming publisher, dropped after a single job.
#[async_trait]
pub trait NameSession: Send + Sync {
    /// Publishes `cid` under `key`, valid until `eol` and cached for `ttl`.
    async fn publish(
        &self,
        key: &PrivateKey,
        cid: &str,
        eol: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<()>;
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use dashmap::{DashMap, DashSet};
use multihash_codetable::{Code, MultihashDigest};
use pinline_core::{ClusterClient, ContentStore, ContentStoreConnector, StoreEndpoint};

const RAW_CODEC: u64 = 0x55;

/// Label used for the default endpoint in [`MemoryNode`] accessors.
pub const DEFAULT_ENDPOINT: &str = "default";

fn label(endpoint: &StoreEndpoint) -> String {
    match endpoint {
        StoreEndpoint::Default => DEFAULT_ENDPOINT.to_string(),
        StoreEndpoint::Private { network, .. } => network.clone(),
    }
}

#[derive(Debug, Default)]
struct NodeState {
    // endpoint label -> every cid pinned, in call order
    pins: DashMap<String, Vec<String>>,
    unpins: DashMap<String, Vec<String>>,
    blobs: DashMap<String, Bytes>,
    unreachable: DashSet<String>,
    fail_pins: AtomicBool,
    fail_adds: AtomicBool,
    fail_unpins: AtomicBool,
}

/// Content store nodes for every endpoint, sharing one recorder.
#[derive(Debug, Clone, Default)]
pub struct MemoryNode {
    state: Arc<NodeState>,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes connecting to `endpoint_label` fail.
    pub fn set_unreachable(&self, endpoint_label: &str) {
        self.state.unreachable.insert(endpoint_label.to_string());
    }

    pub fn set_fail_pins(&self, fail: bool) {
        self.state.fail_pins.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_adds(&self, fail: bool) {
        self.state.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unpins(&self, fail: bool) {
        self.state.fail_unpins.store(fail, Ordering::SeqCst);
    }

    /// Cids pinned on an endpoint, one entry per call.
    pub fn pins(&self, endpoint_label: &str) -> Vec<String> {
        self.state
            .pins
            .get(endpoint_label)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    pub fn unpins(&self, endpoint_label: &str) -> Vec<String> {
        self.state
            .unpins
            .get(endpoint_label)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    pub fn total_pin_calls(&self) -> usize {
        self.state.pins.iter().map(|p| p.value().len()).sum()
    }

    pub fn blob(&self, cid: &str) -> Option<Bytes> {
        self.state.blobs.get(cid).map(|b| b.value().clone())
    }
}

#[async_trait]
impl ContentStoreConnector for MemoryNode {
    async fn connect(&self, endpoint: &StoreEndpoint) -> anyhow::Result<Box<dyn ContentStore>> {
        let label = label(endpoint);
        if self.state.unreachable.contains(&label) {
            bail!("node {label} is unreachable");
        }
        Ok(Box::new(MemoryNodeClient {
            label,
            state: self.state.clone(),
        }))
    }
}

struct MemoryNodeClient {
    label: String,
    state: Arc<NodeState>,
}

#[async_trait]
impl ContentStore for MemoryNodeClient {
    async fn pin(&self, cid: &str) -> anyhow::Result<()> {
        if self.state.fail_pins.load(Ordering::SeqCst) {
            bail!("pin of {cid} failed");
        }
        self.state
            .pins
            .entry(self.label.clone())
            .or_default()
            .push(cid.to_string());
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> anyhow::Result<()> {
        if self.state.fail_unpins.load(Ordering::SeqCst) {
            bail!("unpin of {cid} failed");
        }
        self.state
            .unpins
            .entry(self.label.clone())
            .or_default()
            .push(cid.to_string());
        Ok(())
    }

    /// Returns a CIDv1 with the raw codec over the sha2-256 of `data`.
    async fn add(&self, data: Bytes) -> anyhow::Result<String> {
        if self.state.fail_adds.load(Ordering::SeqCst) {
            bail!("add failed");
        }
        let cid = Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(&data)).to_string();
        self.state.blobs.insert(cid.clone(), data);
        Ok(cid)
    }
}

/// Cluster replication recorder.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    pins: DashMap<String, usize>,
    failing: AtomicBool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of pin requests received for `cid`.
    pub fn pin_calls(&self, cid: &str) -> usize {
        self.pins.get(cid).map(|n| *n).unwrap_or_default()
    }

    pub fn total_pin_calls(&self) -> usize {
        self.pins.iter().map(|n| *n.value()).sum()
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn pin(&self, cid: &Cid) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("cluster pin of {cid} failed");
        }
        *self.pins.entry(cid.to_string()).or_default() += 1;
        Ok(())
    }
}

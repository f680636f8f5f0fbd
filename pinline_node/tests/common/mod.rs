#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use pinline_backend_memory::{
    MemoryAccounts, MemoryCluster, MemoryKeyStore, MemoryLedger, MemoryMailer,
    MemoryNamePublisher, MemoryNode, MemoryStaging,
};
use pinline_node::{FailurePolicy, Pipeline, Services};
use pinline_queue::{Broker, MemoryBroker, Publisher, QueueSpec};
use serde::Serialize;

/// A pipeline wired to in-memory collaborators and an in-memory broker.
pub struct Harness {
    pub broker: MemoryBroker,
    pub accounts: Arc<MemoryAccounts>,
    pub node: MemoryNode,
    pub cluster: Arc<MemoryCluster>,
    pub staging: Arc<MemoryStaging>,
    pub names: Arc<MemoryNamePublisher>,
    pub ledger: Arc<MemoryLedger>,
    pub keys: Arc<MemoryKeyStore>,
    pub mailer: Arc<MemoryMailer>,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        let accounts = Arc::new(MemoryAccounts::new());
        let node = MemoryNode::new();
        let cluster = Arc::new(MemoryCluster::new());
        let staging = Arc::new(MemoryStaging::new());
        let names = Arc::new(MemoryNamePublisher::new());
        let ledger = Arc::new(MemoryLedger::new());
        let keys = Arc::new(MemoryKeyStore::new());
        let mailer = Arc::new(MemoryMailer::new());

        let services = Services {
            store: Arc::new(node.clone()),
            cluster: cluster.clone(),
            staging: staging.clone(),
            names: names.clone(),
            uploads: ledger.clone(),
            ipns: ledger.clone(),
            keys: keys.clone(),
            access: accounts.clone(),
            networks: accounts.clone(),
            users: accounts.clone(),
            credits: accounts.clone(),
            mailer: mailer.clone(),
        };

        Self {
            broker: MemoryBroker::new(),
            accounts,
            node,
            cluster,
            staging,
            names,
            ledger,
            keys,
            mailer,
            services,
        }
    }

    pub fn pipeline(&self, policy: FailurePolicy) -> Pipeline {
        Pipeline::new(
            self.services.clone(),
            Arc::new(self.broker.clone()),
            policy,
        )
    }

    pub async fn send<T: Serialize + Sync>(&self, queue: &QueueSpec, job: &T) -> Result<()> {
        Publisher::new(Arc::new(self.broker.clone()))
            .publish(queue, job)
            .await?;
        Ok(())
    }

    pub async fn send_raw(&self, queue: &QueueSpec, payload: &'static [u8]) -> Result<()> {
        self.broker.publish(queue, payload.into()).await?;
        Ok(())
    }

    /// Waits until `queue` has seen `count` acknowledgments.
    pub async fn acked(&self, queue: &QueueSpec, count: usize) -> Result<()> {
        let waited = tokio::time::timeout(Duration::from_secs(10), async {
            while self.broker.acked(&queue.name) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if waited.is_err() {
            bail!(
                "{} acked {} of {count} deliveries",
                queue.name,
                self.broker.acked(&queue.name)
            );
        }
        Ok(())
    }
}

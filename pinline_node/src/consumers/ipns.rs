use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use pinline_core::jobs::IpnsPublishJob;
use pinline_core::{
    IpnsLedger, IpnsRecord, KeySpec, KeyStore, NamePublisher, Operation, PrivateKey,
};
use pinline_queue::QueueSpec;
use tracing::info;

use crate::gate::AccessGate;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Publishes naming records for keys held in the key store.
pub struct IpnsConsumer {
    gate: AccessGate,
    names: Arc<dyn NamePublisher>,
    keys: Arc<dyn KeyStore>,
    ipns: Arc<dyn IpnsLedger>,
    /// Identifies this consumer's publisher sessions. Never signs records.
    transport: PrivateKey,
}

impl IpnsConsumer {
    pub fn new(services: &Services) -> anyhow::Result<Self> {
        Ok(Self {
            gate: AccessGate::new(services),
            names: services.names.clone(),
            keys: services.keys.clone(),
            ipns: services.ipns.clone(),
            transport: PrivateKey::generate(KeySpec::ED25519)?,
        })
    }
}

#[async_trait]
impl Consumer for IpnsConsumer {
    type Job = IpnsPublishJob;

    const QUEUE: QueueSpec = QueueSpec::IPNS_ENTRY;
    const OPERATION: Operation = Operation::IpnsPublish;

    async fn handle(&self, _ctx: &JobContext, job: &IpnsPublishJob) -> Result<(), Failure> {
        self.gate.require_public(&job.network_name)?;

        let session = self
            .names
            .session(&self.transport)
            .await
            .map_err(|e| Failure::dependency("publisher setup", e))?;
        let key = self
            .keys
            .get_private_key(&job.key)
            .await
            .map_err(|e| Failure::dependency("key retrieval", e))?;

        let lifetime = TimeDelta::from_std(job.lifetime)
            .map_err(|e| Failure::invalid("lifetime", e))?;
        let eol = Utc::now()
            .checked_add_signed(lifetime)
            .ok_or_else(|| Failure::invalid("lifetime", anyhow::anyhow!("end of life out of range")))?;

        info!(user = %job.username, key = %job.key, cid = %job.cid, %eol, "publishing naming record");
        session
            .publish(&key, &job.cid, eol, job.ttl)
            .await
            .map_err(|e| Failure::dependency("publish", e))?;

        let ipns_hash = key.peer_id();
        let now = Utc::now();
        let record = IpnsRecord {
            ipns_hash: ipns_hash.clone(),
            ipfs_hash: job.cid.clone(),
            key: job.key.clone(),
            network: job.network_name.clone(),
            username: job.username.clone(),
            lifetime: job.lifetime,
            ttl: job.ttl,
            created_at: now,
            updated_at: now,
        };
        let outcome = self
            .ipns
            .record_publish(record)
            .await
            .map_err(|e| Failure::dependency("ipns ledger", e).committed())?;
        info!(user = %job.username, ipns = %ipns_hash, ?outcome, "naming record stored");
        Ok(())
    }
}

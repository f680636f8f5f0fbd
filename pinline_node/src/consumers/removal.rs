use async_trait::async_trait;
use pinline_core::Operation;
use pinline_core::jobs::PinRemovalJob;
use pinline_queue::QueueSpec;
use tracing::info;

use crate::gate::AccessGate;
use crate::notify::PIN_REMOVAL_FAILED_SUBJECT;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Unpins content. Upload records stay untouched.
pub struct PinRemovalConsumer {
    gate: AccessGate,
}

impl PinRemovalConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            gate: AccessGate::new(services),
        }
    }
}

#[async_trait]
impl Consumer for PinRemovalConsumer {
    type Job = PinRemovalJob;

    const QUEUE: QueueSpec = QueueSpec::PIN_REMOVAL;
    const OPERATION: Operation = Operation::PinRemoval;

    async fn handle(&self, _ctx: &JobContext, job: &PinRemovalJob) -> Result<(), Failure> {
        let endpoint = self.gate.authorize(&job.username, &job.network_name).await?;
        let store = self.gate.connect(&endpoint).await?;

        info!(user = %job.username, network = %job.network_name, cid = %job.content_hash, "removing pin");
        store.unpin(&job.content_hash).await.map_err(|e| {
            let content = format!(
                "Pin removal failed for ipfs network {} due to reason {e:#}",
                job.network_name
            );
            Failure::dependency("unpin", e).with_notice(PIN_REMOVAL_FAILED_SUBJECT, content)
        })?;
        Ok(())
    }
}

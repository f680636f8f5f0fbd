use std::sync::Arc;

use async_trait::async_trait;
use pinline_core::jobs::{ClusterPinJob, PinJob};
use pinline_core::{Operation, UploadKind, UploadLedger, UploadSubmission};
use pinline_queue::QueueSpec;
use tracing::{error, info};

use crate::gate::AccessGate;
use crate::notify::PIN_FAILED_SUBJECT;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Pins content on the user's network, then hands it to cluster
/// replication and records the upload.
pub struct PinConsumer {
    gate: AccessGate,
    uploads: Arc<dyn UploadLedger>,
}

impl PinConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            gate: AccessGate::new(services),
            uploads: services.uploads.clone(),
        }
    }
}

#[async_trait]
impl Consumer for PinConsumer {
    type Job = PinJob;

    const QUEUE: QueueSpec = QueueSpec::PIN;
    const OPERATION: Operation = Operation::Pin;

    async fn handle(&self, ctx: &JobContext, job: &PinJob) -> Result<(), Failure> {
        let endpoint = self.gate.authorize(&job.username, &job.network_name).await?;
        let store = self.gate.connect(&endpoint).await?;

        info!(user = %job.username, network = %job.network_name, cid = %job.cid, "pinning content");
        store.pin(&job.cid).await.map_err(|e| {
            let content = format!(
                "Pin of {} on IPFS network {} failed: {e:#}",
                job.cid, job.network_name
            );
            Failure::dependency("pin", e).with_notice(PIN_FAILED_SUBJECT, content)
        })?;

        let replicate = ClusterPinJob::from(job);
        if let Err(e) = ctx
            .publisher
            .publish(&QueueSpec::CLUSTER_PIN, &replicate)
            .await
        {
            error!(user = %job.username, cid = %job.cid, error = %e, "failed to publish cluster pin request");
        }

        let submission = UploadSubmission::new(
            &job.cid,
            job.network_name.clone(),
            UploadKind::Pin,
            &job.username,
            job.hold_time_in_months,
        );
        self.uploads
            .upsert(submission)
            .await
            .map_err(|e| Failure::dependency("upload ledger", e).committed())?;
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use pinline_core::jobs::ClusterPinJob;
use pinline_core::{ClusterClient, Operation, UploadKind, UploadLedger, UploadSubmission};
use pinline_queue::QueueSpec;
use tracing::info;

use crate::gate::AccessGate;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Replicates public pins across the cluster.
pub struct ClusterPinConsumer {
    gate: AccessGate,
    cluster: Arc<dyn ClusterClient>,
    uploads: Arc<dyn UploadLedger>,
}

impl ClusterPinConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            gate: AccessGate::new(services),
            cluster: services.cluster.clone(),
            uploads: services.uploads.clone(),
        }
    }
}

#[async_trait]
impl Consumer for ClusterPinConsumer {
    type Job = ClusterPinJob;

    const QUEUE: QueueSpec = QueueSpec::CLUSTER_PIN;
    const OPERATION: Operation = Operation::ClusterPin;

    async fn handle(&self, _ctx: &JobContext, job: &ClusterPinJob) -> Result<(), Failure> {
        self.gate.require_public(&job.network_name)?;

        let cid = self
            .cluster
            .decode_cid(&job.cid)
            .map_err(|e| Failure::invalid("cid decode", e))?;

        info!(user = %job.username, cid = %job.cid, "requesting cluster pin");
        self.cluster
            .pin(&cid)
            .await
            .map_err(|e| Failure::dependency("cluster pin", e))?;

        let submission = UploadSubmission::new(
            &job.cid,
            job.network_name.clone(),
            UploadKind::PinCluster,
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

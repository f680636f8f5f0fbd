use std::sync::Arc;

use async_trait::async_trait;
use pinline_core::jobs::{FileJob, PinJob};
use pinline_core::{ObjectStaging, Operation, UploadKind, UploadLedger, UploadSubmission};
use pinline_queue::{PIN_EXCHANGE, QueueSpec};
use tracing::{error, info};

use crate::gate::AccessGate;
use crate::notify::FILE_FAILED_SUBJECT;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Moves a staged upload into the content store.
pub struct FileConsumer {
    gate: AccessGate,
    staging: Arc<dyn ObjectStaging>,
    uploads: Arc<dyn UploadLedger>,
}

impl FileConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            gate: AccessGate::new(services),
            staging: services.staging.clone(),
            uploads: services.uploads.clone(),
        }
    }
}

#[async_trait]
impl Consumer for FileConsumer {
    type Job = FileJob;

    const QUEUE: QueueSpec = QueueSpec::FILE;
    const OPERATION: Operation = Operation::FileAdd;

    async fn handle(&self, ctx: &JobContext, job: &FileJob) -> Result<(), Failure> {
        let endpoint = self.gate.authorize(&job.username, &job.network_name).await?;
        let store = self.gate.connect(&endpoint).await?;

        let data = self
            .staging
            .get_object(&job.bucket_name, &job.object_name)
            .await
            .map_err(|e| Failure::dependency("staging retrieval", e))?;

        info!(user = %job.username, network = %job.network_name, object = %job.object_name, size = data.len(), "adding file");
        let hash = store.add(data).await.map_err(|e| {
            let content = format!(
                "Upload of {} to IPFS network {} failed",
                job.object_name, job.network_name
            );
            Failure::dependency("add", e).with_notice(FILE_FAILED_SUBJECT, content)
        })?;
        info!(user = %job.username, network = %job.network_name, cid = %hash, "file added");

        let hold_time_in_months = job.hold_time_months();
        let pin = PinJob {
            cid: hash.clone(),
            network_name: job.network_name.clone(),
            username: job.username.clone(),
            hold_time_in_months,
            credit_cost: 0.0,
        };
        if let Err(e) = ctx.publisher.broadcast(PIN_EXCHANGE, &pin).await {
            error!(user = %job.username, cid = %hash, error = %e, "failed to publish pin request");
        }

        let submission = UploadSubmission::new(
            &hash,
            job.network_name.clone(),
            UploadKind::File,
            &job.username,
            hold_time_in_months,
        );
        self.uploads
            .upsert(submission)
            .await
            .map_err(|e| Failure::dependency("upload ledger", e).committed())?;

        self.staging
            .delete_object(&job.bucket_name, &job.object_name)
            .await
            .map_err(|e| Failure::dependency("staging cleanup", e).committed())?;
        Ok(())
    }
}

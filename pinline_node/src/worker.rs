use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pinline_core::{Billing, Operation};
use pinline_queue::{Broker, DeadLetter, Delivery, Publisher, QueueError, QueueSpec};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compensate::Compensation;
use crate::config::FailurePolicy;
use crate::outcome::Failure;

/// Per-worker state handed to every handler call.
pub struct JobContext {
    /// Publishes follow-on jobs over the worker's own connection.
    pub publisher: Publisher,
    pub worker: usize,
}

/// Handles the jobs of one queue.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    type Job: DeserializeOwned + Billing + Send + Sync;

    const QUEUE: QueueSpec;
    const OPERATION: Operation;

    async fn handle(&self, ctx: &JobContext, job: &Self::Job) -> Result<(), Failure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Redeliver(Duration),
}

/// Reads one queue over one broker connection, a message at a time.
pub struct Worker<C: Consumer> {
    pub(crate) id: usize,
    pub(crate) consumer: Arc<C>,
    pub(crate) compensation: Compensation,
    pub(crate) policy: FailurePolicy,
    pub(crate) broker: Arc<dyn Broker>,
}

impl<C: Consumer> Worker<C> {
    /// Runs until `cancel` fires or the delivery stream ends. The message in
    /// flight when cancellation happens is finished first.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), QueueError> {
        let queue = C::QUEUE;
        let ctx = JobContext {
            publisher: Publisher::new(self.broker.clone()),
            worker: self.id,
        };
        let mut deliveries = self.broker.consume(&queue).await?;
        info!(queue = %queue.name, worker = self.id, "worker started");

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = deliveries.next() => next,
            };
            match next {
                Some(Ok(delivery)) => self.process(&ctx, delivery).await,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        drop(deliveries);
        if let Err(e) = self.broker.close().await {
            warn!(queue = %queue.name, worker = self.id, error = %e, "failed to close connection");
        }
        info!(queue = %queue.name, worker = self.id, "worker stopped");
        result
    }

    /// Handles one delivery and settles it exactly once.
    pub async fn process(&self, ctx: &JobContext, delivery: Box<dyn Delivery>) {
        let disposition = self
            .dispose(ctx, delivery.payload(), delivery.attempt())
            .await;
        let settled = match disposition {
            Disposition::Ack => delivery.ack().await,
            Disposition::Redeliver(delay) => delivery.nack(Some(delay)).await,
        };
        if let Err(e) = settled {
            error!(queue = %C::QUEUE.name, worker = self.id, error = %e, "failed to settle delivery");
        }
    }

    async fn dispose(&self, ctx: &JobContext, payload: &[u8], attempt: u32) -> Disposition {
        let queue = C::QUEUE;
        let job: C::Job = match serde_json::from_slice(payload) {
            Ok(job) => job,
            Err(e) => {
                error!(queue = %queue.name, worker = self.id, error = %e, "failed to unmarshal message");
                return Disposition::Ack;
            }
        };
        let user = job.username().to_string();
        debug!(queue = %queue.name, worker = self.id, user = %user, attempt, "detected new message");

        let failure = match self.consumer.handle(ctx, &job).await {
            Ok(()) => {
                info!(queue = %queue.name, worker = self.id, user = %user, "job completed");
                return Disposition::Ack;
            }
            Err(failure) => failure,
        };

        // Committed work must not be repeated by a redelivery.
        let retry = if failure.committed {
            None
        } else {
            self.policy.retry_delay(failure.kind, attempt)
        };
        if let Some(delay) = retry {
            warn!(
                queue = %queue.name, worker = self.id, user = %user, attempt,
                stage = failure.stage, error = %failure.error,
                "job failed, redelivering in {delay:?}"
            );
            return Disposition::Redeliver(delay);
        }

        error!(
            queue = %queue.name, worker = self.id, user = %user, attempt,
            kind = ?failure.kind, stage = failure.stage, error = %failure.error,
            "job failed"
        );
        let compensated = self
            .compensation
            .settle(&ctx.publisher, C::OPERATION, &job, &failure)
            .await;
        debug!(queue = %queue.name, worker = self.id, user = %user, ?compensated, "failure compensated");

        if self.policy.dead_letters() && failure.kind.is_retryable() && !failure.committed {
            let letter = DeadLetter::new(&queue, payload, failure.to_string(), attempt);
            if let Err(e) = ctx.publisher.publish(&queue.dead_letter(), &letter).await {
                error!(queue = %queue.name, worker = self.id, error = %e, "failed to dead-letter job");
            }
        }
        Disposition::Ack
    }
}

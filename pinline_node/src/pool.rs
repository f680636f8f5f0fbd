use std::sync::Arc;

use pinline_queue::{Connector, QueueError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::compensate::Compensation;
use crate::config::FailurePolicy;
use crate::worker::{Consumer, Worker};

/// N workers of one consumer, each on its own broker connection.
pub struct WorkerPool {
    queue: String,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    /// Connects and starts `workers` workers. If any connection fails the
    /// workers already started are shut down again.
    pub async fn start<C: Consumer>(
        consumer: C,
        connector: Arc<dyn Connector>,
        compensation: Compensation,
        policy: FailurePolicy,
        workers: usize,
    ) -> Result<Self, QueueError> {
        let queue = C::QUEUE;
        let pool = Self {
            queue: queue.name.to_string(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        let consumer = Arc::new(consumer);

        for id in 0..workers.max(1) {
            let connected = async {
                let broker = connector.connect().await?;
                broker.declare(&queue).await?;
                Ok::<_, QueueError>(broker)
            };
            let broker = match connected.await {
                Ok(broker) => broker,
                Err(e) => {
                    error!(queue = %queue.name, worker = id, error = %e, "failed to connect worker");
                    pool.shutdown().await;
                    return Err(e);
                }
            };

            let worker = Worker {
                id,
                consumer: consumer.clone(),
                compensation: compensation.clone(),
                policy,
                broker,
            };
            let cancel = pool.cancel.child_token();
            pool.tracker.spawn(async move {
                if let Err(e) = worker.run(cancel).await {
                    error!(queue = %C::QUEUE.name, worker = id, error = %e, "worker exited with error");
                }
            });
        }
        pool.tracker.close();
        info!(queue = %pool.queue, workers = pool.tracker.len(), "worker pool started");
        Ok(pool)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Workers still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every worker has stopped on its own.
    pub async fn wait(&self) {
        self.tracker.wait().await
    }

    /// Cancels every worker and waits for their in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(queue = %self.queue, "worker pool stopped");
    }
}

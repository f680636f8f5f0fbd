//! Queue consumers for the pinline pipeline.
//!
//! Each [`Consumer`] handles the jobs of one queue. A [`WorkerPool`] runs
//! N workers of a consumer, every worker on its own broker connection.
//! Handlers report failures as [`Failure`] values and the worker applies
//! the configured [`FailurePolicy`], refunds and notifications.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use pinline_queue::{Connector, NatsConnector, QueueSpec};
use tracing::{info, warn};

pub mod compensate;
pub mod config;
pub mod consumers;
pub mod gate;
pub mod notify;
pub mod outcome;
pub mod pool;
pub mod services;
pub mod worker;

#[cfg(test)]
mod testing;

pub use compensate::{Compensated, Compensation};
pub use config::{FailurePolicy, PipelineConfig};
pub use gate::AccessGate;
pub use outcome::{Failure, Notice};
pub use pool::WorkerPool;
pub use services::Services;
pub use worker::{Consumer, JobContext, Worker};

use consumers::{
    ClusterPinConsumer, FileConsumer, IpnsConsumer, KeyCreationConsumer, MailConsumer,
    PinConsumer, PinRemovalConsumer,
};

/// The queues a pipeline process can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Pin,
    File,
    ClusterPin,
    IpnsEntry,
    KeyCreation,
    EmailSend,
    PinRemoval,
}

impl QueueKind {
    pub const ALL: [QueueKind; 7] = [
        QueueKind::Pin,
        QueueKind::File,
        QueueKind::ClusterPin,
        QueueKind::IpnsEntry,
        QueueKind::KeyCreation,
        QueueKind::EmailSend,
        QueueKind::PinRemoval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Pin => "pin",
            QueueKind::File => "file",
            QueueKind::ClusterPin => "cluster-pin",
            QueueKind::IpnsEntry => "ipns-entry",
            QueueKind::KeyCreation => "key-creation",
            QueueKind::EmailSend => "email-send",
            QueueKind::PinRemoval => "pin-removal",
        }
    }

    pub fn queue(&self) -> QueueSpec {
        match self {
            QueueKind::Pin => QueueSpec::PIN,
            QueueKind::File => QueueSpec::FILE,
            QueueKind::ClusterPin => QueueSpec::CLUSTER_PIN,
            QueueKind::IpnsEntry => QueueSpec::IPNS_ENTRY,
            QueueKind::KeyCreation => QueueSpec::KEY_CREATION,
            QueueKind::EmailSend => QueueSpec::EMAIL_SEND,
            QueueKind::PinRemoval => QueueSpec::PIN_REMOVAL,
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown queue '{0}'")]
pub struct UnknownQueue(String);

impl FromStr for QueueKind {
    type Err = UnknownQueue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownQueue(s.to_string()))
    }
}

/// Starts worker pools against one set of services and one broker.
#[derive(Clone)]
pub struct Pipeline {
    services: Services,
    connector: Arc<dyn Connector>,
    policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(services: Services, connector: Arc<dyn Connector>, policy: FailurePolicy) -> Self {
        Self {
            services,
            connector,
            policy,
        }
    }

    pub async fn spawn(&self, kind: QueueKind, workers: usize) -> anyhow::Result<WorkerPool> {
        let services = &self.services;
        let pool = match kind {
            QueueKind::Pin => self.spawn_consumer(PinConsumer::new(services), workers).await,
            QueueKind::File => self.spawn_consumer(FileConsumer::new(services), workers).await,
            QueueKind::ClusterPin => {
                self.spawn_consumer(ClusterPinConsumer::new(services), workers)
                    .await
            }
            QueueKind::IpnsEntry => {
                self.spawn_consumer(IpnsConsumer::new(services)?, workers)
                    .await
            }
            QueueKind::KeyCreation => {
                self.spawn_consumer(KeyCreationConsumer::new(services), workers)
                    .await
            }
            QueueKind::EmailSend => self.spawn_consumer(MailConsumer::new(services), workers).await,
            QueueKind::PinRemoval => {
                self.spawn_consumer(PinRemovalConsumer::new(services), workers)
                    .await
            }
        };
        pool.with_context(|| format!("starting {kind} workers"))
    }

    pub async fn spawn_consumer<C: Consumer>(
        &self,
        consumer: C,
        workers: usize,
    ) -> Result<WorkerPool, pinline_queue::QueueError> {
        WorkerPool::start(
            consumer,
            self.connector.clone(),
            Compensation::new(&self.services),
            self.policy,
            workers,
        )
        .await
    }
}

/// Serves one queue until Ctrl-C, then drains the workers.
pub async fn run_queue(config: PipelineConfig, kind: QueueKind, workers: usize) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let connector = Arc::new(NatsConnector::new(
        config.queue.url.as_str(),
        config.queue.connection_name.as_str(),
    ));
    let pipeline = Pipeline::new(services, connector, config.pipeline.failure_policy);
    let pool = pipeline.spawn(kind, workers).await?;
    info!(queue = %kind, workers, "serving queue, press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.context("listening for Ctrl-C")?,
        _ = pool.wait() => warn!(queue = %kind, "every worker stopped"),
    }
    pool.shutdown().await;
    Ok(())
}

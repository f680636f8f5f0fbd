use std::time::Duration;

use pinline_backend_ipfs::ClusterConfig;
use pinline_backend_s3::S3StagingConfig;
use pinline_backend_sendgrid::SendGridConfig;
use pinline_core::FailureKind;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub queue: QueueConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    pub database: DatabaseConfig,
    pub ipfs: IpfsConfig,
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    #[serde(default)]
    pub staging: Option<S3StagingConfig>,
    #[serde(default)]
    pub mail: Option<SendGridConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// NATS server url, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
}

fn default_connection_name() -> String {
    "pinline".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Workers started per queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            failure_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Directory holding the redb database file.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpfsConfig {
    /// RPC url of the public IPFS node.
    pub api_url: String,
}

/// What a worker does with a failed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Acknowledge every failed job straight away.
    #[default]
    Drop,
    /// Redeliver retryable failures with exponential backoff, then
    /// dead-letter them once `max_deliveries` is reached.
    Retry { max_deliveries: u32, backoff_ms: u64 },
}

const MAX_BACKOFF_DOUBLINGS: u32 = 16;

impl FailurePolicy {
    /// Delay before redelivering a job that failed on delivery `attempt`,
    /// or `None` if the failure is terminal.
    pub fn retry_delay(&self, kind: FailureKind, attempt: u32) -> Option<Duration> {
        match *self {
            FailurePolicy::Drop => None,
            FailurePolicy::Retry {
                max_deliveries,
                backoff_ms,
            } => {
                if !kind.is_retryable() || attempt >= max_deliveries {
                    return None;
                }
                let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
                Some(Duration::from_millis(
                    backoff_ms.saturating_mul(1u64 << doublings),
                ))
            }
        }
    }

    /// Whether exhausted retryable failures are copied to a dead-letter queue.
    pub fn dead_letters(&self) -> bool {
        matches!(self, FailurePolicy::Retry { .. })
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use pinline_core::jobs::KeyCreationJob;
use pinline_core::{KeySpec, KeyStore, Operation, UserDirectory};
use pinline_queue::QueueSpec;
use tracing::info;

use crate::gate::AccessGate;
use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

pub struct KeyCreationConsumer {
    gate: AccessGate,
    keys: Arc<dyn KeyStore>,
    users: Arc<dyn UserDirectory>,
}

impl KeyCreationConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            gate: AccessGate::new(services),
            keys: services.keys.clone(),
            users: services.users.clone(),
        }
    }
}

/// Keys are stored under the owner's name so labels never collide
/// between users.
pub fn key_name(username: &str, label: &str) -> String {
    format!("{username}-{label}")
}

#[async_trait]
impl Consumer for KeyCreationConsumer {
    type Job = KeyCreationJob;

    const QUEUE: QueueSpec = QueueSpec::KEY_CREATION;
    const OPERATION: Operation = Operation::KeyCreation;

    async fn handle(&self, _ctx: &JobContext, job: &KeyCreationJob) -> Result<(), Failure> {
        self.gate.require_public(&job.network_name)?;
        let spec = KeySpec::parse(&job.key_type, job.size)
            .map_err(|e| Failure::invalid("key spec", e))?;

        let name = key_name(&job.username, &job.name);
        info!(user = %job.username, key = %name, bits = spec.bits, "creating key");
        let key = self
            .keys
            .create_key(&name, spec)
            .await
            .map_err(|e| Failure::dependency("key creation", e))?;

        let peer_id = key.peer_id();
        self.users
            .add_key(&job.username, &name, &peer_id)
            .await
            .map_err(|e| Failure::dependency("user key registration", e).committed())?;
        info!(user = %job.username, key = %name, peer_id = %peer_id, "key created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_is_owner_scoped() {
        assert_eq!(key_name("alice", "main"), "alice-main");
    }
}

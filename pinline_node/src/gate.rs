use std::sync::Arc;

use anyhow::anyhow;
use pinline_core::{
    AccessControl, ContentStore, ContentStoreConnector, FailureKind, Network, NetworkDirectory,
    StoreEndpoint,
};
use tracing::{debug, warn};

use crate::notify::{INITIALIZATION_FAILED_SUBJECT, UNAUTHORIZED_SUBJECT};
use crate::outcome::Failure;
use crate::services::Services;

/// The one place that decides which content store a user may reach.
#[derive(Clone)]
pub struct AccessGate {
    access: Arc<dyn AccessControl>,
    networks: Arc<dyn NetworkDirectory>,
    store: Arc<dyn ContentStoreConnector>,
}

impl AccessGate {
    pub fn new(services: &Services) -> Self {
        Self {
            access: services.access.clone(),
            networks: services.networks.clone(),
            store: services.store.clone(),
        }
    }

    /// Resolves the store endpoint `username` may use on `network`.
    pub async fn authorize(
        &self,
        username: &str,
        network: &Network,
    ) -> Result<StoreEndpoint, Failure> {
        let name = match network {
            Network::Public => return Ok(StoreEndpoint::Default),
            Network::Named(name) => name,
        };

        let allowed = self
            .access
            .can_access(username, name)
            .await
            .map_err(|e| {
                let content =
                    format!("Failed to verify access to IPFS private network {name}: {e:#}");
                Failure::new(FailureKind::AccessCheck, "access check", e)
                    .with_notice(INITIALIZATION_FAILED_SUBJECT, content)
            })?;
        if !allowed {
            warn!(user = username, network = %name, "user does not have access to private network");
            return Err(Failure::new(
                FailureKind::Unauthorized,
                "authorization",
                anyhow!("{username} may not use network {name}"),
            )
            .with_notice(
                UNAUTHORIZED_SUBJECT,
                format!("Unauthorized access to IPFS private network {name}"),
            ));
        }

        let api_url = self.networks.api_url(name).await.map_err(|e| {
            let content = format!("Failed to look up IPFS network {name}: {e:#}");
            Failure::dependency("network lookup", e)
                .with_notice(INITIALIZATION_FAILED_SUBJECT, content)
        })?;
        debug!(user = username, network = %name, api = %api_url, "resolved private network");
        Ok(StoreEndpoint::Private {
            network: name.clone(),
            api_url,
        })
    }

    /// Fails with `Unsupported` for anything but the public network.
    pub fn require_public(&self, network: &Network) -> Result<(), Failure> {
        if network.is_public() {
            return Ok(());
        }
        Err(Failure::new(
            FailureKind::Unsupported,
            "network check",
            anyhow!("network {network} is not supported"),
        ))
    }

    /// Connects to the content store behind an authorized endpoint.
    pub async fn connect(&self, endpoint: &StoreEndpoint) -> Result<Box<dyn ContentStore>, Failure> {
        self.store.connect(endpoint).await.map_err(|e| {
            let content = format!("Connection to IPFS failed due to the following error {e:#}");
            Failure::dependency("store connection", e)
                .with_notice(INITIALIZATION_FAILED_SUBJECT, content)
        })
    }
}

use async_trait::async_trait;
use cid::Cid;
use pinline_core::ClusterClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::read_success;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub api_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// IPFS Cluster REST API client.
#[derive(Debug, Clone)]
pub struct ClusterRestClient {
    config: ClusterConfig,
    http: reqwest::Client,
}

impl ClusterRestClient {
    pub fn new(mut config: ClusterConfig) -> Self {
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ClusterClient for ClusterRestClient {
    async fn pin(&self, cid: &Cid) -> anyhow::Result<()> {
        let mut request = self
            .http
            .post(format!("{}/pins/{cid}", self.config.api_url));
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }
        read_success(request.send().await?).await?;
        debug!(%cid, "cluster pin requested");
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pinline_core::{
    ContentStore, ContentStoreConnector, NamePublisher, NameSession, PrivateKey, StoreEndpoint,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Error, read_success};

/// Opens Kubo RPC clients, either for the public node or for the node
/// behind a private network's API url.
#[derive(Debug, Clone)]
pub struct KuboConnector {
    default_api_url: String,
    http: reqwest::Client,
}

impl KuboConnector {
    pub fn new(default_api_url: impl Into<String>) -> Self {
        Self {
            default_api_url: default_api_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ContentStoreConnector for KuboConnector {
    async fn connect(&self, endpoint: &StoreEndpoint) -> anyhow::Result<Box<dyn ContentStore>> {
        let api_url = match endpoint {
            StoreEndpoint::Default => self.default_api_url.clone(),
            StoreEndpoint::Private { api_url, .. } => api_url.clone(),
        };
        let client = KuboClient::new(self.http.clone(), api_url);
        let version = client.version().await?;
        debug!(api = %client.api_url, %version, "connected to ipfs node");
        Ok(Box::new(client))
    }
}

#[derive(Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Kubo RPC client for one node.
#[derive(Debug, Clone)]
pub struct KuboClient {
    api_url: String,
    http: reqwest::Client,
}

impl KuboClient {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.api_url)
    }

    async fn call(&self, command: &str, query: &[(&str, &str)]) -> Result<Bytes, Error> {
        let response = self
            .http
            .post(self.endpoint(command))
            .query(query)
            .send()
            .await?;
        read_success(response).await
    }

    async fn call_with_file(
        &self,
        command: &str,
        query: &[(&str, &str)],
        data: Vec<u8>,
    ) -> Result<Bytes, Error> {
        let form = Form::new().part("file", Part::bytes(data).file_name("data"));
        let response = self
            .http
            .post(self.endpoint(command))
            .query(query)
            .multipart(form)
            .send()
            .await?;
        read_success(response).await
    }

    pub async fn version(&self) -> Result<String, Error> {
        let body = self.call("version", &[]).await?;
        Ok(serde_json::from_slice::<VersionResponse>(&body)?.version)
    }

    /// Imports `key` under `name`.
    pub async fn import_key(&self, name: &str, key: &PrivateKey) -> anyhow::Result<()> {
        let exported = key.export()?;
        self.call_with_file(
            "key/import",
            &[
                ("arg", name),
                ("format", exported.format.as_str()),
                ("allow-any-key-type", "true"),
            ],
            exported.bytes,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_key(&self, name: &str) -> Result<(), Error> {
        self.call("key/rm", &[("arg", name)]).await?;
        Ok(())
    }

    pub async fn publish_name(
        &self,
        key_name: &str,
        cid: &str,
        lifetime: Duration,
        ttl: Duration,
    ) -> Result<(), Error> {
        let path = format!("/ipfs/{cid}");
        let lifetime = go_duration(lifetime);
        let ttl = go_duration(ttl);
        self.call(
            "name/publish",
            &[
                ("arg", path.as_str()),
                ("key", key_name),
                ("lifetime", lifetime.as_str()),
                ("ttl", ttl.as_str()),
                ("resolve", "false"),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Kubo parses durations in Go syntax.
fn go_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

#[async_trait]
impl ContentStore for KuboClient {
    async fn pin(&self, cid: &str) -> anyhow::Result<()> {
        self.call("pin/add", &[("arg", cid)]).await?;
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> anyhow::Result<()> {
        self.call("pin/rm", &[("arg", cid)]).await?;
        Ok(())
    }

    async fn add(&self, data: Bytes) -> anyhow::Result<String> {
        let body = self
            .call_with_file("add", &[("pin", "false")], data.to_vec())
            .await?;
        let added: AddResponse = serde_json::from_slice(&body)?;
        if added.hash.is_empty() {
            return Err(Error::UnexpectedResponse("add returned no hash".into()).into());
        }
        Ok(added.hash)
    }
}

/// Publishes naming records through the public node.
///
/// A session imports the record key under a temporary name derived from
/// the session's transport key, publishes, and removes the key again.
#[derive(Debug, Clone)]
pub struct KuboNamePublisher {
    client: KuboClient,
}

impl KuboNamePublisher {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: KuboClient::new(reqwest::Client::new(), api_url),
        }
    }
}

#[async_trait]
impl NamePublisher for KuboNamePublisher {
    async fn session(&self, transport: &PrivateKey) -> anyhow::Result<Box<dyn NameSession>> {
        self.client.version().await?;
        Ok(Box::new(KuboSession {
            client: self.client.clone(),
            tag: transport.peer_id(),
        }))
    }
}

struct KuboSession {
    client: KuboClient,
    tag: String,
}

#[async_trait]
impl NameSession for KuboSession {
    async fn publish(
        &self,
        key: &PrivateKey,
        cid: &str,
        eol: DateTime<Utc>,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let key_name = format!("pinline-{}-{}", self.tag, key.peer_id());
        let lifetime = (eol - Utc::now()).to_std().unwrap_or_default();

        self.client.import_key(&key_name, key).await?;
        let published = self.client.publish_name(&key_name, cid, lifetime, ttl).await;
        if let Err(e) = self.client.remove_key(&key_name).await {
            warn!(key = %key_name, error = %e, "failed to remove temporary key");
        }
        published?;
        Ok(())
    }
}

//! HTTP clients for IPFS nodes and IPFS Cluster.
//!
//! - [`KuboConnector`] opens RPC clients for the public node or a private
//!   network's node and implements pinning, adding and unpinning.
//! - [`KuboNamePublisher`] publishes naming records through a node.
//! - [`ClusterRestClient`] issues replication requests to the cluster REST
//!   API.

use bytes::Bytes;
use std::string::FromUtf8Error;

mod cluster;
mod kubo;

pub use cluster::{ClusterConfig, ClusterRestClient};
pub use kubo::{KuboClient, KuboConnector, KuboNamePublisher};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] FromUtf8Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

async fn read_success(response: reqwest::Response) -> Result<Bytes, Error> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let text = String::from_utf8(response.bytes().await?.to_vec())?;
        return Err(Error::HttpFailWithBody(status, text));
    }
    Ok(response.bytes().await?)
}

//! Object staging on an S3-compatible service.
//!
//! Uploads are staged by the API service under a per-upload bucket and
//! object name; the file consumer reads them once and deletes them.

use anyhow::anyhow;
use bytes::Bytes;
use pinline_core::ObjectStaging;
use s3::{Bucket, Region, creds::Credentials};
use tracing::debug;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct S3StagingConfig {
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct S3Staging {
    region: Region,
    credentials: Credentials,
}

impl S3Staging {
    pub fn create(config: S3StagingConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )?;
        s3::set_retries(5);
        Ok(Self {
            region: Region::Custom {
                endpoint: config.endpoint,
                region: config.region,
            },
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> anyhow::Result<Box<Bucket>> {
        Ok(Bucket::new(name, self.region.clone(), self.credentials.clone())?.with_path_style())
    }
}

#[async_trait::async_trait]
impl ObjectStaging for S3Staging {
    async fn get_object(&self, bucket: &str, object: &str) -> anyhow::Result<Bytes> {
        let response = self.bucket(bucket)?.get_object(object).await?;
        match response.status_code() {
            200 => {
                debug!(bucket, object, size = response.bytes().len(), "fetched staged object");
                Ok(response.bytes().clone())
            }
            code => Err(anyhow!("unexpected http status code {code} for {bucket}/{object}")),
        }
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> anyhow::Result<()> {
        let response = self.bucket(bucket)?.delete_object(object).await?;
        match response.status_code() {
            200 | 204 => Ok(()),
            code => Err(anyhow!("unexpected http status code {code} deleting {bucket}/{object}")),
        }
    }
}

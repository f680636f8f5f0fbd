use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use pinline_core::ObjectStaging;

/// Staged uploads keyed by (bucket, object).
#[derive(Debug, Default)]
pub struct MemoryStaging {
    objects: DashMap<(String, String), Bytes>,
    fail_deletes: AtomicBool,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, object: &str, data: impl Into<Bytes>) {
        self.objects
            .insert((bucket.to_string(), object.to_string()), data.into());
    }

    pub fn contains(&self, bucket: &str, object: &str) -> bool {
        self.objects
            .contains_key(&(bucket.to_string(), object.to_string()))
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStaging for MemoryStaging {
    async fn get_object(&self, bucket: &str, object: &str) -> anyhow::Result<Bytes> {
        self.objects
            .get(&(bucket.to_string(), object.to_string()))
            .map(|data| data.value().clone())
            .ok_or_else(|| anyhow!("object {bucket}/{object} not found"))
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("delete of {bucket}/{object} failed");
        }
        self.objects
            .remove(&(bucket.to_string(), object.to_string()));
        Ok(())
    }
}

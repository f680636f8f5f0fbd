use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pinline_core::{
    IpnsLedger, IpnsRecord, IpnsUpsert, Network, UploadLedger, UploadRecord, UploadSubmission,
    UpsertOutcome,
};

/// Upload and naming ledgers held in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    uploads: DashMap<(String, String), UploadRecord>,
    ipns: DashMap<String, IpnsRecord>,
}

impl MemoryLedger {
    /// Creates a new, empty `MemoryLedger`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upload records across all networks.
    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

#[async_trait]
impl UploadLedger for MemoryLedger {
    /// The entry guard holds the shard lock, so the read and the conditional
    /// write cannot interleave with another upsert for the same key.
    async fn upsert(&self, submission: UploadSubmission) -> anyhow::Result<UpsertOutcome> {
        let key = (submission.hash.clone(), submission.network.to_string());
        match self.uploads.entry(key) {
            Entry::Occupied(mut stored) => Ok(stored.get_mut().absorb(&submission)),
            Entry::Vacant(slot) => {
                slot.insert(UploadRecord::from_submission(&submission));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, hash: &str, network: &Network) -> anyhow::Result<Option<UploadRecord>> {
        let key = (hash.to_string(), network.to_string());
        Ok(self.uploads.get(&key).map(|record| record.value().clone()))
    }
}

#[async_trait]
impl IpnsLedger for MemoryLedger {
    async fn record_publish(&self, record: IpnsRecord) -> anyhow::Result<IpnsUpsert> {
        match self.ipns.entry(record.ipns_hash.clone()) {
            Entry::Occupied(mut stored) => {
                stored.get_mut().refresh(&record);
                Ok(IpnsUpsert::Updated)
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(IpnsUpsert::Inserted)
            }
        }
    }

    async fn find(&self, ipns_hash: &str) -> anyhow::Result<Option<IpnsRecord>> {
        Ok(self.ipns.get(ipns_hash).map(|record| record.value().clone()))
    }
}

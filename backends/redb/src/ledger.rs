use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minicbor::{Decode, Encode};
use pinline_core::{
    IpnsLedger, IpnsRecord, IpnsUpsert, Network, UploadKind, UploadLedger, UploadRecord,
    UploadSubmission, UpsertOutcome,
};
use redb::{ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::{IPNS, RedbStore, UPLOADS};

#[derive(Debug, Encode, Decode)]
struct UploadRow {
    #[n(0)]
    kind: u8,
    #[n(1)]
    uploaders: Vec<String>,
    #[n(2)]
    hold_time_in_months: i64,
    #[n(3)]
    gc_date: i64,
    #[n(4)]
    created_at: i64,
    #[n(5)]
    updated_at: i64,
}

#[derive(Debug, Encode, Decode)]
struct IpnsRow {
    #[n(0)]
    ipfs_hash: String,
    #[n(1)]
    key: String,
    #[n(2)]
    network: String,
    #[n(3)]
    username: String,
    #[n(4)]
    lifetime_nanos: u64,
    #[n(5)]
    ttl_nanos: u64,
    #[n(6)]
    created_at: i64,
    #[n(7)]
    updated_at: i64,
}

fn kind_tag(kind: UploadKind) -> u8 {
    match kind {
        UploadKind::Pin => 0,
        UploadKind::File => 1,
        UploadKind::PinCluster => 2,
    }
}

fn kind_from_tag(tag: u8) -> anyhow::Result<UploadKind> {
    match tag {
        0 => Ok(UploadKind::Pin),
        1 => Ok(UploadKind::File),
        2 => Ok(UploadKind::PinCluster),
        other => Err(anyhow!("unknown upload kind tag {other}")),
    }
}

// Timestamps are stored as unix microseconds.
fn micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

fn from_micros(value: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value).ok_or_else(|| anyhow!("timestamp {value} out of range"))
}

fn nanos(value: Duration) -> u64 {
    u64::try_from(value.as_nanos()).unwrap_or(u64::MAX)
}

impl UploadRow {
    fn from_record(record: &UploadRecord) -> Self {
        Self {
            kind: kind_tag(record.kind),
            uploaders: record.uploaders.iter().cloned().collect(),
            hold_time_in_months: record.hold_time_in_months,
            gc_date: micros(record.gc_date),
            created_at: micros(record.created_at),
            updated_at: micros(record.updated_at),
        }
    }

    fn into_record(self, hash: &str, network: &str) -> anyhow::Result<UploadRecord> {
        Ok(UploadRecord {
            hash: hash.to_string(),
            network: network.parse()?,
            kind: kind_from_tag(self.kind)?,
            uploaders: self.uploaders.into_iter().collect(),
            hold_time_in_months: self.hold_time_in_months,
            gc_date: from_micros(self.gc_date)?,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

impl IpnsRow {
    fn from_record(record: &IpnsRecord) -> Self {
        Self {
            ipfs_hash: record.ipfs_hash.clone(),
            key: record.key.clone(),
            network: record.network.to_string(),
            username: record.username.clone(),
            lifetime_nanos: nanos(record.lifetime),
            ttl_nanos: nanos(record.ttl),
            created_at: micros(record.created_at),
            updated_at: micros(record.updated_at),
        }
    }

    fn into_record(self, ipns_hash: &str) -> anyhow::Result<IpnsRecord> {
        Ok(IpnsRecord {
            ipns_hash: ipns_hash.to_string(),
            ipfs_hash: self.ipfs_hash,
            key: self.key,
            network: self.network.parse()?,
            username: self.username,
            lifetime: Duration::from_nanos(self.lifetime_nanos),
            ttl: Duration::from_nanos(self.ttl_nanos),
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

fn decode<'b, T: Decode<'b, ()>>(bytes: &'b [u8]) -> anyhow::Result<T> {
    minicbor::decode(bytes).map_err(|e| anyhow!("CBOR decode failed: {}", e))
}

#[async_trait]
impl UploadLedger for RedbStore {
    /// Reads the stored row and writes the merged row inside one write
    /// transaction. Redb serializes write transactions, so concurrent
    /// upserts cannot lose each other's updates.
    async fn upsert(&self, submission: UploadSubmission) -> anyhow::Result<UpsertOutcome> {
        self.blocking("upsert", move |db| {
            let network = submission.network.to_string();
            let write_txn = db.begin_write()?;
            let outcome = {
                let mut table = write_txn.open_table(UPLOADS)?;
                let key = (network.as_str(), submission.hash.as_str());

                let existing = table
                    .get(key)?
                    .map(|guard| {
                        decode::<UploadRow>(guard.value())?
                            .into_record(&submission.hash, &network)
                    })
                    .transpose()?;

                let (record, outcome) = match existing {
                    Some(mut record) => {
                        let outcome = record.absorb(&submission);
                        (record, outcome)
                    }
                    None => (
                        UploadRecord::from_submission(&submission),
                        UpsertOutcome::Inserted,
                    ),
                };

                if outcome != UpsertOutcome::Duplicate {
                    let row = minicbor::to_vec(UploadRow::from_record(&record))?;
                    table.insert(key, row.as_slice())?;
                }
                outcome
            };
            write_txn.commit()?;
            debug!(hash = %submission.hash, network = %network, ?outcome, "upload upserted");
            Ok(outcome)
        })
        .await
    }

    async fn get(&self, hash: &str, network: &Network) -> anyhow::Result<Option<UploadRecord>> {
        let hash = hash.to_string();
        let network = network.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(UPLOADS)?;
            table
                .get((network.as_str(), hash.as_str()))?
                .map(|guard| decode::<UploadRow>(guard.value())?.into_record(&hash, &network))
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl IpnsLedger for RedbStore {
    async fn record_publish(&self, record: IpnsRecord) -> anyhow::Result<IpnsUpsert> {
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            let outcome = {
                let mut table = write_txn.open_table(IPNS)?;
                let existing = table
                    .get(record.ipns_hash.as_str())?
                    .map(|guard| decode::<IpnsRow>(guard.value())?.into_record(&record.ipns_hash))
                    .transpose()?;

                let (stored, outcome) = match existing {
                    Some(mut stored) => {
                        stored.refresh(&record);
                        (stored, IpnsUpsert::Updated)
                    }
                    None => (record, IpnsUpsert::Inserted),
                };
                let row = minicbor::to_vec(IpnsRow::from_record(&stored))?;
                table.insert(stored.ipns_hash.as_str(), row.as_slice())?;
                outcome
            };
            write_txn.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn find(&self, ipns_hash: &str) -> anyhow::Result<Option<IpnsRecord>> {
        let ipns_hash = ipns_hash.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(IPNS)?;
            table
                .get(ipns_hash.as_str())?
                .map(|guard| decode::<IpnsRow>(guard.value())?.into_record(&ipns_hash))
                .transpose()
        })
        .await
    }
}

//! Test utilities for ledger implementations.
//!
//! This module provides a conformance suite that can be run against any
//! `UploadLedger` + `IpnsLedger` implementation.
//!
//! # Usage
//!
//! In your backend crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! pinline_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use pinline_core::testutil::LedgerTests;
//!
//! #[tokio::test]
//! async fn test_my_ledger() -> anyhow::Result<()> {
//!     let ledger = MyLedger::new(...);
//!     LedgerTests::new(&ledger).run_all().await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rand::Rng;

use crate::ipns::{IpnsLedger, IpnsRecord, IpnsUpsert};
use crate::network::Network;
use crate::upload::{UploadKind, UploadLedger, UploadSubmission, UpsertOutcome};

/// Conformance suite for ledger implementations.
pub struct LedgerTests<'a, L> {
    ledger: &'a L,
    /// Prefix for hashes to avoid conflicts
    prefix: String,
}

impl<'a, L: UploadLedger + IpnsLedger> LedgerTests<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        let prefix = format!("_test_{}_", rand::thread_rng().r#gen::<u32>());
        Self { ledger, prefix }
    }

    fn hash(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        self.test_insert_then_get().await?;
        self.test_gc_date_never_moves_back().await?;
        self.test_uploaders_are_unioned().await?;
        self.test_pure_duplicate().await?;
        self.test_networks_are_separate().await?;
        self.test_ipns_insert_then_update().await?;
        Ok(())
    }

    /// Concurrency check, needs a `'static` ledger shared across tasks.
    pub async fn run_concurrent(ledger: Arc<L>) -> anyhow::Result<()> {
        let hash = format!("_test_{}_race", rand::thread_rng().r#gen::<u32>());
        let mut tasks = Vec::new();
        for months in 1..=16i64 {
            let ledger = ledger.clone();
            let hash = hash.clone();
            tasks.push(tokio::spawn(async move {
                let sub = UploadSubmission::new(
                    hash,
                    Network::Public,
                    UploadKind::Pin,
                    format!("user{months}"),
                    months,
                );
                ledger.upsert(sub).await
            }));
        }
        for task in tasks {
            task.await??;
        }

        let record = ledger
            .get(&hash, &Network::Public)
            .await?
            .ok_or_else(|| anyhow::anyhow!("record missing after concurrent upserts"))?;
        assert_eq!(record.hold_time_in_months, 16, "latest gc date must win");
        assert_eq!(record.uploaders.len(), 16, "no uploader may be lost");
        Ok(())
    }

    pub async fn test_insert_then_get(&self) -> anyhow::Result<()> {
        let hash = self.hash("insert");
        assert!(self.ledger.get(&hash, &Network::Public).await?.is_none());

        let sub = UploadSubmission::new(&hash, Network::Public, UploadKind::File, "alice", 3);
        let expected_gc = sub.gc_date();
        assert_eq!(self.ledger.upsert(sub).await?, UpsertOutcome::Inserted);

        let record = self
            .ledger
            .get(&hash, &Network::Public)
            .await?
            .ok_or_else(|| anyhow::anyhow!("record missing"))?;
        assert_eq!(record.kind, UploadKind::File);
        assert_eq!(record.hold_time_in_months, 3);
        assert!(record.uploaders.contains("alice"));
        assert_gc_eq(record.gc_date, expected_gc);
        Ok(())
    }

    pub async fn test_gc_date_never_moves_back(&self) -> anyhow::Result<()> {
        let hash = self.hash("gc");
        let long = UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, "alice", 6);
        let long_gc = long.gc_date();
        self.ledger.upsert(long).await?;

        let short = UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, "alice", 2);
        assert_eq!(self.ledger.upsert(short).await?, UpsertOutcome::Duplicate);

        let record = self.expect(&hash, &Network::Public).await?;
        assert_gc_eq(record.gc_date, long_gc);
        assert_eq!(record.hold_time_in_months, 6);

        let longer = UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, "alice", 12);
        let longer_gc = longer.gc_date();
        assert_eq!(self.ledger.upsert(longer).await?, UpsertOutcome::Updated);
        let record = self.expect(&hash, &Network::Public).await?;
        assert_gc_eq(record.gc_date, longer_gc);
        Ok(())
    }

    pub async fn test_uploaders_are_unioned(&self) -> anyhow::Result<()> {
        let hash = self.hash("union");
        for user in ["alice", "bob", "alice", "carol"] {
            let sub = UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, user, 1);
            self.ledger.upsert(sub).await?;
        }
        let record = self.expect(&hash, &Network::Public).await?;
        let users: Vec<_> = record.uploaders.iter().map(String::as_str).collect();
        assert_eq!(users, ["alice", "bob", "carol"]);
        Ok(())
    }

    pub async fn test_pure_duplicate(&self) -> anyhow::Result<()> {
        let hash = self.hash("dup");
        let first = UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, "alice", 4);
        let mut again = first.clone();
        self.ledger.upsert(first).await?;
        let before = self.expect(&hash, &Network::Public).await?;

        again.submitted_at = again.submitted_at - TimeDelta::days(1);
        assert_eq!(self.ledger.upsert(again).await?, UpsertOutcome::Duplicate);
        let after = self.expect(&hash, &Network::Public).await?;
        assert_eq!(before.updated_at, after.updated_at);
        Ok(())
    }

    pub async fn test_networks_are_separate(&self) -> anyhow::Result<()> {
        let hash = self.hash("nets");
        let lab = Network::Named("lab".into());
        self.ledger
            .upsert(UploadSubmission::new(&hash, Network::Public, UploadKind::Pin, "alice", 1))
            .await?;
        assert_eq!(
            self.ledger
                .upsert(UploadSubmission::new(&hash, lab.clone(), UploadKind::Pin, "alice", 1))
                .await?,
            UpsertOutcome::Inserted
        );
        assert_eq!(self.expect(&hash, &lab).await?.network, lab);
        Ok(())
    }

    pub async fn test_ipns_insert_then_update(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let peer = self.hash("peer");
        let mut record = IpnsRecord {
            ipns_hash: peer.clone(),
            ipfs_hash: "QmOld".into(),
            key: "alice-main".into(),
            network: Network::Public,
            username: "alice".into(),
            lifetime: Duration::from_secs(3600),
            ttl: Duration::from_secs(60),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(self.ledger.record_publish(record.clone()).await?, IpnsUpsert::Inserted);

        record.ipfs_hash = "QmNew".into();
        record.key = "alice-renamed".into();
        record.username = "bob".into();
        record.lifetime = Duration::from_secs(7200);
        record.updated_at = now + TimeDelta::seconds(5);
        assert_eq!(self.ledger.record_publish(record).await?, IpnsUpsert::Updated);

        let stored = self
            .ledger
            .find(&peer)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ipns record missing"))?;
        assert_eq!(stored.ipfs_hash, "QmNew");
        assert_eq!(stored.key, "alice-main");
        assert_eq!(stored.username, "bob");
        assert_eq!(stored.lifetime, Duration::from_secs(7200));
        assert!(stored.updated_at > stored.created_at);
        assert!(self.ledger.find(&self.hash("nobody")).await?.is_none());
        Ok(())
    }

    async fn expect(
        &self,
        hash: &str,
        network: &Network,
    ) -> anyhow::Result<crate::upload::UploadRecord> {
        self.ledger
            .get(hash, network)
            .await?
            .ok_or_else(|| anyhow::anyhow!("record {hash} missing"))
    }
}

// Backends may store timestamps with reduced precision.
fn assert_gc_eq(stored: chrono::DateTime<Utc>, expected: chrono::DateTime<Utc>) {
    let drift = (stored - expected).abs();
    assert!(
        drift < TimeDelta::seconds(1),
        "gc date {stored} differs from {expected}"
    );
}

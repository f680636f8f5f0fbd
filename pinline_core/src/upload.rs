use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::network::Network;

/// How a piece of content entered a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadKind {
    #[serde(rename = "pin")]
    Pin,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "pin-cluster")]
    PinCluster,
}

impl UploadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Pin => "pin",
            UploadKind::File => "file",
            UploadKind::PinCluster => "pin-cluster",
        }
    }
}

/// A completed upload reported to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSubmission {
    pub hash: String,
    pub network: Network,
    pub kind: UploadKind,
    pub username: String,
    pub hold_time_in_months: i64,
    pub submitted_at: DateTime<Utc>,
}

impl UploadSubmission {
    pub fn new(
        hash: impl Into<String>,
        network: Network,
        kind: UploadKind,
        username: impl Into<String>,
        hold_time_in_months: i64,
    ) -> Self {
        Self {
            hash: hash.into(),
            network,
            kind,
            username: username.into(),
            hold_time_in_months,
            submitted_at: Utc::now(),
        }
    }

    pub fn gc_date(&self) -> DateTime<Utc> {
        gc_date(self.submitted_at, self.hold_time_in_months)
    }
}

/// Retention record for one (hash, network) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub hash: String,
    pub network: Network,
    pub kind: UploadKind,
    pub uploaders: BTreeSet<String>,
    pub hold_time_in_months: i64,
    pub gc_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`UploadLedger::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First record for the pair.
    Inserted,
    /// The stored record gained a later gc date, a new uploader, or both.
    Updated,
    /// Nothing changed.
    Duplicate,
}

/// `submitted_at` plus `months` calendar months. Negative hold times count
/// as zero.
pub fn gc_date(submitted_at: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let months = u32::try_from(months.max(0)).unwrap_or(u32::MAX);
    submitted_at
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl UploadRecord {
    pub fn from_submission(submission: &UploadSubmission) -> Self {
        Self {
            hash: submission.hash.clone(),
            network: submission.network.clone(),
            kind: submission.kind,
            uploaders: BTreeSet::from([submission.username.clone()]),
            hold_time_in_months: submission.hold_time_in_months,
            gc_date: submission.gc_date(),
            created_at: submission.submitted_at,
            updated_at: submission.submitted_at,
        }
    }

    /// Folds a later submission into this record.
    ///
    /// The gc date only ever moves forward and uploaders are only ever
    /// added. The kind of the first submission is kept.
    pub fn absorb(&mut self, submission: &UploadSubmission) -> UpsertOutcome {
        let mut changed = false;

        let candidate = submission.gc_date();
        if candidate > self.gc_date {
            self.gc_date = candidate;
            self.hold_time_in_months = submission.hold_time_in_months;
            changed = true;
        }
        if self.uploaders.insert(submission.username.clone()) {
            changed = true;
        }

        if changed {
            self.updated_at = submission.submitted_at;
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Duplicate
        }
    }
}

/// Persistent record of uploads, keyed by (hash, network).
///
/// `upsert` must be atomic with respect to concurrent callers for the same
/// key: the read of the stored record and the conditional write happen as
/// one operation, so concurrent submissions never lose a later gc date or an
/// uploader.
#[async_trait]
pub trait UploadLedger: Send + Sync + 'static {
    async fn upsert(&self, submission: UploadSubmission) -> anyhow::Result<UpsertOutcome>;

    async fn get(&self, hash: &str, network: &Network) -> anyhow::Result<Option<UploadRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn submission(user: &str, months: i64) -> UploadSubmission {
        let mut sub = UploadSubmission::new("Qm123", Network::Public, UploadKind::Pin, user, months);
        sub.submitted_at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        sub
    }

    #[test]
    fn test_gc_date_uses_calendar_months() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            gc_date(start, 1),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
        assert_eq!(gc_date(start, 0), start);
        assert_eq!(gc_date(start, -4), start);
    }

    #[test]
    fn test_absorb_extends_forward_only() {
        let mut record = UploadRecord::from_submission(&submission("alice", 6));
        let original = record.gc_date;

        assert_eq!(record.absorb(&submission("alice", 3)), UpsertOutcome::Duplicate);
        assert_eq!(record.gc_date, original);
        assert_eq!(record.hold_time_in_months, 6);

        assert_eq!(record.absorb(&submission("alice", 9)), UpsertOutcome::Updated);
        assert!(record.gc_date > original);
        assert_eq!(record.hold_time_in_months, 9);
    }

    #[test]
    fn test_absorb_unions_uploaders() {
        let mut record = UploadRecord::from_submission(&submission("alice", 6));
        assert_eq!(record.absorb(&submission("bob", 1)), UpsertOutcome::Updated);
        assert_eq!(record.absorb(&submission("bob", 1)), UpsertOutcome::Duplicate);
        let users: Vec<_> = record.uploaders.iter().map(String::as_str).collect();
        assert_eq!(users, ["alice", "bob"]);
        assert_eq!(record.hold_time_in_months, 6);
    }

    #[test]
    fn test_kind_of_first_submission_is_kept() {
        let mut record = UploadRecord::from_submission(&submission("alice", 1));
        let mut later = submission("alice", 5);
        later.kind = UploadKind::PinCluster;
        record.absorb(&later);
        assert_eq!(record.kind, UploadKind::Pin);
    }
}

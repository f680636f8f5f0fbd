//! Refund policy for failed jobs.
//!
//! Whether a failure is compensated depends only on the operation and on
//! the kind of failure, never on the individual code path that produced it.

use std::fmt;

/// Pipeline operations, one per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Pin,
    FileAdd,
    ClusterPin,
    IpnsPublish,
    KeyCreation,
    MailSend,
    PinRemoval,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Pin,
        Operation::FileAdd,
        Operation::ClusterPin,
        Operation::IpnsPublish,
        Operation::KeyCreation,
        Operation::MailSend,
        Operation::PinRemoval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Pin => "pin",
            Operation::FileAdd => "file-add",
            Operation::ClusterPin => "cluster-pin",
            Operation::IpnsPublish => "ipns-publish",
            Operation::KeyCreation => "key-creation",
            Operation::MailSend => "mail-send",
            Operation::PinRemoval => "pin-removal",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The user may not use the requested private network.
    Unauthorized,
    /// The authorization gate could not reach a decision.
    AccessCheck,
    /// The operation is not offered on the requested network.
    Unsupported,
    /// The job content is invalid.
    Invalid,
    /// An external collaborator failed.
    Dependency,
}

impl FailureKind {
    /// Failures that may succeed when the same job is delivered again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::AccessCheck | FailureKind::Dependency)
    }
}

/// Refund table.
///
/// Gate failures are refunded for the pre-billed operations. Cluster
/// replication and naming publishes are refunded for every failure.
/// Primary store operations, key creation and mail are never refunded.
pub fn refundable(operation: Operation, kind: FailureKind) -> bool {
    use FailureKind::*;
    use Operation::*;

    match (operation, kind) {
        (Pin | FileAdd, Unauthorized | AccessCheck) => true,
        (Pin | FileAdd, Unsupported | Invalid | Dependency) => false,
        (ClusterPin | IpnsPublish, _) => true,
        (KeyCreation | MailSend | PinRemoval, _) => false,
    }
}

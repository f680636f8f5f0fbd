//! Core pinline types and traits.
//!
//! This crate defines the shared vocabulary of the job pipeline: the job
//! messages carried on the queues, the records kept by the ledgers, and the
//! traits every external collaborator is reached through.
//!
//! ## Wire types
//!
//! The job messages in [`jobs`] are JSON encoded on the queues and are
//! produced by the upstream API service. Their field names are part of the
//! contract with that service and must not change.
//!
//! - Networks (`network::Network`)
//! - Job messages (`jobs::PinJob`, `jobs::FileJob`, `jobs::ClusterPinJob`,
//!   `jobs::IpnsPublishJob`, `jobs::KeyCreationJob`, `jobs::EmailSend`,
//!   `jobs::PinRemovalJob`)
//!
//! ## Ledgers
//!
//! - Upload ledger (`UploadLedger`) with its conditional upsert
//! - Naming record ledger (`IpnsLedger`)
//!
//! Implementations live in `pinline_backend_memory` and
//! `pinline_backend_redb`.
//!
//! ## Collaborators
//!
//! - Content stores, cluster replication, object staging and name
//!   publishing (`store`)
//! - Access control, network and user directories, credits (`accounts`)
//! - Outgoing mail (`mail`)
//! - Signing keys and peer identities (`keys`)
//!
//! ## Policy
//!
//! The refund table (`policy::refundable`) decides which failed operations
//! are compensated with a credit refund.

pub mod accounts;
pub mod ipns;
pub mod jobs;
pub mod keys;
pub mod mail;
pub mod network;
pub mod policy;
pub mod store;
pub mod upload;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use accounts::{AccessControl, CreditLedger, NetworkDirectory, UserDirectory};
pub use ipns::{IpnsLedger, IpnsRecord, IpnsUpsert};
pub use jobs::Billing;
pub use keys::{ExportedKey, KeyFormat, KeySpec, KeyStore, KeyType, PrivateKey};
pub use mail::{Email, Mailer};
pub use network::Network;
pub use policy::{FailureKind, Operation};
pub use store::{
    ClusterClient, ContentStore, ContentStoreConnector, NamePublisher, NameSession,
    ObjectStaging, StoreEndpoint,
};
pub use upload::{UploadKind, UploadLedger, UploadRecord, UploadSubmission, UpsertOutcome};

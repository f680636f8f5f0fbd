//! In-memory implementations of every pinline collaborator.
//!
//! Everything here keeps its state in `DashMap`s and records the calls it
//! receives so tests can assert on side effects. Most collaborators can be
//! told to fail in order to exercise error paths.

mod accounts;
mod content;
mod ledger;
mod mail;
mod names;
mod staging;

pub use accounts::{MemoryAccounts, MemoryKeyStore};
pub use content::{DEFAULT_ENDPOINT, MemoryCluster, MemoryNode};
pub use ledger::MemoryLedger;
pub use mail::MemoryMailer;
pub use names::{MemoryNamePublisher, Published};
pub use staging::MemoryStaging;

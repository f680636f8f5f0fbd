//! RedbStore - the pipeline's persistent state in a single redb database.
//!
//! One database file holds the upload and naming ledgers, the user and
//! private network directories, credit balances and the named key store.
//! All access runs on the blocking thread pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use redb::{Database, TableDefinition};

mod accounts;
mod keys;
mod ledger;

/// (network, hash) -> cbor `UploadRow`
const UPLOADS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("uploads");
/// peer id -> cbor `IpnsRow`
const IPNS: TableDefinition<&str, &[u8]> = TableDefinition::new("ipns");
/// username -> email
const USERS: TableDefinition<&str, &str> = TableDefinition::new("users");
/// (username, key name) -> peer id
const USER_KEYS: TableDefinition<(&str, &str), &str> = TableDefinition::new("user_keys");
/// network -> api url
const NETWORKS: TableDefinition<&str, &str> = TableDefinition::new("networks");
/// (network, username)
const NETWORK_MEMBERS: TableDefinition<(&str, &str), ()> = TableDefinition::new("network_members");
/// username -> balance
const CREDITS: TableDefinition<&str, f64> = TableDefinition::new("credits");
/// key name -> cbor `KeyRow`
const KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("keys");

pub const DATABASE_FILE: &str = "pinline.redb";

/// Persistent pipeline state backed by a Redb database.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens (or creates) `pinline.redb` inside the directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let db = Database::create(path.join(DATABASE_FILE))?;

        // Create every table up front so first accesses may be reads.
        {
            let write_txn = db.begin_write()?;
            {
                write_txn.open_table(UPLOADS)?;
                write_txn.open_table(IPNS)?;
                write_txn.open_table(USERS)?;
                write_txn.open_table(USER_KEYS)?;
                write_txn.open_table(NETWORKS)?;
                write_txn.open_table(NETWORK_MEMBERS)?;
                write_txn.open_table(CREDITS)?;
                write_txn.open_table(KEYS)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Runs `f` against the database on the blocking pool.
    async fn blocking<T, F>(&self, task: &'static str, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("redb {} task failed: {}", task, e))?
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish()
    }
}

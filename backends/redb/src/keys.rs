use anyhow::{anyhow, bail};
use async_trait::async_trait;
use minicbor::{Decode, Encode};
use pinline_core::{KeyFormat, KeySpec, KeyStore, PrivateKey};
use redb::{ReadableDatabase, ReadableTable};
use tracing::info;

use crate::{KEYS, RedbStore};

#[derive(Debug, Encode, Decode)]
struct KeyRow {
    #[n(0)]
    format: String,
    #[cbor(n(1), with = "minicbor::bytes")]
    key: Vec<u8>,
}

#[async_trait]
impl KeyStore for RedbStore {
    /// Generation and the uniqueness check both run on the blocking pool;
    /// the insert happens in the same write transaction as the check.
    async fn create_key(&self, name: &str, spec: KeySpec) -> anyhow::Result<PrivateKey> {
        let name = name.to_string();
        self.blocking("keygen", move |db| {
            let key = PrivateKey::generate(spec)?;
            let exported = key.export()?;
            let encoded = minicbor::to_vec(KeyRow {
                format: exported.format.as_str().to_string(),
                key: exported.bytes,
            })?;

            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(KEYS)?;
                if table.get(name.as_str())?.is_some() {
                    bail!("key {name} already exists");
                }
                table.insert(name.as_str(), encoded.as_slice())?;
            }
            write_txn.commit()?;
            info!(key = %name, bits = spec.bits, "stored new key");
            Ok(key)
        })
        .await
    }

    async fn get_private_key(&self, name: &str) -> anyhow::Result<PrivateKey> {
        let name = name.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(KEYS)?;
            let guard = table
                .get(name.as_str())?
                .ok_or_else(|| anyhow!("no key named {name}"))?;
            let row: KeyRow = minicbor::decode(guard.value())
                .map_err(|e| anyhow!("CBOR decode failed: {}", e))?;
            let format: KeyFormat = row.format.parse()?;
            Ok(PrivateKey::import(format, &row.key)?)
        })
        .await
    }
}

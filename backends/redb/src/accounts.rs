use anyhow::anyhow;
use async_trait::async_trait;
use pinline_core::{AccessControl, CreditLedger, NetworkDirectory, UserDirectory};
use redb::{ReadableDatabase, ReadableTable};

use crate::{CREDITS, NETWORK_MEMBERS, NETWORKS, RedbStore, USER_KEYS, USERS};

impl RedbStore {
    /// Creates or updates a user.
    pub async fn put_user(&self, username: &str, email: &str) -> anyhow::Result<()> {
        let (username, email) = (username.to_string(), email.to_string());
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            write_txn
                .open_table(USERS)?
                .insert(username.as_str(), email.as_str())?;
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    /// Creates or updates a private network and adds `members` to it.
    pub async fn put_network(
        &self,
        network: &str,
        api_url: &str,
        members: &[String],
    ) -> anyhow::Result<()> {
        let (network, api_url) = (network.to_string(), api_url.to_string());
        let members = members.to_vec();
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            {
                write_txn
                    .open_table(NETWORKS)?
                    .insert(network.as_str(), api_url.as_str())?;
                let mut table = write_txn.open_table(NETWORK_MEMBERS)?;
                for member in &members {
                    table.insert((network.as_str(), member.as_str()), ())?;
                }
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    /// Keys registered to a user as (key name, peer id) pairs.
    pub async fn user_keys(&self, username: &str) -> anyhow::Result<Vec<(String, String)>> {
        let username = username.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(USER_KEYS)?;
            let mut keys = Vec::new();
            for entry in table.range((username.as_str(), "")..)? {
                let (key, peer_id) = entry?;
                let (owner, key_name) = key.value();
                if owner != username {
                    break;
                }
                keys.push((key_name.to_string(), peer_id.value().to_string()));
            }
            Ok(keys)
        })
        .await
    }

    pub async fn balance(&self, username: &str) -> anyhow::Result<f64> {
        let username = username.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(CREDITS)?;
            Ok(table
                .get(username.as_str())?
                .map(|guard| guard.value())
                .unwrap_or_default())
        })
        .await
    }
}

#[async_trait]
impl AccessControl for RedbStore {
    async fn can_access(&self, username: &str, network: &str) -> anyhow::Result<bool> {
        let (username, network) = (username.to_string(), network.to_string());
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(NETWORK_MEMBERS)?;
            Ok(table.get((network.as_str(), username.as_str()))?.is_some())
        })
        .await
    }
}

#[async_trait]
impl NetworkDirectory for RedbStore {
    async fn api_url(&self, network: &str) -> anyhow::Result<String> {
        let network = network.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(NETWORKS)?;
            table
                .get(network.as_str())?
                .map(|guard| guard.value().to_string())
                .ok_or_else(|| anyhow!("unknown network {network}"))
        })
        .await
    }
}

#[async_trait]
impl UserDirectory for RedbStore {
    async fn email_for(&self, username: &str) -> anyhow::Result<String> {
        let username = username.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(USERS)?;
            table
                .get(username.as_str())?
                .map(|guard| guard.value().to_string())
                .ok_or_else(|| anyhow!("no email address for {username}"))
        })
        .await
    }

    async fn add_key(&self, username: &str, key_name: &str, peer_id: &str) -> anyhow::Result<()> {
        let (username, key_name, peer_id) =
            (username.to_string(), key_name.to_string(), peer_id.to_string());
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            write_txn
                .open_table(USER_KEYS)?
                .insert((username.as_str(), key_name.as_str()), peer_id.as_str())?;
            write_txn.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CreditLedger for RedbStore {
    async fn refund(&self, username: &str, amount: f64) -> anyhow::Result<f64> {
        let username = username.to_string();
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            let balance = {
                let mut table = write_txn.open_table(CREDITS)?;
                let current = table
                    .get(username.as_str())?
                    .map(|guard| guard.value())
                    .unwrap_or_default();
                let balance = current + amount;
                table.insert(username.as_str(), balance)?;
                balance
            };
            write_txn.commit()?;
            Ok(balance)
        })
        .await
    }
}

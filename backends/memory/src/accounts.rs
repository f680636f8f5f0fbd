use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pinline_core::{
    AccessControl, CreditLedger, KeySpec, KeyStore, NetworkDirectory, PrivateKey, UserDirectory,
};

#[derive(Debug, Clone)]
struct PrivateNetwork {
    api_url: String,
    members: Vec<String>,
}

/// Users, private networks and credit balances.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    emails: DashMap<String, String>,
    networks: DashMap<String, PrivateNetwork>,
    credits: DashMap<String, f64>,
    keys: DashMap<String, Vec<(String, String)>>,
    refunds: DashMap<String, Vec<f64>>,
    access_check_down: AtomicBool,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str, email: &str) {
        self.emails.insert(username.to_string(), email.to_string());
    }

    /// Registers a private network and the users allowed on it.
    pub fn add_network(&self, name: &str, api_url: &str, members: &[&str]) {
        self.networks.insert(
            name.to_string(),
            PrivateNetwork {
                api_url: api_url.to_string(),
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    /// Makes every access check fail with an error.
    pub fn set_access_check_down(&self, down: bool) {
        self.access_check_down.store(down, Ordering::SeqCst);
    }

    pub fn balance(&self, username: &str) -> f64 {
        self.credits.get(username).map(|c| *c).unwrap_or_default()
    }

    /// Every refund issued to a user, in order.
    pub fn refunds(&self, username: &str) -> Vec<f64> {
        self.refunds
            .get(username)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn total_refunds(&self) -> usize {
        self.refunds.iter().map(|r| r.value().len()).sum()
    }

    /// Keys registered to a user as (key name, peer id) pairs.
    pub fn keys(&self, username: &str) -> Vec<(String, String)> {
        self.keys
            .get(username)
            .map(|k| k.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccessControl for MemoryAccounts {
    async fn can_access(&self, username: &str, network: &str) -> anyhow::Result<bool> {
        if self.access_check_down.load(Ordering::SeqCst) {
            bail!("access control unavailable");
        }
        Ok(self
            .networks
            .get(network)
            .is_some_and(|net| net.members.iter().any(|m| m == username)))
    }
}

#[async_trait]
impl NetworkDirectory for MemoryAccounts {
    async fn api_url(&self, network: &str) -> anyhow::Result<String> {
        self.networks
            .get(network)
            .map(|net| net.api_url.clone())
            .ok_or_else(|| anyhow!("unknown network {network}"))
    }
}

#[async_trait]
impl UserDirectory for MemoryAccounts {
    async fn email_for(&self, username: &str) -> anyhow::Result<String> {
        self.emails
            .get(username)
            .map(|email| email.clone())
            .ok_or_else(|| anyhow!("no email address for {username}"))
    }

    async fn add_key(&self, username: &str, key_name: &str, peer_id: &str) -> anyhow::Result<()> {
        self.keys
            .entry(username.to_string())
            .or_default()
            .push((key_name.to_string(), peer_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for MemoryAccounts {
    async fn refund(&self, username: &str, amount: f64) -> anyhow::Result<f64> {
        let mut balance = self.credits.entry(username.to_string()).or_default();
        *balance += amount;
        self.refunds
            .entry(username.to_string())
            .or_default()
            .push(amount);
        Ok(*balance)
    }
}

/// Named private keys.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: DashMap<String, PrivateKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, key: PrivateKey) {
        self.keys.insert(name.to_string(), key);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn create_key(&self, name: &str, spec: KeySpec) -> anyhow::Result<PrivateKey> {
        if self.keys.contains_key(name) {
            bail!("key {name} already exists");
        }
        let key = tokio::task::spawn_blocking(move || PrivateKey::generate(spec))
            .await
            .map_err(|e| anyhow!("key generation task failed: {}", e))??;
        match self.keys.entry(name.to_string()) {
            Entry::Occupied(_) => bail!("key {name} already exists"),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(key)
            }
        }
    }

    async fn get_private_key(&self, name: &str) -> anyhow::Result<PrivateKey> {
        self.keys
            .get(name)
            .map(|key| key.value().clone())
            .ok_or_else(|| anyhow!("no key named {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_access_requires_membership() -> anyhow::Result<()> {
        let accounts = MemoryAccounts::new();
        accounts.add_network("lab", "http://lab:5001", &["alice"]);

        assert!(accounts.can_access("alice", "lab").await?);
        assert!(!accounts.can_access("bob", "lab").await?);
        assert!(!accounts.can_access("alice", "other").await?);

        accounts.set_access_check_down(true);
        assert!(accounts.can_access("alice", "lab").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_refunds_accumulate() -> anyhow::Result<()> {
        let accounts = MemoryAccounts::new();
        accounts.refund("alice", 2.5).await?;
        assert_eq!(accounts.refund("alice", 1.5).await?, 4.0);
        assert_eq!(accounts.refunds("alice"), vec![2.5, 1.5]);
        assert_eq!(accounts.balance("alice"), 4.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_key_names_rejected() -> anyhow::Result<()> {
        let keys = MemoryKeyStore::new();
        let spec = KeySpec::parse("ed25519", 0)?;
        let key = keys.create_key("alice-main", spec).await?;
        assert!(keys.create_key("alice-main", spec).await.is_err());
        assert_eq!(
            keys.get_private_key("alice-main").await?.peer_id(),
            key.peer_id()
        );
        Ok(())
    }
}

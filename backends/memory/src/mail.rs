use anyhow::bail;
use async_trait::async_trait;
use dashmap::DashSet;
use pinline_core::{Email, Mailer};
use tokio::sync::Mutex;

/// Mailer that keeps every delivered message.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    rejected: DashSet<String>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sends to `address` fail.
    pub fn reject(&self, address: &str) {
        self.rejected.insert(address.to_string());
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.rejected.contains(&email.to_address) {
            bail!("mailbox {} rejected the message", email.to_address);
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

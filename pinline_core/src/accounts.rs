use async_trait::async_trait;

/// Decides whether a user may operate on a private network.
#[async_trait]
pub trait AccessControl: Send + Sync + 'static {
    async fn can_access(&self, username: &str, network: &str) -> anyhow::Result<bool>;
}

/// Resolves private networks to their API endpoints.
#[async_trait]
pub trait NetworkDirectory: Send + Sync + 'static {
    async fn api_url(&self, network: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn email_for(&self, username: &str) -> anyhow::Result<String>;

    /// Records that `username` owns the key `key_name` with peer id
    /// `peer_id`.
    async fn add_key(&self, username: &str, key_name: &str, peer_id: &str) -> anyhow::Result<()>;
}

/// User credit balances. The pipeline only ever adds credits back.
#[async_trait]
pub trait CreditLedger: Send + Sync + 'static {
    /// Adds `amount` to the balance of `username` and returns the new
    /// balance.
    async fn refund(&self, username: &str, amount: f64) -> anyhow::Result<f64>;
}

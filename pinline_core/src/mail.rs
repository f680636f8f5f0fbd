use async_trait::async_trait;

/// A single outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to_address: String,
    pub to_name: String,
    pub subject: String,
    pub content: String,
    pub content_type: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

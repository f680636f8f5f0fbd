//! Mailer backed by the SendGrid v3 mail send API.

use async_trait::async_trait;
use pinline_core::{Email, Mailer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.sendgrid.com";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_address: String,
    pub from_name: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone)]
pub struct SendGridMailer {
    config: SendGridConfig,
    http: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(config: SendGridConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn body(&self, email: &Email) -> serde_json::Value {
        json!({
            "personalizations": [{
                "to": [{ "email": email.to_address, "name": email.to_name }],
            }],
            "from": { "email": self.config.from_address, "name": self.config.from_name },
            "subject": email.subject,
            "content": [{ "type": email.content_type, "value": email.content }],
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let response = self
            .http
            .post(format!("{}/v3/mail/send", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&self.body(email))
            .send()
            .await
            .map_err(Error::from)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.map_err(Error::from)?;
            return Err(Error::HttpFailWithBody(status, text).into());
        }
        debug!(to = %email.to_address, subject = %email.subject, "email sent");
        Ok(())
    }
}

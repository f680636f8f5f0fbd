use std::sync::Arc;

use pinline_core::UserDirectory;
use pinline_core::jobs::EmailSend;
use pinline_queue::{Publisher, QueueSpec};
use tracing::{error, warn};

use crate::outcome::Notice;

pub const UNAUTHORIZED_SUBJECT: &str = "IPFS Private Network Unauthorized Access";
pub const INITIALIZATION_FAILED_SUBJECT: &str = "IPFS Initialization Failed";
pub const PIN_FAILED_SUBJECT: &str = "IPFS Pin Failed";
pub const FILE_FAILED_SUBJECT: &str = "IPFS File Upload Failed";
pub const PIN_REMOVAL_FAILED_SUBJECT: &str = "Pin removal failed";

/// Turns notices into mail-send jobs.
#[derive(Clone)]
pub struct Notifier {
    users: Arc<dyn UserDirectory>,
}

impl Notifier {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Best effort: lookup and publish errors are logged, never returned.
    pub async fn notify(&self, publisher: &Publisher, username: &str, notice: &Notice) -> bool {
        let email = match self.users.email_for(username).await {
            Ok(email) => email,
            Err(e) => {
                warn!(user = username, error = %e, "no address to notify");
                return false;
            }
        };
        let message = EmailSend {
            subject: notice.subject.to_string(),
            content: notice.content.clone(),
            content_type: String::new(),
            usernames: vec![username.to_string()],
            emails: vec![email],
        };
        if let Err(e) = publisher.publish(&QueueSpec::EMAIL_SEND, &message).await {
            error!(user = username, error = %e, "failed to publish email send to queue");
            return false;
        }
        true
    }
}

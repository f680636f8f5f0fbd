use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use pinline_core::jobs::EmailSend;
use pinline_core::{Email, Mailer, Operation};
use pinline_queue::QueueSpec;
use tracing::{info, warn};

use crate::outcome::Failure;
use crate::services::Services;
use crate::worker::{Consumer, JobContext};

/// Sends one message per recipient. One delivered message is enough for
/// the job to count as done.
pub struct MailConsumer {
    mailer: Arc<dyn Mailer>,
}

impl MailConsumer {
    pub fn new(services: &Services) -> Self {
        Self {
            mailer: services.mailer.clone(),
        }
    }
}

#[async_trait]
impl Consumer for MailConsumer {
    type Job = EmailSend;

    const QUEUE: QueueSpec = QueueSpec::EMAIL_SEND;
    const OPERATION: Operation = Operation::MailSend;

    async fn handle(&self, _ctx: &JobContext, job: &EmailSend) -> Result<(), Failure> {
        if job.emails.is_empty() {
            return Err(Failure::invalid(
                "recipients",
                anyhow!("mail send without recipients"),
            ));
        }

        let mut sent = 0;
        for (index, address) in job.emails.iter().enumerate() {
            // names line up with addresses by index
            let email = Email {
                to_address: address.clone(),
                to_name: job.usernames.get(index).cloned().unwrap_or_default(),
                subject: job.subject.clone(),
                content: job.content.clone(),
                content_type: job.content_type.clone(),
            };
            match self.mailer.send(&email).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(user = %email.to_name, error = %e, "failed to send email"),
            }
        }

        if sent == 0 {
            return Err(Failure::dependency(
                "send",
                anyhow!("none of {} emails could be sent", job.emails.len()),
            ));
        }
        info!(sent, total = job.emails.len(), "sent email(s)");
        Ok(())
    }
}

use std::sync::Arc;

use pinline_core::policy::refundable;
use pinline_core::{Billing, CreditLedger, Operation};
use pinline_queue::Publisher;
use tracing::{error, info};

use crate::notify::Notifier;
use crate::outcome::Failure;
use crate::services::Services;

/// What was done to make up for a terminal failure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Compensated {
    pub refunded: Option<f64>,
    pub notified: bool,
}

/// Refunds and notifications for failures that will not be retried.
#[derive(Clone)]
pub struct Compensation {
    credits: Arc<dyn CreditLedger>,
    notifier: Notifier,
}

impl Compensation {
    pub fn new(services: &Services) -> Self {
        Self {
            credits: services.credits.clone(),
            notifier: Notifier::new(services.users.clone()),
        }
    }

    pub async fn settle<J: Billing + Sync>(
        &self,
        publisher: &Publisher,
        operation: Operation,
        job: &J,
        failure: &Failure,
    ) -> Compensated {
        let mut done = Compensated::default();
        let username = job.username();
        let cost = job.credit_cost();

        if cost > 0.0 && !failure.committed && refundable(operation, failure.kind) {
            match self.credits.refund(username, cost).await {
                Ok(balance) => {
                    info!(user = username, %operation, amount = cost, balance, "refunded credits");
                    done.refunded = Some(cost);
                }
                Err(e) => {
                    error!(user = username, %operation, amount = cost, error = %e, "failed to refund credits")
                }
            }
        }

        if let Some(notice) = &failure.notice {
            done.notified = self.notifier.notify(publisher, username, notice).await;
        }
        done
    }
}

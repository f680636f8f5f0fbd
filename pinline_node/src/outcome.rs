use pinline_core::FailureKind;

/// Notification mailed to the job's user when a failure becomes terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: &'static str,
    pub content: String,
}

/// Why a job did not complete.
///
/// Handlers only describe the failure. The worker decides whether to
/// redeliver, and runs refunds and notifications once it is terminal.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error:#}")]
pub struct Failure {
    pub kind: FailureKind,
    pub stage: &'static str,
    pub error: anyhow::Error,
    pub notice: Option<Notice>,
    /// An external side effect already happened, so nothing is refunded.
    pub committed: bool,
}

impl Failure {
    pub fn new(kind: FailureKind, stage: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            stage,
            error: error.into(),
            notice: None,
            committed: false,
        }
    }

    pub fn dependency(stage: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self::new(FailureKind::Dependency, stage, error)
    }

    pub fn invalid(stage: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self::new(FailureKind::Invalid, stage, error)
    }

    pub fn with_notice(mut self, subject: &'static str, content: impl Into<String>) -> Self {
        self.notice = Some(Notice {
            subject,
            content: content.into(),
        });
        self
    }

    pub fn committed(mut self) -> Self {
        self.committed = true;
        self
    }
}

use super::JobId;

/// Lifecycle events a queue publishes to its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEventKind {
    Enqueue,
    Complete,
    FailedAttempt,
    Failed,
    Error,
}

impl QueueEventKind {
    /// Every event kind, in the order listeners are bound
    pub const ALL: [QueueEventKind; 5] = [
        Self::Enqueue,
        Self::Complete,
        Self::FailedAttempt,
        Self::Failed,
        Self::Error,
    ];

    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueue => "job enqueue",
            Self::Complete => "job complete",
            Self::FailedAttempt => "job failed attempt",
            Self::Failed => "job failed",
            Self::Error => "job error",
        }
    }
}

impl std::fmt::Display for QueueEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// One lifecycle notification. `error` is only set for [`QueueEventKind::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub kind: QueueEventKind,
    pub job_id: JobId,
    pub error: Option<String>,
}

impl QueueEvent {
    pub fn new(kind: QueueEventKind, job_id: JobId) -> Self {
        Self {
            kind,
            job_id,
            error: None,
        }
    }

    pub fn error(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            kind: QueueEventKind::Error,
            job_id,
            error: Some(error.into()),
        }
    }
}

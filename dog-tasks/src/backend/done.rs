use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::HandlerError;

/// Result a consumer reports for one delivered job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Complete,
    Failed(HandlerError),
}

struct DoneInner {
    sender: Mutex<Option<oneshot::Sender<JobOutcome>>>,
    error: Mutex<Option<HandlerError>>,
}

/// Completion callback for one job delivery.
///
/// Clones share state. The first report wins and every later report is
/// ignored, so a job is reported exactly once.
#[derive(Clone)]
pub struct JobDone {
    inner: Arc<DoneInner>,
}

impl JobDone {
    /// Create a callback and the receiver the backend waits on
    pub fn channel() -> (Self, oneshot::Receiver<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        let done = Self {
            inner: Arc::new(DoneInner {
                sender: Mutex::new(Some(tx)),
                error: Mutex::new(None),
            }),
        };
        (done, rx)
    }

    /// Report success. Returns `false` if the job was already reported.
    pub fn complete(&self) -> bool {
        self.report(JobOutcome::Complete)
    }

    /// Report failure. Returns `false` if the job was already reported.
    pub fn fail(&self, error: HandlerError) -> bool {
        self.report(JobOutcome::Failed(error))
    }

    pub fn is_reported(&self) -> bool {
        self.inner.sender.lock().is_none()
    }

    /// Error carried by the winning report, if it was a failure
    pub fn last_error(&self) -> Option<HandlerError> {
        self.inner.error.lock().clone()
    }

    fn report(&self, outcome: JobOutcome) -> bool {
        let Some(sender) = self.inner.sender.lock().take() else {
            return false;
        };
        if let JobOutcome::Failed(err) = &outcome {
            *self.inner.error.lock() = Some(err.clone());
        }
        // The receiver is gone once the backend stopped waiting (e.g. TTL).
        let _ = sender.send(outcome);
        true
    }
}

impl std::fmt::Debug for JobDone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDone")
            .field("reported", &self.is_reported())
            .finish()
    }
}

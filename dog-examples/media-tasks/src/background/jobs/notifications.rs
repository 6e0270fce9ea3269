use std::sync::atomic::{AtomicUsize, Ordering};

use dog_tasks::prelude::*;
use tracing::info;

#[derive(Default)]
pub struct NotificationJobs {
    sent: AtomicUsize,
}

#[task_handlers]
impl NotificationJobs {
    #[task("send-email")]
    async fn send_email(&self, job: Job) -> Result<(), HandlerError> {
        let to = job.payload["to"]
            .as_str()
            .ok_or_else(|| HandlerError::msg("missing recipient"))?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(to, "Email sent");
        Ok(())
    }

    #[task(name = "daily-digest", priority = "low", attempts = 2)]
    fn daily_digest(&self, job: Job) -> Result<(), HandlerError> {
        info!(created = %job.created_at, "Digest compiled");
        Ok(())
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

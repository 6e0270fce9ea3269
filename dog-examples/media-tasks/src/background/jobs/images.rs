use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dog_tasks::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub image_id: String,
    pub width: u32,
    pub height: u32,
}

/// Image processing handlers
#[derive(Default)]
pub struct ImageJobs {
    resized: AtomicUsize,
}

#[task_handlers]
impl ImageJobs {
    #[task(name = "resize-image", queue = "media", concurrency = 2, ttl = 10000)]
    async fn resize(&self, job: Job) -> Result<(), HandlerError> {
        let request: ResizeRequest = job.data()?;
        if request.width == 0 || request.height == 0 {
            return Err(HandlerError::with_kind("InvalidSize", "width and height must be positive"));
        }

        // stand-in for the actual encoder
        tokio::time::sleep(Duration::from_millis(20 + u64::from(request.width % 50))).await;

        self.resized.fetch_add(1, Ordering::Relaxed);
        info!(image = %request.image_id, width = request.width, height = request.height, "Image resized");
        Ok(())
    }

    #[task(name = "purge-thumbnails", queue = "media", attempts = 3, backoff(delay = 200, strategy = "exponential"))]
    async fn purge(&self, job: Job, done: JobDone) -> Result<(), HandlerError> {
        let prefix = job.payload["prefix"].as_str().unwrap_or("thumbs/");
        info!(prefix, attempt = job.attempts_made, "Purging thumbnails");
        done.complete();
        Ok(())
    }

    pub fn resized(&self) -> usize {
        self.resized.load(Ordering::Relaxed)
    }
}

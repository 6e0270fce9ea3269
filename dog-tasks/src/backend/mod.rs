pub mod done;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    config::ConnectionConfig,
    Job, JobId, NewJob, QueueEvent, QueueEventKind, TaskResult,
};

pub use done::{JobDone, JobOutcome};

/// Future returned by a bound consumer for one delivered job
pub type ConsumerFuture = BoxFuture<'static, ()>;

/// Consumer the backend invokes once per delivered job
pub type ConsumerFn = Arc<dyn Fn(Job, JobDone) -> ConsumerFuture + Send + Sync>;

/// Lifecycle event callback
pub type EventListener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Persistent job store the task layer talks to
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Open a named queue using the process-wide connection settings
    fn create_queue(&self, name: &str, connection: &ConnectionConfig) -> TaskResult<Arc<dyn QueueHandle>>;

    /// Look up any job by id, whatever queue it lives on
    async fn get_job(&self, id: &JobId) -> TaskResult<Job>;
}

/// A named queue owned by the backend
#[async_trait]
pub trait QueueHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Attach a consumer for `task_name`. The backend never runs more than
    /// `concurrency` consumer invocations for that task at once, and calls
    /// the consumer once per delivery.
    fn process(&self, task_name: &str, concurrency: usize, consumer: ConsumerFn) -> TaskResult<()>;

    /// Submit a job and return the stored record
    async fn create(&self, job: NewJob) -> TaskResult<Job>;

    /// Subscribe to a lifecycle event
    fn on(&self, event: QueueEventKind, listener: EventListener);
}

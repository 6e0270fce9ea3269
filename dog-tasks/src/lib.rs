//! # dog-tasks: task registration and queue orchestration
//!
//! dog-tasks turns annotated methods into named background tasks and runs
//! them on a job backend:
//!
//! - **Handler discovery**: `#[task_handlers]` lists the `#[task(...)]`
//!   methods of a type; the registrar binds them to a resolved instance.
//! - **Named tasks, lazy queues**: task names are unique per process, and
//!   each queue is opened once, on first use.
//! - **Bounded consumers**: every task runs with its own concurrency ceiling.
//! - **Execution policy**: TTL, attempts and backoff declared on a task are
//!   applied to every job created for it.
//! - **Observability**: optional tracing spans per invocation and a debug
//!   observer that turns queue lifecycle events into log lines.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_tasks::prelude::*;
//! use serde_json::json;
//!
//! struct Images;
//!
//! #[task_handlers]
//! impl Images {
//!     #[task(name = "resize-image", queue = "media", concurrency = 2)]
//!     async fn resize(&self, job: Job) -> Result<(), HandlerError> {
//!         let _width = job.payload["width"].as_u64();
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let manager = Arc::new(QueueManager::new(MemoryBackend::new(), TaskSettings::default())?);
//! manager.register_handlers_on(Arc::new(Images))?;
//!
//! let job = manager.create_job("resize-image", json!({ "width": 640 })).await?;
//! assert_eq!(job.queue, "media");
//! # Ok::<(), TaskError>(())
//! # }).unwrap();
//! ```

extern crate self as dog_tasks;

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod observability;
pub mod registry;
pub mod types;

pub use backend::memory::{IdMode, MemoryBackend};
pub use backend::{JobDone, JobOutcome, QueueBackend, QueueHandle};
pub use config::{ConnectionConfig, ConnectionStrategy, TaskSettings};
pub use dispatcher::{Dispatcher, TaskFuture, TaskHandler, SERVICE_SUFFIX};
pub use error::{HandlerError, TaskError, TaskResult, TTL_EXCEEDED};
pub use manager::{QueueManager, MODULE_NAME};
pub use registry::{
    InstanceRegistry, InstanceResolver, TaskMetadataExplorer, TaskMethod, TaskProperties, TaskProvider,
    TaskRegistrar,
};
pub use types::metadata::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_NAME};
pub use types::{
    Backoff, BackoffStrategy, Job, JobId, JobPriority, JobState, NewJob, QueueEvent, QueueEventKind, TaskMetadata,
    TaskOptions, TaskRef,
};

pub use dog_tasks_macros::task_handlers;

/// Everything needed to declare, register and enqueue tasks
pub mod prelude {
    pub use crate::{
        task_handlers, HandlerError, Job, JobDone, QueueManager, TaskError, TaskOptions, TaskProvider,
        TaskRegistrar, TaskResult, TaskSettings,
    };

    pub use crate::{InstanceRegistry, MemoryBackend};

    pub use crate::observability::{Tracer, TracingTracer};

    pub use async_trait::async_trait;
}

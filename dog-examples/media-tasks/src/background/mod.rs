//! Background tasks of the media service.

pub mod jobs;

use std::sync::Arc;

use anyhow::Result;
use dog_tasks::prelude::*;
use dog_tasks::{InstanceResolver, Job, JobId};
use serde_json::Value;
use tracing::info;

pub use jobs::*;

/// Task manager, registrar and the handler instances they run
pub struct TaskSystem {
    manager: Arc<QueueManager>,
    registrar: TaskRegistrar,
    instances: Arc<InstanceRegistry>,
    pub images: Arc<ImageJobs>,
    pub notifications: Arc<NotificationJobs>,
}

impl TaskSystem {
    pub fn new(settings: TaskSettings) -> Result<Self> {
        let manager = Arc::new(QueueManager::new(MemoryBackend::new(), settings)?);
        manager.set_tracer(Arc::new(TracingTracer::new(crate::config::service_name())));

        let images = Arc::new(ImageJobs::default());
        let notifications = Arc::new(NotificationJobs::default());

        let instances = Arc::new(InstanceRegistry::new());
        instances.insert(images.clone());
        instances.insert(notifications.clone());

        let registrar = TaskRegistrar::new(manager.clone());
        registrar.set_resolver(instances.clone() as Arc<dyn InstanceResolver>);

        Ok(Self {
            manager,
            registrar,
            instances,
            images,
            notifications,
        })
    }

    /// Register every handler type of the service
    pub fn register(&self) -> Result<()> {
        let mut registered = self.registrar.register::<ImageJobs>()?;
        registered.extend(self.registrar.register::<NotificationJobs>()?);
        info!(
            tasks = registered.len(),
            instances = self.instances.len(),
            "Background tasks registered"
        );
        Ok(())
    }

    pub fn manager(&self) -> &Arc<QueueManager> {
        &self.manager
    }

    pub async fn enqueue(&self, task: &str, payload: Value) -> Result<Job> {
        Ok(self.manager.create_job(task, payload).await?)
    }

    /// Poll until the job completes or fails
    pub async fn wait_for(&self, id: &JobId) -> Result<Job> {
        loop {
            let job = self.manager.get_job(id.clone()).await?;
            if job.state.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }
}

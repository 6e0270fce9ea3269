use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{InstanceResolver, TaskProvider};
use crate::{QueueManager, TaskError, TaskMetadata, TaskResult};

/// Registers provider instances' task handlers with a [`QueueManager`].
///
/// Instances are looked up through an [`InstanceResolver`] that must be
/// installed with [`TaskRegistrar::set_resolver`] before [`register`].
///
/// [`register`]: TaskRegistrar::register
pub struct TaskRegistrar {
    manager: Arc<QueueManager>,
    resolver: RwLock<Option<Arc<dyn InstanceResolver>>>,
}

impl TaskRegistrar {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self {
            manager,
            resolver: RwLock::new(None),
        }
    }

    pub fn set_resolver(&self, resolver: Arc<dyn InstanceResolver>) {
        *self.resolver.write() = Some(resolver);
    }

    pub fn manager(&self) -> &Arc<QueueManager> {
        &self.manager
    }

    /// Resolve the instance of `T` and register its handlers.
    ///
    /// A type with no resolvable instance registers nothing.
    pub fn register<T: TaskProvider>(&self) -> TaskResult<Vec<TaskMetadata>> {
        let resolver = self.resolver.read().clone().ok_or(TaskError::UnboundRegistry)?;
        match resolver.resolve::<T>() {
            Some(instance) => self.register_handlers_on(instance),
            None => {
                debug!(provider = std::any::type_name::<T>(), "No instance to register");
                Ok(Vec::new())
            }
        }
    }

    pub fn register_handlers_on<T: TaskProvider>(&self, instance: Arc<T>) -> TaskResult<Vec<TaskMetadata>> {
        self.manager.register_handlers_on(instance)
    }
}

use std::sync::Arc;

use crate::{
    backend::JobDone,
    dispatcher::{TaskFuture, TaskHandler},
    Job, TaskMetadata, TaskOptions, TaskResult,
};

/// Handler method of a provider, taking the provider instance it is bound to
pub type MethodHandler<T> = fn(Arc<T>, Job, JobDone) -> TaskFuture;

/// One method of a provider type, annotated as a task or not
pub struct TaskMethod<T> {
    pub method: &'static str,
    pub task: Option<(TaskOptions, MethodHandler<T>)>,
}

impl<T> TaskMethod<T> {
    pub fn task(method: &'static str, options: impl Into<TaskOptions>, handler: MethodHandler<T>) -> Self {
        Self {
            method,
            task: Some((options.into(), handler)),
        }
    }

    /// A method without task metadata; exploration skips it
    pub fn plain(method: &'static str) -> Self {
        Self { method, task: None }
    }
}

/// A type whose methods may be task handlers.
///
/// Implement it with `#[task_handlers]` on the impl block, or by hand:
///
/// ```
/// use std::sync::Arc;
/// use dog_tasks::{HandlerError, Job, JobDone, TaskFuture, TaskMethod, TaskOptions, TaskProvider};
///
/// struct Mailer;
///
/// impl Mailer {
///     async fn send(&self, _job: Job) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
///
/// impl TaskProvider for Mailer {
///     fn task_methods() -> Vec<TaskMethod<Self>> {
///         vec![TaskMethod::task(
///             "send",
///             TaskOptions::named("send-email").queue("mail"),
///             |this: Arc<Self>, job: Job, _done: JobDone| -> TaskFuture {
///                 Box::pin(async move { this.send(job).await })
///             },
///         )]
///     }
/// }
/// ```
pub trait TaskProvider: Send + Sync + 'static {
    /// Methods in declaration order
    fn task_methods() -> Vec<TaskMethod<Self>>
    where
        Self: Sized;
}

/// A handler bound to its instance together with validated metadata
#[derive(Clone)]
pub struct TaskProperties {
    pub method: &'static str,
    pub handler: TaskHandler,
    pub metadata: TaskMetadata,
}

impl std::fmt::Debug for TaskProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProperties")
            .field("method", &self.method)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Finds the task handlers of a provider instance
pub struct TaskMetadataExplorer;

impl TaskMetadataExplorer {
    /// Yield one entry per annotated method, in declaration order.
    ///
    /// Metadata is validated as the iterator advances; an invalid
    /// annotation yields an error for that method only.
    pub fn explore<T: TaskProvider>(instance: Arc<T>) -> impl Iterator<Item = TaskResult<TaskProperties>> {
        T::task_methods()
            .into_iter()
            .filter_map(move |method| Self::explore_method(&instance, method))
    }

    /// `None` when the method carries no task metadata
    pub fn explore_method<T: TaskProvider>(
        instance: &Arc<T>,
        method: TaskMethod<T>,
    ) -> Option<TaskResult<TaskProperties>> {
        let (options, handler) = method.task?;
        let name = method.method;
        Some(options.validate(name).map(|metadata| {
            let instance = instance.clone();
            TaskProperties {
                method: name,
                handler: Arc::new(move |job, done| handler(instance.clone(), job, done)),
                metadata,
            }
        }))
    }
}

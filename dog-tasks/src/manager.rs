use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    backend::{QueueBackend, QueueHandle},
    config::{select_connection, ConfigurationWarning, ConnectionConfig, TaskSettings},
    dispatcher::{Dispatcher, TaskHandler},
    observability::{DebugObserver, Notifier, Tracer, TracingNotifier},
    registry::{TaskMetadataExplorer, TaskProperties, TaskProvider},
    Job, JobId, NewJob, TaskError, TaskMetadata, TaskRef, TaskResult, DEFAULT_QUEUE_NAME,
};

/// Module name attached to the layer's log lines
pub const MODULE_NAME: &str = "TaskModule";

/// Scope of the "Registered task ..." notices
pub const EXPLORER_SCOPE: &str = "TaskExplorer";

/// Owns the queues of a process and the registry of named tasks.
///
/// Queues are created lazily, once per name. Task names are unique across
/// all queues.
pub struct QueueManager {
    backend: Arc<dyn QueueBackend>,
    settings: TaskSettings,
    connection: ConnectionConfig,
    warnings: Vec<ConfigurationWarning>,
    queues: RwLock<HashMap<String, Arc<dyn QueueHandle>>>,
    tasks: RwLock<HashMap<String, TaskMetadata>>,
    debug_bound: AtomicBool,
    dispatcher: Dispatcher,
    notifier: Arc<dyn Notifier>,
}

impl QueueManager {
    /// Create a manager and its default queue
    pub fn new<B: QueueBackend + 'static>(backend: B, settings: TaskSettings) -> TaskResult<Self> {
        Self::with_notifier(backend, settings, Arc::new(TracingNotifier))
    }

    /// Create a manager that sends its notices to `notifier`
    pub fn with_notifier<B: QueueBackend + 'static>(
        backend: B,
        settings: TaskSettings,
        notifier: Arc<dyn Notifier>,
    ) -> TaskResult<Self> {
        let selection = select_connection(&settings);
        info!(connection = %selection.config.strategy, "Task queues configured");

        let manager = Self {
            backend: Arc::new(backend),
            connection: selection.config,
            warnings: selection.warnings,
            settings,
            queues: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            debug_bound: AtomicBool::new(false),
            dispatcher: Dispatcher::new(),
            notifier,
        };

        manager.get_or_create_queue(DEFAULT_QUEUE_NAME)?;

        if manager.settings.ui_enabled {
            warn!(
                port = manager.settings.ui_port,
                "UI_ENABLED is set but no dashboard ships with this backend"
            );
        }

        Ok(manager)
    }

    /// Return the queue named `name`, creating it on first use
    pub fn get_or_create_queue(&self, name: &str) -> TaskResult<Arc<dyn QueueHandle>> {
        if let Some(queue) = self.queues.read().get(name) {
            return Ok(queue.clone());
        }

        let mut queues = self.queues.write();
        if let Some(queue) = queues.get(name) {
            return Ok(queue.clone());
        }
        let queue = self.create_queue(name)?;
        queues.insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    fn create_queue(&self, name: &str) -> TaskResult<Arc<dyn QueueHandle>> {
        let queue = self.backend.create_queue(name, &self.connection)?;
        if name == DEFAULT_QUEUE_NAME && self.settings.debug {
            self.bind_debug(&queue);
        }
        debug!(queue = name, "Queue created");
        Ok(queue)
    }

    fn bind_debug(&self, queue: &Arc<dyn QueueHandle>) {
        if self
            .debug_bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        DebugObserver::bind(queue, self.backend.clone(), self.notifier.clone());
    }

    /// Register one task
    pub fn register_task(&self, handler: TaskHandler, metadata: TaskMetadata) -> TaskResult<()> {
        self.register_tasks(vec![(metadata, handler)])
    }

    /// Register a batch of tasks.
    ///
    /// The batch is rejected as a whole when any name is already registered
    /// or appears twice, or when a consumer cannot be bound. Consumers are
    /// bound only when processing starts automatically, which requires a
    /// running tokio runtime.
    pub fn register_tasks(&self, batch: Vec<(TaskMetadata, TaskHandler)>) -> TaskResult<()> {
        let mut tasks = self.tasks.write();

        {
            let mut seen = HashSet::new();
            for (metadata, _) in &batch {
                if tasks.contains_key(metadata.name()) || !seen.insert(metadata.name()) {
                    return Err(TaskError::DuplicateTaskName(metadata.name().to_string()));
                }
            }
        }

        if self.settings.start_processing && tokio::runtime::Handle::try_current().is_err() {
            return Err(TaskError::Backend(
                "task consumers need a running tokio runtime; register inside one or disable START_PROCESSING"
                    .to_string(),
            ));
        }

        let queues = batch
            .iter()
            .map(|(metadata, _)| self.get_or_create_queue(metadata.queue_name()))
            .collect::<TaskResult<Vec<_>>>()?;

        let mut registered = Vec::with_capacity(batch.len());
        for ((metadata, handler), queue) in batch.into_iter().zip(queues) {
            if self.settings.start_processing {
                self.dispatcher.bind(&queue, &metadata, handler)?;
            }
            registered.push(metadata);
        }

        for metadata in registered {
            tasks.insert(metadata.name().to_string(), metadata);
        }
        Ok(())
    }

    /// Explore `instance` and register every task handler it declares.
    ///
    /// Returns the registered metadata in declaration order.
    pub fn register_handlers_on<T: TaskProvider>(&self, instance: Arc<T>) -> TaskResult<Vec<TaskMetadata>> {
        let found = TaskMetadataExplorer::explore(instance).collect::<TaskResult<Vec<TaskProperties>>>()?;
        let registered: Vec<TaskMetadata> = found.iter().map(|p| p.metadata.clone()).collect();

        self.register_tasks(found.into_iter().map(|p| (p.metadata, p.handler)).collect())?;

        for metadata in &registered {
            self.notifier
                .notify(MODULE_NAME, &registration_notice(metadata), Some(EXPLORER_SCOPE));
        }
        Ok(registered)
    }

    /// Submit a job for the task identified by `task`.
    ///
    /// Execution policy declared on the task is applied only where declared.
    #[instrument(skip(self, task, payload), fields(task = task.task_name()))]
    pub async fn create_job<R: TaskRef + ?Sized>(&self, task: &R, payload: Value) -> TaskResult<Job> {
        let name = task.task_name();
        let metadata = self
            .tasks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        let queue = self.get_or_create_queue(metadata.queue_name())?;

        let mut new_job = NewJob::new(metadata.name(), payload);
        if let Some(ttl) = metadata.ttl() {
            new_job = new_job.ttl(ttl);
        }
        if let Some(attempts) = metadata.attempts() {
            new_job = new_job.attempts(attempts);
        }
        if let Some(backoff) = metadata.backoff() {
            new_job = new_job.backoff(backoff.clone());
        }

        let job = queue.create(new_job).await?;
        debug!(job = %job.id, queue = %job.queue, "Job created");
        Ok(job)
    }

    /// Look up a job by id on the backend
    pub async fn get_job(&self, id: impl Into<JobId>) -> TaskResult<Job> {
        let id = id.into();
        self.backend.get_job(&id).await.map_err(|err| match err {
            TaskError::JobNotFound(id) => TaskError::JobNotFound(id),
            other => TaskError::JobNotFound(format!("{}: {}", id, other)),
        })
    }

    /// Trace every handler invocation with `tracer`. Returns the service
    /// name the spans are tagged with.
    pub fn set_tracer(&self, tracer: Arc<dyn Tracer>) -> String {
        let service_name = self.dispatcher.set_tracer(tracer);
        debug!(service = %service_name, "Task tracer installed");
        service_name
    }

    pub fn task(&self, name: &str) -> Option<TaskMetadata> {
        self.tasks.read().get(name).cloned()
    }

    /// Registered task names, sorted
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn queue(&self, name: &str) -> Option<Arc<dyn QueueHandle>> {
        self.queues.read().get(name).cloned()
    }

    /// Names of the queues created so far, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Problems found while selecting the connection
    pub fn warnings(&self) -> &[ConfigurationWarning] {
        &self.warnings
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.settings
    }

    pub fn is_debug_bound(&self) -> bool {
        self.debug_bound.load(Ordering::Acquire)
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}

fn registration_notice(metadata: &TaskMetadata) -> String {
    let mut notice = format!("Registered task {}", metadata.name());
    if let Some(queue) = metadata.queue() {
        notice.push_str(&format!(" on queue {}", queue));
    }
    if let Some(concurrency) = metadata.concurrency() {
        notice.push_str(&format!(" with a concurrency of {}", concurrency));
    }
    notice
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tracing_test::traced_test;

    use crate::{
        backend::{memory::MemoryBackend, JobDone},
        config::ConnectionStrategy,
        dispatcher::TaskFuture,
        observability::MemoryNotifier,
        HandlerError, TaskOptions,
    };

    struct Mailer;

    #[crate::task_handlers]
    impl Mailer {
        #[task(name = "send-email", queue = "mail", concurrency = 3)]
        async fn send(&self, _job: Job) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn settings(pairs: &[(&str, &str)]) -> TaskSettings {
        TaskSettings::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_registration_notice() {
        let plain = TaskOptions::named("send-email").build().unwrap();
        assert_eq!(registration_notice(&plain), "Registered task send-email");

        let full = TaskOptions::named("resize-image")
            .queue("media")
            .concurrency(2)
            .build()
            .unwrap();
        assert_eq!(
            registration_notice(&full),
            "Registered task resize-image on queue media with a concurrency of 2"
        );
    }

    #[tokio::test]
    async fn test_default_queue_created_on_construction() {
        let backend = MemoryBackend::new();
        let manager = QueueManager::new(backend.clone(), TaskSettings::default()).unwrap();

        assert_eq!(manager.queue_names(), vec!["default".to_string()]);
        assert_eq!(backend.opened_queues().len(), 1);

        let again = manager.get_or_create_queue("default").unwrap();
        assert_eq!(again.name(), "default");
        assert_eq!(backend.opened_queues().len(), 1);
    }

    #[tokio::test]
    async fn test_debug_observer_bound_once() {
        let notifier = Arc::new(MemoryNotifier::new());
        let manager = QueueManager::with_notifier(
            MemoryBackend::new(),
            settings(&[("DEBUG", "1")]),
            notifier.clone(),
        )
        .unwrap();
        assert!(manager.is_debug_bound());

        // a second default queue instance must not get another observer
        let _ = manager.create_queue(DEFAULT_QUEUE_NAME).unwrap();

        let handler: TaskHandler = Arc::new(|_job: Job, _done: JobDone| -> TaskFuture { Box::pin(async { Ok(()) }) });
        manager
            .register_task(handler, TaskOptions::named("send-email").build().unwrap())
            .unwrap();
        manager.create_job("send-email", Value::Null).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let enqueued: Vec<_> = notifier
            .notices()
            .into_iter()
            .filter(|n| n.message == "Task send-email job enqueue")
            .collect();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].module, MODULE_NAME);
        assert_eq!(enqueued[0].scope.as_deref(), Some("TaskRunner"));
    }

    #[test]
    fn test_registration_outside_runtime_registers_nothing() {
        let manager = QueueManager::new(MemoryBackend::new(), TaskSettings::default()).unwrap();
        let handler: TaskHandler = Arc::new(|_job: Job, _done: JobDone| -> TaskFuture { Box::pin(async { Ok(()) }) });

        let err = manager
            .register_task(handler, TaskOptions::named("t").queue("media").build().unwrap())
            .unwrap_err();
        assert!(matches!(err, TaskError::Backend(_)));
        assert!(manager.task("t").is_none());
        assert!(manager.task_names().is_empty());

        let err = manager.register_handlers_on(Arc::new(Mailer)).unwrap_err();
        assert!(matches!(err, TaskError::Backend(_)));
        assert!(manager.task("send-email").is_none());
    }

    #[test]
    fn test_deferred_registration_outside_runtime() {
        let manager = QueueManager::new(MemoryBackend::new(), settings(&[("START_PROCESSING", "false")])).unwrap();
        manager.register_handlers_on(Arc::new(Mailer)).unwrap();
        assert_eq!(manager.task_names(), vec!["send-email".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_bind_leaves_registry_untouched() {
        let manager = QueueManager::new(MemoryBackend::new(), TaskSettings::default()).unwrap();
        let mail = manager.get_or_create_queue("mail").unwrap();
        let consumer: crate::backend::ConsumerFn =
            Arc::new(|_job: Job, _done: JobDone| -> crate::backend::ConsumerFuture { Box::pin(async {}) });
        mail.process("send-email", 1, consumer).unwrap();

        let err = manager.register_handlers_on(Arc::new(Mailer)).unwrap_err();
        assert!(matches!(err, TaskError::Backend(_)));
        assert!(manager.task("send-email").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_opens_one_queue() {
        let backend = MemoryBackend::new();
        let manager = Arc::new(QueueManager::new(backend.clone(), TaskSettings::default()).unwrap());

        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let racers: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    manager.get_or_create_queue("media").unwrap().name().to_string()
                })
            })
            .collect();
        for racer in racers {
            assert_eq!(racer.await.unwrap(), "media");
        }

        let opened: Vec<_> = backend
            .opened_queues()
            .into_iter()
            .filter(|(name, _)| name == "media")
            .collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(manager.queue_names(), vec!["default".to_string(), "media".to_string()]);
    }

    #[tokio::test]
    async fn test_debug_observer_not_bound_by_default() {
        let manager = QueueManager::new(MemoryBackend::new(), TaskSettings::default()).unwrap();
        assert!(!manager.is_debug_bound());
    }

    #[tokio::test]
    async fn test_get_job_maps_misses() {
        let manager = QueueManager::new(MemoryBackend::new(), TaskSettings::default()).unwrap();
        let err = manager.get_job("42").await.unwrap_err();
        assert!(matches!(err, TaskError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_sentinel_fallback_is_recorded() {
        let backend = MemoryBackend::new();
        let manager = QueueManager::new(
            backend.clone(),
            settings(&[
                ("REDIS_SENTINEL", "true"),
                ("REDIS_HOST", "cache"),
                ("REDIS_PORT", "6380"),
            ]),
        )
        .unwrap();

        assert_eq!(manager.warnings().len(), 1);
        assert_eq!(manager.warnings()[0].key, "REDIS_SENTINEL_MASTER");
        assert_eq!(
            manager.connection().strategy,
            ConnectionStrategy::HostPortDb {
                host: Some("cache".to_string()),
                port: Some(6380),
                db: None,
            }
        );
        assert_eq!(backend.opened_queues()[0].1, *manager.connection());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_registration_is_logged() {
        let manager = QueueManager::new(MemoryBackend::new(), TaskSettings::default()).unwrap();
        manager.register_handlers_on(Arc::new(Mailer)).unwrap();

        assert_eq!(manager.queue_names(), vec!["default".to_string(), "mail".to_string()]);
        assert!(logs_contain("Registered task send-email on queue mail with a concurrency of 3"));
    }
}

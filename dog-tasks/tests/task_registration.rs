use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use dog_tasks::{
    observability::MemoryNotifier, prelude::*, InstanceResolver, JobPriority, JobState, TaskFuture, TaskHandler,
    TaskMethod, TaskRef,
};

fn deferred() -> TaskSettings {
    TaskSettings::from_pairs([("START_PROCESSING", "false")])
}

fn noop() -> TaskHandler {
    Arc::new(|_job: Job, _done: JobDone| -> TaskFuture { Box::pin(async { Ok(()) }) })
}

struct Media;

#[task_handlers]
impl Media {
    #[task(name = "resize-image", queue = "media", concurrency = 2)]
    async fn resize(&self, _job: Job) -> Result<(), HandlerError> {
        Ok(())
    }

    fn helper(&self) -> usize {
        1
    }

    #[task("send-email")]
    async fn send(&self, _job: Job, done: JobDone) -> Result<(), HandlerError> {
        done.complete();
        Ok(())
    }

    #[task(name = "generate-report", ttl = 5000, attempts = 3, priority = 10)]
    async fn report(&self, _job: Job) -> Result<(), HandlerError> {
        Ok(())
    }

    #[task(name = "sync-inventory", backoff(delay = 250, strategy = "exponential"), priority = "high")]
    async fn sync(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

struct Newsletter;

#[task_handlers]
impl Newsletter {
    #[task("publish-digest")]
    async fn publish(&self, _job: Job) -> Result<(), HandlerError> {
        Ok(())
    }

    #[task("send-email")]
    async fn resend(&self, _job: Job) -> Result<(), HandlerError> {
        Ok(())
    }
}

struct Broken;

impl Broken {
    fn noop(_this: Arc<Self>, _job: Job, _done: JobDone) -> TaskFuture {
        Box::pin(async { Ok(()) })
    }
}

impl TaskProvider for Broken {
    fn task_methods() -> Vec<TaskMethod<Self>> {
        vec![
            TaskMethod::task("valid", TaskOptions::named("valid-task"), Self::noop),
            TaskMethod::task("unnamed", TaskOptions::new().queue("media"), Self::noop),
        ]
    }
}

#[test]
fn test_macro_lists_methods_in_order() {
    let methods = Media::task_methods();
    let names: Vec<_> = methods.iter().map(|m| m.method).collect();
    assert_eq!(names, vec!["resize", "helper", "send", "report", "sync"]);
    assert!(methods[1].task.is_none());
    assert_eq!(Media.helper(), 1);
}

#[test]
fn test_register_handlers_on() {
    let notifier = Arc::new(MemoryNotifier::new());
    let manager = QueueManager::with_notifier(MemoryBackend::new(), deferred(), notifier.clone()).unwrap();

    let registered = manager.register_handlers_on(Arc::new(Media)).unwrap();
    let names: Vec<_> = registered.iter().map(|m| m.name().to_string()).collect();
    assert_eq!(names, vec!["resize-image", "send-email", "generate-report", "sync-inventory"]);

    assert_eq!(manager.queue_names(), vec!["default".to_string(), "media".to_string()]);
    assert_eq!(manager.task("resize-image").unwrap().effective_concurrency(), 2);
    assert_eq!(manager.task("send-email").unwrap().queue_name(), "default");
    assert_eq!(manager.task("sync-inventory").unwrap().job_priority(), Some(JobPriority::High));
    assert_eq!(manager.task("generate-report").unwrap().priority(), Some("10"));

    let notices = notifier.notices();
    assert_eq!(
        notices.iter().map(|n| n.message.as_str()).collect::<Vec<_>>(),
        vec![
            "Registered task resize-image on queue media with a concurrency of 2",
            "Registered task send-email",
            "Registered task generate-report",
            "Registered task sync-inventory",
        ]
    );
    assert!(notices.iter().all(|n| n.module == "TaskModule"));
    assert!(notices.iter().all(|n| n.scope.as_deref() == Some("TaskExplorer")));
}

#[test]
fn test_duplicate_name_rejects_whole_batch() {
    let notifier = Arc::new(MemoryNotifier::new());
    let manager = QueueManager::with_notifier(MemoryBackend::new(), deferred(), notifier.clone()).unwrap();
    manager.register_handlers_on(Arc::new(Media)).unwrap();
    let before = manager.task_names();
    let notices_before = notifier.notices().len();

    let err = manager.register_handlers_on(Arc::new(Newsletter)).unwrap_err();
    assert_eq!(err, TaskError::DuplicateTaskName("send-email".to_string()));

    assert_eq!(manager.task_names(), before);
    assert!(manager.task("publish-digest").is_none());
    assert_eq!(notifier.notices().len(), notices_before);
}

#[test]
fn test_duplicate_name_within_one_batch() {
    let manager = QueueManager::new(MemoryBackend::new(), deferred()).unwrap();
    let batch = vec![
        (TaskOptions::named("a").build().unwrap(), noop()),
        (TaskOptions::named("b").build().unwrap(), noop()),
        (TaskOptions::named("a").queue("other").build().unwrap(), noop()),
    ];

    let err = manager.register_tasks(batch).unwrap_err();
    assert_eq!(err, TaskError::DuplicateTaskName("a".to_string()));
    assert!(manager.task_names().is_empty());
    assert_eq!(manager.queue_names(), vec!["default".to_string()]);
}

#[test]
fn test_invalid_metadata_registers_nothing() {
    let manager = QueueManager::new(MemoryBackend::new(), deferred()).unwrap();

    let err = manager.register_handlers_on(Arc::new(Broken)).unwrap_err();
    assert!(matches!(err, TaskError::InvalidTaskMetadata { ref method, .. } if method == "unnamed"));
    assert!(manager.task("valid-task").is_none());
}

#[test]
fn test_register_requires_resolver() {
    let manager = Arc::new(QueueManager::new(MemoryBackend::new(), deferred()).unwrap());
    let registrar = TaskRegistrar::new(manager);

    assert_eq!(registrar.register::<Media>().unwrap_err(), TaskError::UnboundRegistry);
}

#[test]
fn test_register_through_resolver() {
    let manager = Arc::new(QueueManager::new(MemoryBackend::new(), deferred()).unwrap());
    let registrar = TaskRegistrar::new(manager.clone());

    let instances = Arc::new(InstanceRegistry::new());
    instances.insert(Arc::new(Media));
    registrar.set_resolver(instances.clone() as Arc<dyn InstanceResolver>);

    assert_eq!(registrar.register::<Media>().unwrap().len(), 4);
    assert!(registrar.register::<Newsletter>().unwrap().is_empty());
    assert_eq!(manager.task_names().len(), 4);
}

#[tokio::test]
async fn test_unknown_task_creates_nothing() {
    let backend = MemoryBackend::new();
    let manager = QueueManager::new(backend.clone(), deferred()).unwrap();

    let err = manager.create_job("missing", json!({})).await.unwrap_err();
    assert_eq!(err, TaskError::UnknownTask("missing".to_string()));
    assert_eq!(backend.job_count(), 0);
}

#[tokio::test]
async fn test_declared_policy_applied_to_jobs() {
    let manager = QueueManager::new(MemoryBackend::new(), deferred()).unwrap();
    manager.register_handlers_on(Arc::new(Media)).unwrap();

    let report = manager.create_job("generate-report", json!({ "month": 3 })).await.unwrap();
    assert_eq!(report.ttl, Some(Duration::from_millis(5000)));
    assert_eq!(report.attempts, Some(3));
    assert!(report.backoff.is_none());
    assert_eq!(report.queue, "default");

    let resize = manager.create_job("resize-image", json!({ "width": 64 })).await.unwrap();
    assert_eq!(resize.queue, "media");
    assert!(resize.ttl.is_none());
    assert!(resize.attempts.is_none());
    assert!(resize.backoff.is_none());

    let sync = manager.create_job("sync-inventory", json!(null)).await.unwrap();
    let delay = sync.backoff.unwrap().delay_for(2, Duration::ZERO);
    assert_eq!(delay, Some(Duration::from_millis(375)));

    let stored = manager.get_job(report.id.clone()).await.unwrap();
    assert_eq!(stored.state, JobState::Inactive);
    assert_eq!(stored.payload, json!({ "month": 3 }));
}

#[tokio::test]
async fn test_create_job_by_metadata() {
    let manager = QueueManager::new(MemoryBackend::new(), deferred()).unwrap();
    let registered = manager.register_handlers_on(Arc::new(Media)).unwrap();

    let job = manager.create_job(&registered[0], json!({})).await.unwrap();
    assert_eq!(job.task_name, registered[0].task_name());

    let name = String::from("send-email");
    let job = manager.create_job(&name, json!({})).await.unwrap();
    assert_eq!(job.task_name, "send-email");
}

proptest! {
    #[test]
    fn registered_names_stay_unique(names in proptest::collection::hash_set("[a-z]{1,8}(-[a-z]{1,8})?", 1..8)) {
        let manager = QueueManager::new(MemoryBackend::new(), deferred()).unwrap();

        for name in &names {
            manager
                .register_task(noop(), TaskOptions::named(name.as_str()).build().unwrap())
                .unwrap();
        }
        for name in &names {
            let again = TaskOptions::named(name.as_str()).queue("elsewhere").build().unwrap();
            prop_assert_eq!(
                manager.register_task(noop(), again).unwrap_err(),
                TaskError::DuplicateTaskName(name.clone())
            );
        }

        prop_assert_eq!(manager.task_names().len(), names.len());
        prop_assert_eq!(manager.queue_names(), vec!["default".to_string()]);
    }
}

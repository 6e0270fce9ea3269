use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use super::storage::MemoryStore;
use crate::{
    backend::{ConsumerFn, EventListener, JobDone, JobOutcome, QueueHandle},
    HandlerError, Job, JobId, JobState, NewJob, QueueEvent, QueueEventKind, TaskError, TaskResult,
};

#[derive(Default)]
struct Routing {
    consumers: HashMap<String, mpsc::UnboundedSender<JobId>>,
    /// Jobs for tasks nobody consumes yet
    pending: HashMap<String, VecDeque<JobId>>,
}

struct QueueInner {
    name: String,
    store: Arc<MemoryStore>,
    retry_delay: Duration,
    routing: Mutex<Routing>,
    listeners: RwLock<HashMap<QueueEventKind, Vec<EventListener>>>,
}

/// A queue of the in-memory backend
pub struct MemoryQueue {
    inner: Arc<QueueInner>,
}

impl MemoryQueue {
    pub(crate) fn new(name: &str, store: Arc<MemoryStore>, retry_delay: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.to_string(),
                store,
                retry_delay,
                routing: Mutex::new(Routing::default()),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Number of jobs waiting for a consumer for `task_name`
    pub fn pending_count(&self, task_name: &str) -> usize {
        self.inner
            .routing
            .lock()
            .pending
            .get(task_name)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl QueueHandle for MemoryQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn process(&self, task_name: &str, concurrency: usize, consumer: ConsumerFn) -> TaskResult<()> {
        let runtime = Handle::try_current().map_err(|_| {
            TaskError::Backend(format!(
                "consumer for `{}` on queue `{}` needs a running tokio runtime",
                task_name, self.inner.name
            ))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routing = self.inner.routing.lock();
            if routing.consumers.contains_key(task_name) {
                return Err(TaskError::Backend(format!(
                    "a consumer for `{}` is already bound on queue `{}`",
                    task_name, self.inner.name
                )));
            }
            for job_id in routing.pending.remove(task_name).unwrap_or_default() {
                let _ = tx.send(job_id);
            }
            routing.consumers.insert(task_name.to_string(), tx);
        }

        let inner = self.inner.clone();
        runtime.spawn(inner.run_consumer(concurrency.max(1), consumer, rx));
        debug!(queue = %self.inner.name, task = task_name, concurrency, "Consumer attached");
        Ok(())
    }

    async fn create(&self, new_job: NewJob) -> TaskResult<Job> {
        let job = self.inner.store.insert(&self.inner.name, new_job);
        self.inner.emit(QueueEvent::new(QueueEventKind::Enqueue, job.id.clone()));
        self.inner.route(&job.task_name, job.id.clone());
        Ok(job)
    }

    fn on(&self, event: QueueEventKind, listener: EventListener) {
        self.inner.listeners.write().entry(event).or_default().push(listener);
    }
}

impl QueueInner {
    fn route(&self, task_name: &str, job_id: JobId) {
        let mut routing = self.routing.lock();
        match routing.consumers.get(task_name) {
            Some(tx) => {
                if tx.send(job_id.clone()).is_err() {
                    warn!(queue = %self.name, task = task_name, "Consumer stopped, keeping job {} pending", job_id);
                    routing.consumers.remove(task_name);
                    routing.pending.entry(task_name.to_string()).or_default().push_back(job_id);
                }
            }
            None => routing.pending.entry(task_name.to_string()).or_default().push_back(job_id),
        }
    }

    fn emit(&self, event: QueueEvent) {
        let listeners = self
            .listeners
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(&event);
        }
    }

    async fn run_consumer(
        self: Arc<Self>,
        concurrency: usize,
        consumer: ConsumerFn,
        mut rx: mpsc::UnboundedReceiver<JobId>,
    ) {
        let permits = Arc::new(Semaphore::new(concurrency));
        while let Some(job_id) = rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let inner = self.clone();
            let consumer = consumer.clone();
            tokio::spawn(async move {
                inner.run_job(job_id, consumer).await;
                drop(permit);
            });
        }
    }

    async fn run_job(self: Arc<Self>, job_id: JobId, consumer: ConsumerFn) {
        let Some(job) = self.store.activate(&job_id) else {
            return;
        };

        let (done, outcome_rx) = JobDone::channel();
        let handler = consumer(job.clone(), done.clone());
        let mut running = Box::pin(async move {
            handler.await;
            outcome_rx
                .await
                .unwrap_or_else(|_| JobOutcome::Failed(HandlerError::msg("job was dropped without a result")))
        });

        let outcome = match job.ttl {
            Some(ttl) => tokio::select! {
                outcome = &mut running => outcome,
                _ = tokio::time::sleep(ttl) => {
                    // Record the marker before the handler future is dropped.
                    let err = HandlerError::ttl_exceeded();
                    if done.fail(err.clone()) {
                        JobOutcome::Failed(err)
                    } else {
                        done.last_error().map_or(JobOutcome::Complete, JobOutcome::Failed)
                    }
                }
            },
            None => (&mut running).await,
        };
        drop(running);
        drop(done);
        self.settle(job, outcome);
    }

    fn settle(self: &Arc<Self>, job: Job, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Complete => {
                self.store.update(&job.id, |j| {
                    j.state = JobState::Complete;
                });
                self.emit(QueueEvent::new(QueueEventKind::Complete, job.id));
            }
            JobOutcome::Failed(err) => {
                let message = err.to_string();
                let Some(job) = self.store.update(&job.id, |j| {
                    j.error = Some(message.clone());
                }) else {
                    return;
                };
                self.emit(QueueEvent::error(job.id.clone(), message));

                if job.remaining_attempts() > 0 {
                    self.store.update(&job.id, |j| j.state = JobState::Delayed);
                    self.emit(QueueEvent::new(QueueEventKind::FailedAttempt, job.id.clone()));
                    self.schedule_retry(job);
                } else {
                    self.store.update(&job.id, |j| j.state = JobState::Failed);
                    self.emit(QueueEvent::new(QueueEventKind::Failed, job.id));
                }
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, job: Job) {
        let delay = job
            .backoff
            .as_ref()
            .and_then(|b| b.delay_for(job.attempts_made, self.retry_delay))
            .unwrap_or(Duration::ZERO);
        let inner = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.store.update(&job.id, |j| j.state = JobState::Inactive);
            inner.route(&job.task_name, job.id);
        });
    }
}

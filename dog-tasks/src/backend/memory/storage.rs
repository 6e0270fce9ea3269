use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::queue::MemoryQueue;
use crate::{
    backend::{QueueBackend, QueueHandle},
    config::ConnectionConfig,
    Job, JobId, JobState, NewJob, TaskError, TaskResult,
};

/// How the memory backend assigns job ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    /// "1", "2", ... in submission order
    #[default]
    Counter,
    /// Random v4 UUIDs
    Uuid,
}

/// Job records shared by every queue of one backend
pub(crate) struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    id_mode: IdMode,
    next_id: AtomicU64,
}

impl MemoryStore {
    fn new(id_mode: IdMode) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            id_mode,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> JobId {
        match self.id_mode {
            IdMode::Counter => JobId::from(self.next_id.fetch_add(1, Ordering::Relaxed)),
            IdMode::Uuid => JobId::random(),
        }
    }

    pub(crate) fn insert(&self, queue: &str, new_job: NewJob) -> Job {
        let id = self.next_id();
        let job = Job::from_new(id.clone(), queue, new_job);
        self.jobs.write().insert(id, job.clone());
        job
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    /// Mark a job active and count the attempt. Terminal or unknown jobs
    /// are not delivered again.
    pub(crate) fn activate(&self, id: &JobId) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id)?;
        if job.state.is_terminal() {
            return None;
        }
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.updated_at = Utc::now();
        Some(job.clone())
    }

    pub(crate) fn update<F>(&self, id: &JobId, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id)?;
        f(job);
        job.updated_at = Utc::now();
        Some(job.clone())
    }

    fn len(&self) -> usize {
        self.jobs.read().len()
    }
}

/// In-memory [`QueueBackend`]. Clones share the same store.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    retry_delay: Duration,
    opened: Arc<Mutex<Vec<(String, ConnectionConfig)>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_id_mode(IdMode::Counter)
    }

    /// A backend that assigns ids with `id_mode`
    pub fn with_id_mode(id_mode: IdMode) -> Self {
        Self {
            store: Arc::new(MemoryStore::new(id_mode)),
            retry_delay: Duration::ZERO,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Base delay handed to a job's backoff policy between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Every queue opened so far, with the connection it was opened with
    pub fn opened_queues(&self) -> Vec<(String, ConnectionConfig)> {
        self.opened.lock().clone()
    }

    /// Number of jobs ever submitted
    pub fn job_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn create_queue(&self, name: &str, connection: &ConnectionConfig) -> TaskResult<Arc<dyn QueueHandle>> {
        self.opened.lock().push((name.to_string(), connection.clone()));
        Ok(Arc::new(MemoryQueue::new(name, self.store.clone(), self.retry_delay)))
    }

    async fn get_job(&self, id: &JobId) -> TaskResult<Job> {
        self.store
            .get(id)
            .ok_or_else(|| TaskError::JobNotFound(id.to_string()))
    }
}

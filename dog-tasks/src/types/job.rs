use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Backoff, JobId};

/// Job lifecycle as tracked by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for a consumer
    Inactive,
    /// Handed to a handler
    Active,
    /// Waiting out a retry backoff
    Delayed,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Delayed => "delayed",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Job creation request handed to a queue.
///
/// Execution policy is only set when the caller sets it; anything left as
/// `None` falls back to the backend's defaults.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub task_name: String,
    pub payload: Value,
    pub ttl: Option<Duration>,
    pub attempts: Option<u32>,
    pub backoff: Option<Backoff>,
}

impl NewJob {
    pub fn new(task_name: impl Into<String>, payload: Value) -> Self {
        Self {
            task_name: task_name.into(),
            payload,
            ttl: None,
            attempts: None,
            backoff: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// A submitted job as read back from the backend
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub task_name: String,
    pub payload: Value,
    pub ttl: Option<Duration>,
    pub attempts: Option<u32>,
    pub backoff: Option<Backoff>,
    pub state: JobState,
    /// Number of times a handler has been invoked for this job
    pub attempts_made: u32,
    /// Last error reported for this job
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Materialise a freshly submitted job
    pub fn from_new(id: JobId, queue: impl Into<String>, new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id,
            queue: queue.into(),
            task_name: new_job.task_name,
            payload: new_job.payload,
            ttl: new_job.ttl,
            attempts: new_job.attempts,
            backoff: new_job.backoff,
            state: JobState::Inactive,
            attempts_made: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deserialize the payload into a typed value
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }

    /// Attempts still available after the current one
    pub fn remaining_attempts(&self) -> u32 {
        self.attempts.unwrap_or(1).saturating_sub(self.attempts_made)
    }
}

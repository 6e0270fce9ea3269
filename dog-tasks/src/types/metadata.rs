use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::JobPriority;
use crate::{TaskError, TaskResult};

/// Queue used when a task does not name one
pub const DEFAULT_QUEUE_NAME: &str = "default";

/// Concurrency used when a task does not set one
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Signature of a custom backoff: `(attempt, base delay) -> delay`
pub type BackoffFn = Arc<dyn Fn(u32, Duration) -> Duration + Send + Sync>;

/// How a backend spaces out retries of a failed job
#[derive(Clone)]
pub enum Backoff {
    /// Delay computed by user code from the attempt number and base delay
    Custom(BackoffFn),

    /// Built-in strategy with an optional explicit delay
    Config {
        delay: Option<Duration>,
        strategy: BackoffStrategy,
    },

    /// `true` enables the backend's default policy, `false` disables backoff
    Enabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            _ => Err(format!("Invalid backoff strategy: {}", s)),
        }
    }
}

impl Backoff {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, Duration) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::Config {
            delay: Some(delay),
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(delay: Duration) -> Self {
        Self::Config {
            delay: Some(delay),
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the next attempt, or `None` when backoff is disabled.
    ///
    /// `attempt` is the number of attempts already made (1 after the first
    /// failure). Exponential backoff grows as `delay * (2^attempt - 1) / 2`.
    pub fn delay_for(&self, attempt: u32, base: Duration) -> Option<Duration> {
        match self {
            Self::Custom(f) => Some(f(attempt, base)),
            Self::Config { delay, strategy } => {
                let delay = delay.unwrap_or(base);
                match strategy {
                    BackoffStrategy::Fixed => Some(delay),
                    BackoffStrategy::Exponential => {
                        let factor = 2u32.saturating_pow(attempt.min(31)).saturating_sub(1);
                        Some(delay.saturating_mul(factor) / 2)
                    }
                }
            }
            Self::Enabled(true) => Some(base),
            Self::Enabled(false) => None,
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
            Self::Config { delay, strategy } => f
                .debug_struct("Config")
                .field("delay", delay)
                .field("strategy", strategy)
                .finish(),
            Self::Enabled(on) => f.debug_tuple("Enabled").field(on).finish(),
        }
    }
}

impl From<bool> for Backoff {
    fn from(on: bool) -> Self {
        Self::Enabled(on)
    }
}

/// Raw task attributes as written on a handler method.
///
/// Nothing is validated here; [`TaskOptions::validate`] turns the options
/// into [`TaskMetadata`] or rejects them.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub name: Option<String>,
    pub queue: Option<String>,
    pub concurrency: Option<usize>,
    pub priority: Option<String>,
    /// Milliseconds
    pub ttl: Option<u64>,
    pub attempts: Option<u32>,
    pub backoff: Option<Backoff>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn backoff(mut self, backoff: impl Into<Backoff>) -> Self {
        self.backoff = Some(backoff.into());
        self
    }

    /// Validate the options found on `method`
    pub fn validate(self, method: &str) -> TaskResult<TaskMetadata> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(TaskError::invalid_metadata(method, "task name is required")),
        };

        if self.concurrency == Some(0) {
            return Err(TaskError::invalid_metadata(method, "concurrency must be positive"));
        }
        if self.attempts == Some(0) {
            return Err(TaskError::invalid_metadata(method, "attempts must be positive"));
        }

        let priority = self.priority.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        let queue = self.queue.filter(|q| !q.trim().is_empty());

        Ok(TaskMetadata {
            name,
            queue,
            concurrency: self.concurrency,
            priority,
            ttl: self.ttl.map(Duration::from_millis),
            attempts: self.attempts,
            backoff: self.backoff,
        })
    }

    /// Validate options that are not attached to a method
    pub fn build(self) -> TaskResult<TaskMetadata> {
        let method = self.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
        self.validate(&method)
    }
}

impl From<&str> for TaskOptions {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for TaskOptions {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// Validated, immutable description of one registrable task
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    name: String,
    queue: Option<String>,
    concurrency: Option<usize>,
    priority: Option<String>,
    ttl: Option<Duration>,
    attempts: Option<u32>,
    backoff: Option<Backoff>,
}

impl TaskMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue as declared, without the default applied
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    /// Queue the task runs on
    pub fn queue_name(&self) -> &str {
        self.queue.as_deref().unwrap_or(DEFAULT_QUEUE_NAME)
    }

    /// Concurrency as declared, without the default applied
    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Priority as declared; its meaning is up to the backend
    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }

    /// The declared priority when it names a [`JobPriority`] level
    pub fn job_priority(&self) -> Option<JobPriority> {
        self.priority.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    pub fn backoff(&self) -> Option<&Backoff> {
        self.backoff.as_ref()
    }
}

impl TryFrom<TaskOptions> for TaskMetadata {
    type Error = TaskError;

    fn try_from(options: TaskOptions) -> TaskResult<Self> {
        options.build()
    }
}

/// Anything that identifies a registered task by name
pub trait TaskRef {
    fn task_name(&self) -> &str;
}

impl TaskRef for str {
    fn task_name(&self) -> &str {
        self
    }
}

impl TaskRef for String {
    fn task_name(&self) -> &str {
        self
    }
}

impl TaskRef for TaskMetadata {
    fn task_name(&self) -> &str {
        &self.name
    }
}

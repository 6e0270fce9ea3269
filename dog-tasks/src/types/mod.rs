pub mod ids;
pub mod priority;
pub mod metadata;
pub mod job;
pub mod events;

pub use ids::JobId;
pub use priority::JobPriority;
pub use metadata::{Backoff, BackoffStrategy, TaskMetadata, TaskOptions, TaskRef};
pub use job::{Job, JobState, NewJob};
pub use events::{QueueEvent, QueueEventKind};

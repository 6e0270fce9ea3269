//! In-process backend for tests, development and single-node deployments.
//!
//! Jobs live in a shared map for the life of the backend. Each queue keeps
//! jobs for tasks without a consumer in a pending list until one is
//! attached, and enforces the per-task ceiling with a semaphore.

mod queue;
mod storage;

pub use queue::MemoryQueue;
pub use storage::{IdMode, MemoryBackend};

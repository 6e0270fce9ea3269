//! Task discovery and registration.
//!
//! Provider types list their handler methods through [`TaskProvider`],
//! usually generated by `#[task_handlers]`. The explorer turns those lists
//! into bound handlers and the registrar hands them to the queue manager.

pub mod explorer;
pub mod registrar;
pub mod resolver;

pub use explorer::{MethodHandler, TaskMetadataExplorer, TaskMethod, TaskProperties, TaskProvider};
pub use registrar::TaskRegistrar;
pub use resolver::{InstanceRegistry, InstanceResolver};

pub mod background;
pub mod config;

use std::sync::Arc;

pub use background::TaskSystem;

/// Build the task system from the process environment
pub fn build() -> anyhow::Result<Arc<TaskSystem>> {
    let settings = config::settings();
    let system = TaskSystem::new(settings)?;
    system.register()?;
    Ok(Arc::new(system))
}

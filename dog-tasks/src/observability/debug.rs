use std::sync::Arc;

use super::Notifier;
use crate::{
    backend::{QueueBackend, QueueHandle},
    QueueEvent, QueueEventKind, MODULE_NAME,
};

/// Scope attached to debug notices
pub const DEBUG_SCOPE: &str = "TaskRunner";

/// Turns queue lifecycle events into log lines.
///
/// Each event triggers a job lookup on a spawned task; a failed lookup is
/// dropped silently.
pub struct DebugObserver;

impl DebugObserver {
    pub fn bind(queue: &Arc<dyn QueueHandle>, backend: Arc<dyn QueueBackend>, notifier: Arc<dyn Notifier>) {
        for kind in QueueEventKind::ALL {
            let backend = backend.clone();
            let notifier = notifier.clone();
            queue.on(
                kind,
                Arc::new(move |event: &QueueEvent| {
                    Self::observe(event.clone(), backend.clone(), notifier.clone());
                }),
            );
        }
    }

    fn observe(event: QueueEvent, backend: Arc<dyn QueueBackend>, notifier: Arc<dyn Notifier>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if let Ok(job) = backend.get_job(&event.job_id).await {
                let line = Self::format_line(&job.task_name, event.kind, event.error.as_deref());
                notifier.notify(MODULE_NAME, &line, Some(DEBUG_SCOPE));
            }
        });
    }

    pub fn format_line(task_name: &str, kind: QueueEventKind, error: Option<&str>) -> String {
        match error {
            Some(err) => format!("Task {} {}\n{}", task_name, kind.event_name(), err),
            None => format!("Task {} {}", task_name, kind.event_name()),
        }
    }
}

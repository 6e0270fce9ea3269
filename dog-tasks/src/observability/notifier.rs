use parking_lot::Mutex;
use tracing::info;

/// Log sink for human-readable task layer messages
pub trait Notifier: Send + Sync {
    fn notify(&self, module: &str, message: &str, scope: Option<&str>);
}

/// Emits notices as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, module: &str, message: &str, scope: Option<&str>) {
        match scope {
            Some(scope) => info!(module, scope, "{}", message),
            None => info!(module, "{}", message),
        }
    }
}

/// One message received by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub module: String,
    pub message: String,
    pub scope: Option<String>,
}

/// Keeps every notice in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices.lock().iter().map(|n| n.message.clone()).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, module: &str, message: &str, scope: Option<&str>) {
        self.notices.lock().push(Notice {
            module: module.to_string(),
            message: message.to_string(),
            scope: scope.map(str::to_string),
        });
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::Empty;

/// Operation name of every task span
pub const SPAN_OPERATION: &str = "task.process";

pub const RESOURCE_NAME: &str = "resource.name";
pub const SERVICE_NAME: &str = "service.name";
pub const ERROR_TYPE: &str = "error.type";
pub const ERROR_MSG: &str = "error.msg";
pub const ERROR_STACK: &str = "error.stack";
pub const JOB_TTL: &str = "job.ttl";

/// Source of spans wrapped around task handler invocations
pub trait Tracer: Send + Sync {
    /// Service name of the application; task spans use it with a suffix
    fn service_name(&self) -> &str;

    fn start_span(&self, operation: &str) -> Box<dyn TaskSpan>;
}

/// One traced handler invocation
pub trait TaskSpan: Send {
    fn set_tag(&mut self, key: &str, value: &str);

    /// `tracing` span entered while the handler runs
    fn tracing_span(&self) -> tracing::Span {
        tracing::Span::none()
    }

    /// Release the span. Called exactly once.
    fn finish(self: Box<Self>);
}

/// Tracer backed by `tracing` spans, so any installed subscriber
/// (fmt, OpenTelemetry, ...) receives task spans with their tags as fields.
pub struct TracingTracer {
    service_name: String,
}

impl TracingTracer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl Tracer for TracingTracer {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn start_span(&self, operation: &str) -> Box<dyn TaskSpan> {
        let span = tracing::info_span!(
            "task",
            otel.name = operation,
            resource.name = Empty,
            service.name = Empty,
            "error.type" = Empty,
            error.msg = Empty,
            error.stack = Empty,
            job.ttl = Empty,
        );
        Box::new(TracingSpan { span })
    }
}

struct TracingSpan {
    span: tracing::Span,
}

impl TaskSpan for TracingSpan {
    fn set_tag(&mut self, key: &str, value: &str) {
        self.span.record(key, value);
    }

    fn tracing_span(&self) -> tracing::Span {
        self.span.clone()
    }

    fn finish(self: Box<Self>) {}
}

/// Span data kept by [`SpanCollector`]
#[derive(Debug, Clone)]
pub struct SpanData {
    pub operation_name: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub tags: HashMap<String, String>,
}

impl SpanData {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Default)]
struct CollectorState {
    started: usize,
    finished: Vec<SpanData>,
}

/// Tracer that keeps finished spans in memory for inspection
#[derive(Clone)]
pub struct SpanCollector {
    service_name: String,
    state: Arc<Mutex<CollectorState>>,
}

impl SpanCollector {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            state: Arc::new(Mutex::new(CollectorState::default())),
        }
    }

    /// Finished spans, in finishing order
    pub fn spans(&self) -> Vec<SpanData> {
        self.state.lock().finished.clone()
    }

    pub fn started(&self) -> usize {
        self.state.lock().started
    }

    pub fn clear(&self) {
        *self.state.lock() = CollectorState::default();
    }
}

impl Tracer for SpanCollector {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn start_span(&self, operation: &str) -> Box<dyn TaskSpan> {
        self.state.lock().started += 1;
        Box::new(CollectedSpan {
            state: self.state.clone(),
            operation_name: operation.to_string(),
            start_time: chrono::Utc::now(),
            tags: HashMap::new(),
        })
    }
}

struct CollectedSpan {
    state: Arc<Mutex<CollectorState>>,
    operation_name: String,
    start_time: chrono::DateTime<chrono::Utc>,
    tags: HashMap<String, String>,
}

impl TaskSpan for CollectedSpan {
    fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    fn finish(self: Box<Self>) {
        let CollectedSpan {
            state,
            operation_name,
            start_time,
            tags,
        } = *self;
        state.lock().finished.push(SpanData {
            operation_name,
            start_time,
            end_time: chrono::Utc::now(),
            tags,
        });
    }
}

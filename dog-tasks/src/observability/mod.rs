pub mod tracer;
pub mod notifier;
pub mod debug;

pub use tracer::{SpanCollector, SpanData, TaskSpan, Tracer, TracingTracer};
pub use notifier::{MemoryNotifier, Notice, Notifier, TracingNotifier};
pub use debug::DebugObserver;

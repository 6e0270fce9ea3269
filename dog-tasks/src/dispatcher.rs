use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, Instrument};

use crate::{
    backend::{ConsumerFn, ConsumerFuture, JobDone, QueueHandle},
    error::TTL_EXCEEDED,
    observability::tracer::{
        TaskSpan, Tracer, ERROR_MSG, ERROR_STACK, ERROR_TYPE, JOB_TTL, RESOURCE_NAME, SERVICE_NAME,
        SPAN_OPERATION,
    },
    HandlerError, Job, TaskMetadata, TaskResult,
};

/// Suffix appended to the tracer's service name for task spans
pub const SERVICE_SUFFIX: &str = "-queue";

/// Future returned by a task handler
pub type TaskFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// A task handler bound to its owning instance.
///
/// The handler may report through the [`JobDone`] it receives; if it does
/// not, its returned result is reported when the future resolves.
pub type TaskHandler = Arc<dyn Fn(Job, JobDone) -> TaskFuture + Send + Sync>;

#[derive(Clone)]
struct ActiveTracer {
    tracer: Arc<dyn Tracer>,
    service_name: String,
}

/// Attaches bounded consumers to queues and runs handlers for delivered jobs
#[derive(Clone, Default)]
pub struct Dispatcher {
    tracer: Arc<RwLock<Option<ActiveTracer>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a tracer for every consumer, including ones already bound.
    /// Returns the service name task spans are tagged with.
    pub fn set_tracer(&self, tracer: Arc<dyn Tracer>) -> String {
        let service_name = format!("{}{}", tracer.service_name(), SERVICE_SUFFIX);
        *self.tracer.write() = Some(ActiveTracer {
            tracer,
            service_name: service_name.clone(),
        });
        service_name
    }

    pub fn service_name(&self) -> Option<String> {
        self.tracer.read().as_ref().map(|t| t.service_name.clone())
    }

    /// Attach a consumer for `metadata`'s task to `queue`. The backend keeps
    /// at most `effective_concurrency()` invocations in flight.
    pub fn bind(&self, queue: &Arc<dyn QueueHandle>, metadata: &TaskMetadata, handler: TaskHandler) -> TaskResult<()> {
        let tracer = self.tracer.clone();
        let resource = metadata.name().to_string();
        let task_ttl = metadata.ttl();

        let consumer: ConsumerFn = Arc::new(move |job: Job, done: JobDone| -> ConsumerFuture {
            let active = tracer.read().clone();
            Box::pin(dispatch(handler.clone(), job, done, active, resource.clone(), task_ttl))
        });

        queue.process(metadata.name(), metadata.effective_concurrency(), consumer)?;
        debug!(
            queue = queue.name(),
            task = metadata.name(),
            concurrency = metadata.effective_concurrency(),
            "Bound task consumer"
        );
        Ok(())
    }
}

async fn dispatch(
    handler: TaskHandler,
    job: Job,
    done: JobDone,
    tracer: Option<ActiveTracer>,
    resource: String,
    task_ttl: Option<Duration>,
) {
    let ttl = job.ttl.or(task_ttl);
    let job_id = job.id.clone();
    let mut guard = SpanGuard::start(tracer.as_ref(), &resource, done.clone(), ttl);
    let scope = guard.tracing_span();

    let result = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(job, done.clone()))) {
        Ok(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .instrument(scope)
            .await
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic))),
        Err(panic) => Err(HandlerError::from_panic(panic)),
    };

    match result {
        Ok(()) => {
            done.complete();
        }
        Err(err) => {
            debug!(task = %resource, job = %job_id, error = %err, "Task handler failed");
            guard.tag_error(&err);
            done.fail(err);
        }
    }
}

/// Owns the span of one invocation and finishes it exactly once, including
/// when the backend drops the invocation after a TTL timeout.
struct SpanGuard {
    span: Option<Box<dyn TaskSpan>>,
    done: JobDone,
    ttl: Option<Duration>,
    error_tagged: bool,
}

impl SpanGuard {
    fn start(tracer: Option<&ActiveTracer>, resource: &str, done: JobDone, ttl: Option<Duration>) -> Self {
        let span = tracer.map(|active| {
            let mut span = active.tracer.start_span(SPAN_OPERATION);
            span.set_tag(RESOURCE_NAME, resource);
            span.set_tag(SERVICE_NAME, &active.service_name);
            span
        });
        Self {
            span,
            done,
            ttl,
            error_tagged: false,
        }
    }

    fn tracing_span(&self) -> tracing::Span {
        self.span
            .as_ref()
            .map_or_else(tracing::Span::none, |span| span.tracing_span())
    }

    fn tag_error(&mut self, err: &HandlerError) {
        if let Some(span) = self.span.as_mut() {
            tag_error(span.as_mut(), err);
            self.error_tagged = true;
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let Some(mut span) = self.span.take() else {
            return;
        };

        match self.done.last_error() {
            Some(err) if err.is_ttl_exceeded() => {
                span.set_tag(ERROR_TYPE, TTL_EXCEEDED);
                if let Some(ttl) = self.ttl {
                    span.set_tag(ERROR_MSG, &format!("Job exceeded its TTL of {}ms", ttl.as_millis()));
                    span.set_tag(JOB_TTL, &ttl.as_millis().to_string());
                }
            }
            Some(err) if !self.error_tagged => tag_error(span.as_mut(), &err),
            _ => {}
        }

        span.finish();
    }
}

fn tag_error(span: &mut dyn TaskSpan, err: &HandlerError) {
    span.set_tag(ERROR_TYPE, err.kind());
    span.set_tag(ERROR_MSG, err.message());
    if let Some(stack) = err.stack() {
        span.set_tag(ERROR_STACK, stack);
    }
}

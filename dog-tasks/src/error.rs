use std::fmt;

use thiserror::Error;

/// Result type for task registration and queue operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors surfaced to callers of the registration and job APIs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task registry is not bound to an instance resolver. Call `set_resolver()` before registering tasks")]
    UnboundRegistry,

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Task name already registered: {0}")]
    DuplicateTaskName(String),

    #[error("Invalid task metadata on `{method}`: {reason}")]
    InvalidTaskMetadata { method: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl TaskError {
    pub(crate) fn invalid_metadata(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTaskMetadata {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Marker recorded on a job when the backend cancels it for running past its TTL
pub const TTL_EXCEEDED: &str = "TTL exceeded";

/// Error raised by a task handler.
///
/// Handlers can return any `std::error::Error` with `?`; the concrete type
/// name, message and source chain are kept so they can be attached to a
/// tracing span before the failure is handed to the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct HandlerError {
    kind: String,
    message: String,
    stack: Option<String>,
}

impl HandlerError {
    /// Create an error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            kind: "Error".to_string(),
            message: message.into(),
            stack: None,
        }
    }

    /// Create an error with an explicit type name
    pub fn with_kind(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// The error recorded when a job outlives its TTL
    pub fn ttl_exceeded() -> Self {
        Self::with_kind(TTL_EXCEEDED, TTL_EXCEEDED)
    }

    /// Convert an `anyhow::Error`, keeping its context chain as the stack
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        let chain: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
        Self {
            kind: "anyhow::Error".to_string(),
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::with_kind("panic", message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn is_ttl_exceeded(&self) -> bool {
        self.kind == TTL_EXCEEDED
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("stack", &self.stack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("mail server refused connection")]
    struct SmtpError;

    #[test]
    fn test_from_std_error_keeps_type_name() {
        let err: HandlerError = SmtpError.into();
        assert!(err.kind().ends_with("SmtpError"));
        assert_eq!(err.message(), "mail server refused connection");
        assert!(err.stack().is_none());
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("writing thumbnail");
        let err = HandlerError::from_anyhow(err);
        assert_eq!(err.message(), "writing thumbnail");
        assert_eq!(err.stack(), Some("disk full"));
    }

    #[test]
    fn test_ttl_marker() {
        assert!(HandlerError::ttl_exceeded().is_ttl_exceeded());
        assert!(!HandlerError::msg("boom").is_ttl_exceeded());
    }
}

use std::sync::Arc;
use thiserror::Error;

/// Error carried by a rejected task.
///
/// Rejections are broadcast to every awaiter of a shared signal, so the type is
/// cheap to clone and is always handed out by clone rather than by move.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task source dropped without a result")]
    SourceDropped,

    #[error("Task source invalid state")]
    InvalidState,

    #[error("Task is empty")]
    Empty,

    #[error("Task is not ready")]
    NotReady,

    #[error("Task result already taken")]
    ResultTaken,

    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Creates a domain failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wraps a foreign error.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }
}

pub type Result<T, E = TaskError> = std::result::Result<T, E>;

/// Reports an unrecoverable logic bug and terminates the current thread of
/// execution.
#[cold]
#[track_caller]
pub(crate) fn fatal(message: &str) -> ! {
    tracing::error!(target: "core_task", "fatal: {}", message);
    panic!("{}", message);
}

//! Pluggable execution contexts for task continuations.
//!
//! The task runtime never decides on its own *where* a continuation runs.
//! Whoever registers a continuation may capture an [`Executor`]; when the task
//! completes the continuation is handed to that executor, or run inline on the
//! resolving thread if none was captured.
//!
//! There is no process-wide default executor. Hosts create one (see
//! `core_runtime::TaskRuntime`) and inject it where it is needed.

use std::fmt;
use std::sync::Arc;

/// A unit of work handed to an executor.
pub type Invocation = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an executor.
pub type ExecutorPtr = Arc<dyn Executor>;

/// Something that can run an [`Invocation`] at some point, on some thread.
pub trait Executor: Send + Sync {
    /// Schedules `invocation` to run exactly once.
    fn execute(&self, invocation: Invocation);

    /// Human readable name used in diagnostics.
    fn name(&self) -> &str {
        "executor"
    }
}

/// Runs every invocation immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl InlineExecutor {
    pub fn shared() -> ExecutorPtr {
        Arc::new(Self)
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, invocation: Invocation) {
        invocation();
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// Runs invocations as tasks on a Tokio runtime.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
    name: String,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }

    /// Wraps the runtime the caller is currently running on, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| Self::new(handle, "tokio"))
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, invocation: Invocation) {
        self.handle.spawn(async move { invocation() });
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

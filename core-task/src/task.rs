//! Consumer and producer handles over a [`CoreTask`].
//!
//! - [`TaskSource`] is the producer side: a single-shot promise that owns one
//!   core task and hands out exactly one [`Task`] for it.
//! - [`Task`] is the consumer side: poll it (`is_ready`, `error`), await it as
//!   a regular Rust future, or attach a continuation with
//!   [`Task::continue_with`].
//!
//! # Examples
//!
//! ```rust
//! use core_task::{Task, TaskSource};
//!
//! # core_task::runtime::block_on(async {
//! let mut source = TaskSource::new();
//! let task: Task<u32> = source.get_task();
//!
//! std::thread::spawn(move || {
//!     source.resolve(42);
//! });
//!
//! assert_eq!(task.await.unwrap(), 42);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::core_task::{AnyCoreTaskPtr, CoreTask, CoreTaskPtr, TaskContinuation, TaskState};
use crate::error::{Result, TaskError};
use crate::executor::ExecutorPtr;

/// Consumer handle for an asynchronous result of type `T`.
///
/// A task is either *empty* (there is no task at all, see [`Task::empty`]) or
/// refers to a shared [`CoreTask`]. It has a single logical consumer; use
/// [`MultiTaskSource`](crate::MultiTaskSource) to broadcast a result.
#[must_use = "a pending task should be awaited, given a continuation or detached"]
pub struct Task<T = ()> {
    core: Option<CoreTaskPtr<T>>,
    detached: bool,
}

impl<T> Task<T> {
    /// A task that refers to nothing.
    pub fn empty() -> Self {
        Self {
            core: None,
            detached: false,
        }
    }

    pub fn from_core_task(core: CoreTaskPtr<T>) -> Self {
        Self {
            core: Some(core),
            detached: false,
        }
    }

    /// An already resolved task.
    pub fn make_resolved(value: T) -> Self {
        Self::from_core_task(Arc::new(CoreTask::resolved(value)))
    }

    /// An already rejected task.
    pub fn make_rejected(error: TaskError) -> Self {
        Self::from_core_task(Arc::new(CoreTask::rejected(error)))
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_none()
    }

    /// `false` for an empty task.
    pub fn is_ready(&self) -> bool {
        self.core.as_ref().is_some_and(|core| core.is_ready())
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == Some(TaskState::Rejected)
    }

    /// `None` for an empty task.
    pub fn state(&self) -> Option<TaskState> {
        self.core.as_ref().map(|core| core.state())
    }

    pub fn error(&self) -> Option<TaskError> {
        self.core.as_ref().and_then(|core| core.error())
    }

    pub fn core_task(&self) -> Option<&CoreTaskPtr<T>> {
        self.core.as_ref()
    }

    /// Returns a copy of the outcome of a ready task.
    pub fn result(&self) -> Result<T>
    where
        T: Clone,
    {
        match &self.core {
            Some(core) => core.cloned_result(),
            None => Err(TaskError::Empty),
        }
    }

    /// Moves the outcome out of a ready task.
    pub fn into_result(mut self) -> Result<T> {
        match self.core.take() {
            Some(core) => core.take_result(),
            None => Err(TaskError::Empty),
        }
    }

    /// Runs `f` with the outcome once the task is ready.
    ///
    /// `f` is scheduled on `executor` when one is given, otherwise it runs on
    /// the thread that completes the task (or right here if the task is
    /// already ready). An empty task calls `f` immediately with
    /// [`TaskError::Empty`].
    pub fn continue_with<F>(mut self, executor: Option<ExecutorPtr>, f: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let Some(core) = self.core.take() else {
            f(Err(TaskError::Empty));
            return;
        };

        let target = Arc::clone(&core);
        core.set_continuation(TaskContinuation::new(
            move || f(target.take_result()),
            executor,
        ));
    }

    /// Releases the handle without waiting for the result and without the
    /// dropped-while-pending warning.
    pub fn detach(mut self) {
        self.detached = true;
    }

    /// Type-erased handle to the underlying core task, if any.
    pub fn as_any(&self) -> Option<AnyCoreTaskPtr>
    where
        T: Send + 'static,
    {
        self.core
            .as_ref()
            .map(|core| Arc::clone(core) as AnyCoreTaskPtr)
    }

    pub(crate) fn into_any(mut self) -> Option<AnyCoreTaskPtr>
    where
        T: Send + 'static,
    {
        self.core.take().map(|core| core as AnyCoreTaskPtr)
    }
}

impl<T> Default for Task<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(core) = self.core.as_ref() else {
            return Poll::Ready(Err(TaskError::Empty));
        };

        if !core.is_ready() {
            core.register_waker(cx.waker());
            if !core.is_ready() {
                return Poll::Pending;
            }
        }

        Poll::Ready(core.take_result())
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if let Some(core) = &self.core {
            if !self.detached && !core.is_ready() && !core.has_continuation() {
                tracing::warn!(
                    target: "core_task",
                    "pending task dropped without being awaited, continued or detached"
                );
            }
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state())
            .field("detached", &self.detached)
            .finish()
    }
}

/// Producer side of a single-shot task.
///
/// Dropping a source whose task is still pending rejects it with
/// [`TaskError::SourceDropped`].
pub struct TaskSource<T = ()> {
    core: CoreTaskPtr<T>,
    task_given_out: bool,
}

impl<T> TaskSource<T> {
    pub fn new() -> Self {
        Self {
            core: Arc::new(CoreTask::new()),
            task_given_out: false,
        }
    }

    /// Returns the consumer handle. Must be called at most once.
    pub fn get_task(&mut self) -> Task<T> {
        debug_assert!(
            !self.task_given_out,
            "TaskSource::get_task called more than once"
        );
        self.task_given_out = true;
        Task::from_core_task(Arc::clone(&self.core))
    }

    /// Returns `false` if the task was already resolved or rejected.
    pub fn resolve(&self, value: T) -> bool {
        self.core.try_resolve(value)
    }

    pub fn resolve_with<F>(&self, writer: F) -> bool
    where
        F: FnOnce() -> T,
    {
        self.core.try_resolve_with(writer)
    }

    pub fn reject(&self, error: TaskError) -> bool {
        self.core.try_reject_with_error(error)
    }

    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    pub fn state(&self) -> TaskState {
        self.core.state()
    }

    pub fn core_task(&self) -> &CoreTaskPtr<T> {
        &self.core
    }
}

impl<T> Default for TaskSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for TaskSource<T> {
    fn drop(&mut self) {
        if !self.core.is_ready() && self.core.try_reject_with_error(TaskError::SourceDropped) {
            tracing::debug!(target: "core_task", "task source dropped while pending");
        }
    }
}

impl<T> fmt::Debug for TaskSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSource")
            .field("state", &self.state())
            .field("task_given_out", &self.task_given_out)
            .finish()
    }
}

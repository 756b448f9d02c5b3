//! Tokio-backed host for the task runtime.
//!
//! [`TaskRuntime`] owns a multi-threaded Tokio runtime, exposes it to the task
//! model as an injected [`Executor`](core_task::Executor), turns futures into
//! [`Task`] values and keeps fire-and-forget work in a [`TaskCollection`] so
//! that [`TaskRuntime::shutdown`] can wait for it.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use core_task::{wait, ExecutorPtr, Task, TaskCollection, TaskError, TaskSource, TokioExecutor};
use futures::FutureExt;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::logging::init_logging;

pub struct TaskRuntime {
    // Dropped before `background` so that every future still owned by the
    // runtime releases its task source first.
    runtime: Runtime,
    executor: Arc<TokioExecutor>,
    background: TaskCollection,
    config: RuntimeConfig,
}

impl TaskRuntime {
    /// Builds the worker pool described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::Runtime`] if the worker threads cannot be started.
    pub fn start(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        if let Some(logging) = config.logging.clone() {
            if let Err(error) = init_logging(logging) {
                tracing::debug!(%error, "logging already initialised, keeping existing subscriber");
            }
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(format!("Failed to build Tokio runtime: {}", e)))?;

        let executor = Arc::new(TokioExecutor::new(
            runtime.handle().clone(),
            config.executor_name.clone(),
        ));

        tracing::info!(
            worker_threads = config.worker_threads,
            executor = %config.executor_name,
            "task runtime started"
        );

        Ok(Self {
            runtime,
            executor,
            background: TaskCollection::new(),
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// The host executor, for injection into code that schedules
    /// continuations.
    pub fn executor(&self) -> ExecutorPtr {
        self.executor.clone()
    }

    /// Executor used by [`continue_with`](Self::continue_with): the host
    /// executor, or `None` (inline) when `continue_on_executor` is off.
    pub fn continuation_executor(&self) -> Option<ExecutorPtr> {
        self.config.continue_on_executor.then(|| self.executor())
    }

    /// Runs `future` on the worker pool and returns its output as a task.
    ///
    /// A panicking future rejects the task with [`TaskError::Failed`].
    pub fn spawn<F>(&self, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut source = TaskSource::new();
        let task = source.get_task();

        tracing::debug!(executor = %self.config.executor_name, "spawning task");
        self.runtime.spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => {
                    source.resolve(value);
                }
                Err(panic) => {
                    let message = panic_message(&*panic);
                    tracing::error!(%message, "spawned task panicked");
                    source.reject(TaskError::failed(message));
                }
            }
        });

        task
    }

    /// Spawns `future` and tracks it in the background collection until it
    /// completes.
    pub fn spawn_tracked<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.background.push(self.spawn(future));
    }

    /// Runs `f` with the outcome of `task`, scheduled according to
    /// `continue_on_executor`.
    pub fn continue_with<T, F>(&self, task: Task<T>, f: F)
    where
        T: Send + 'static,
        F: FnOnce(core_task::Result<T>) + Send + 'static,
    {
        task.continue_with(self.continuation_executor(), f);
    }

    /// Blocks the current thread on `future`.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Fire-and-forget work started through this host.
    pub fn background(&self) -> &TaskCollection {
        &self.background
    }

    /// Disposes the background collection, waits for it to drain, then stops
    /// the worker threads.
    ///
    /// The wait blocks the calling thread and does not rely on the Tokio
    /// timer, so it is bounded even when every worker is stuck.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if background work did not finish within
    /// `shutdown_timeout`. The workers are stopped either way.
    pub fn shutdown(self) -> Result<()> {
        let Self {
            runtime,
            background,
            config,
            ..
        } = self;

        tracing::info!(
            outstanding = background.len(),
            "shutting down task runtime"
        );

        let timeout = config.shutdown_timeout;
        let closed = background.dispose_async();
        let drained = wait(&closed, Some(timeout));
        runtime.shutdown_timeout(timeout);

        if !drained {
            tracing::error!(
                outstanding = background.len(),
                ?timeout,
                "background tasks still running after shutdown timeout, leaking their collection"
            );
            // Work stuck on a worker thread outlives the runtime and still
            // reports into the collection, so it must never be dropped.
            closed.detach();
            mem::forget(background);
            return Err(Error::Runtime(format!(
                "Background tasks did not finish within {:?}",
                timeout
            )));
        }

        tracing::info!("task runtime stopped");
        closed.into_result().map_err(Error::from)
    }
}

impl fmt::Debug for TaskRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRuntime")
            .field("config", &self.config)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

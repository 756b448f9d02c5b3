//! Repeatable, multi-consumer signal.
//!
//! A [`MultiTaskSource`] wraps one underlying [`CoreTask`] at a time. Every
//! consumer calls [`MultiTaskSource::get_next_task`] to obtain its own
//! [`Task`] for "the next time this fires"; the producer calls `resolve` or
//! `reject` once and every registered awaiter receives the outcome, in
//! registration order.
//!
//! The awaiter list is drained in the same critical section that performs the
//! transition of the underlying task, so an awaiter can never be appended
//! after the transition and miss the broadcast. The drained awaiters are then
//! completed after the lock is released, which lets their continuations call
//! back into the same source.

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::core_task::{CoreTask, CoreTaskPtr};
use crate::error::{Result, TaskError};
use crate::spin_lock::SpinLock;
use crate::task::{Task, TaskSource};

struct MultiState<T> {
    core: Option<CoreTaskPtr<T>>,
    awaiters: Vec<TaskSource<T>>,
    auto_reset_on_ready: bool,
}

/// Multicast promise. See the [module documentation](self).
///
/// # Examples
///
/// ```rust
/// use core_task::MultiTaskSource;
///
/// let signal = MultiTaskSource::new();
/// let first = signal.get_next_task();
/// let second = signal.get_next_task();
///
/// assert!(signal.resolve(42));
/// assert_eq!(first.into_result().unwrap(), 42);
/// assert_eq!(second.into_result().unwrap(), 42);
///
/// // The value is retained until the source is re-armed.
/// assert_eq!(signal.get_next_task().into_result().unwrap(), 42);
/// ```
pub struct MultiTaskSource<T = ()> {
    state: SpinLock<MultiState<T>>,
}

impl<T> MultiTaskSource<T> {
    /// Creates an armed source with a fresh pending task.
    pub fn new() -> Self {
        Self::with_core(Some(Arc::new(CoreTask::new())))
    }

    /// Creates a source that holds no task; [`emplace`](Self::emplace) must be
    /// called before use.
    pub fn invalid() -> Self {
        Self::with_core(None)
    }

    fn with_core(core: Option<CoreTaskPtr<T>>) -> Self {
        Self {
            state: SpinLock::new(MultiState {
                core,
                awaiters: Vec::new(),
                auto_reset_on_ready: false,
            }),
        }
    }

    /// Installs a fresh pending task.
    ///
    /// Awaiters still registered against the previous task are rejected with
    /// [`TaskError::SourceDropped`].
    pub fn emplace(&self) {
        self.replace_core(Some(Arc::new(CoreTask::new())));
    }

    /// Drops the current task and leaves the source invalid.
    pub fn reset(&self) {
        self.replace_core(None);
    }

    fn replace_core(&self, core: Option<CoreTaskPtr<T>>) {
        let stale = {
            let mut state = self.state.lock();
            state.core = core;
            mem::take(&mut state.awaiters)
        };

        if !stale.is_empty() {
            tracing::debug!(
                target: "core_task",
                awaiters = stale.len(),
                "dropping stale multicast awaiters"
            );
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().core.is_some()
    }

    /// Readiness of the current task, or [`TaskError::InvalidState`] when the
    /// source holds none.
    pub fn check_ready(&self) -> Result<bool> {
        match &self.state.lock().core {
            Some(core) => Ok(core.is_ready()),
            None => Err(TaskError::InvalidState),
        }
    }

    /// Readiness of the current task.
    ///
    /// Calling this on an invalid source is a programming error: it asserts in
    /// debug builds and returns `false` otherwise.
    pub fn is_ready(&self) -> bool {
        match self.check_ready() {
            Ok(ready) => ready,
            Err(_) => {
                report_invalid_state("is_ready");
                false
            }
        }
    }

    /// Rejects every registered awaiter with a clone of `error`.
    ///
    /// Returns whether the underlying task performed the transition.
    pub fn reject(&self, error: TaskError) -> bool {
        let awaiters = {
            let mut state = self.state.lock();
            let Some(core) = state.core.clone() else {
                drop(state);
                report_invalid_state("reject");
                return false;
            };

            let won = core.try_reject_with_error(error.clone());
            if state.auto_reset_on_ready {
                state.core = None;
            }
            if !won {
                return false;
            }
            mem::take(&mut state.awaiters)
        };

        tracing::trace!(
            target: "core_task",
            awaiters = awaiters.len(),
            %error,
            "multicast rejected"
        );
        for awaiter in &awaiters {
            awaiter.reject(error.clone());
        }
        true
    }

    /// When set, the underlying task is dropped right after each broadcast and
    /// the source stays invalid until [`emplace`](Self::emplace) is called.
    pub fn set_auto_reset_on_ready(&self, auto_reset: bool) {
        self.state.lock().auto_reset_on_ready = auto_reset;
    }

    pub fn auto_reset_on_ready(&self) -> bool {
        self.state.lock().auto_reset_on_ready
    }

    /// Number of consumers waiting for the current task.
    pub fn awaiter_count(&self) -> usize {
        self.state.lock().awaiters.len()
    }
}

impl<T: Clone> MultiTaskSource<T> {
    /// Resolves every registered awaiter with `value`.
    ///
    /// Awaiters receive copies in registration order, except the last one,
    /// which receives `value` itself. Returns whether the underlying task
    /// performed the transition.
    ///
    /// The awaiter list is taken in the critical section that resolves the
    /// underlying task, but the awaiters themselves are completed after the
    /// lock is released. A concurrent [`get_next_task`](Self::get_next_task)
    /// can therefore receive an already resolved task while earlier awaiters
    /// are still being completed.
    ///
    /// If cloning `value` for the underlying task panics, that task is
    /// rejected and the drained awaiters are rejected with
    /// [`TaskError::SourceDropped`] as the panic unwinds.
    pub fn resolve(&self, value: T) -> bool {
        // Outlives the guard: on unwind the awaiters drop after the lock is
        // released.
        let mut awaiters: Vec<TaskSource<T>>;
        let value = {
            let mut state = self.state.lock();
            let Some(core) = state.core.clone() else {
                drop(state);
                report_invalid_state("resolve");
                return false;
            };
            awaiters = mem::take(&mut state.awaiters);

            let resolved = if state.auto_reset_on_ready {
                state.core = None;
                if core.try_resolve(value) {
                    core.take_result().ok()
                } else {
                    None
                }
            } else if core.try_resolve_with(|| value.clone()) {
                Some(value)
            } else {
                None
            };

            match resolved {
                Some(value) => value,
                None => {
                    state.awaiters = mem::take(&mut awaiters);
                    return false;
                }
            }
        };

        tracing::trace!(
            target: "core_task",
            awaiters = awaiters.len(),
            "multicast resolved"
        );
        broadcast(awaiters, value);
        true
    }

    /// Returns a task for the current signal.
    ///
    /// While the underlying task is pending this registers a new awaiter. Once
    /// it is ready the stored outcome is returned as an already completed task
    /// and the awaiter list is left untouched. An invalid source yields a task
    /// rejected with [`TaskError::InvalidState`].
    pub fn get_next_task(&self) -> Task<T> {
        let mut state = self.state.lock();
        let Some(core) = state.core.clone() else {
            drop(state);
            report_invalid_state("get_next_task");
            return Task::make_rejected(TaskError::InvalidState);
        };

        if core.is_ready() {
            return match core.cloned_result() {
                Ok(value) => Task::make_resolved(value),
                Err(error) => Task::make_rejected(error),
            };
        }

        let mut awaiter = TaskSource::new();
        let task = awaiter.get_task();
        state.awaiters.push(awaiter);
        task
    }
}

fn broadcast<T: Clone>(mut awaiters: Vec<TaskSource<T>>, value: T) {
    let last = awaiters.pop();
    for awaiter in &awaiters {
        awaiter.resolve(value.clone());
    }
    if let Some(last) = last {
        last.resolve(value);
    }
}

#[track_caller]
fn report_invalid_state(operation: &str) {
    tracing::error!(
        target: "core_task",
        operation,
        "multicast task source used while holding no task"
    );
    if cfg!(debug_assertions) {
        panic!("MultiTaskSource::{operation} called in invalid state");
    }
}

impl<T> Default for MultiTaskSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MultiTaskSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MultiTaskSource")
            .field("core", &state.core)
            .field("awaiters", &state.awaiters.len())
            .field("auto_reset_on_ready", &state.auto_reset_on_ready)
            .finish()
    }
}

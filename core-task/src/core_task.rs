//! The reference-counted task state machine shared by every task handle.
//!
//! A [`CoreTask`] moves exactly once from `Pending` to either `Resolved` or
//! `Rejected`. The winning transition is decided by a single atomic
//! compare-and-swap, so any number of threads may race to resolve or reject
//! the same task and exactly one of them succeeds; the others get `false`
//! back and carry on.
//!
//! Interested parties are notified in two ways:
//!
//! - *ready callbacks* ([`CoreTask::add_ready_callback`]), any number of which
//!   may be registered by infrastructure such as `TaskCollection`;
//! - a single consumer *continuation* ([`CoreTask::set_continuation`]) that may
//!   be scheduled on a captured [`Executor`](crate::executor::Executor).
//!
//! Neither is ever invoked while an internal lock is held.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Waker;

use futures::task::AtomicWaker;

use crate::error::{Result, TaskError};
use crate::executor::{ExecutorPtr, Invocation};
use crate::spin_lock::SpinLock;

const PENDING: u8 = 0;
/// A resolver won the race and is writing the outcome.
const RESOLVING: u8 = 1;
const RESOLVED: u8 = 2;
const REJECTED: u8 = 3;

/// Observable state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Resolved,
    Rejected,
}

/// Callback fired once when a task becomes ready.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a typed core task.
pub type CoreTaskPtr<T = ()> = Arc<CoreTask<T>>;

/// Shared handle to a core task with its payload type erased.
pub type AnyCoreTaskPtr = Arc<dyn AnyCoreTask>;

/// The consumer's continuation plus the executor it should run on.
pub struct TaskContinuation {
    invocation: Invocation,
    executor: Option<ExecutorPtr>,
}

impl TaskContinuation {
    pub fn new(invocation: impl FnOnce() + Send + 'static, executor: Option<ExecutorPtr>) -> Self {
        Self {
            invocation: Box::new(invocation),
            executor,
        }
    }

    /// A continuation that runs on whichever thread completes the task.
    pub fn inline(invocation: impl FnOnce() + Send + 'static) -> Self {
        Self::new(invocation, None)
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    fn run(self) {
        match self.executor {
            Some(executor) => executor.execute(self.invocation),
            None => (self.invocation)(),
        }
    }
}

impl fmt::Debug for TaskContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContinuation")
            .field("executor", &self.executor.as_ref().map(|e| e.name().to_owned()))
            .finish_non_exhaustive()
    }
}

enum Slot<T> {
    Empty,
    Value(T),
    Error(TaskError),
    Taken,
}

#[derive(Default)]
struct Notifications {
    ready_callbacks: Vec<ReadyCallback>,
    continuation: Option<TaskContinuation>,
    has_continuation: bool,
}

/// Type-erased view of a [`CoreTask`], used where tasks with different payload
/// types are tracked together.
pub trait AnyCoreTask: Send + Sync {
    fn state(&self) -> TaskState;

    fn is_ready(&self) -> bool;

    fn error(&self) -> Option<TaskError>;

    fn add_ready_callback(&self, callback: ReadyCallback);
}

/// Reference-counted task state: pending, resolved with a `T`, or rejected with
/// a [`TaskError`].
///
/// # Examples
///
/// ```rust
/// use core_task::core_task::{CoreTask, TaskState};
///
/// let task = CoreTask::new();
/// assert!(task.try_resolve(7));
/// assert!(!task.try_resolve(8));
/// assert_eq!(task.state(), TaskState::Resolved);
/// assert_eq!(task.data(), Some(7));
/// ```
pub struct CoreTask<T = ()> {
    state: AtomicU8,
    slot: SpinLock<Slot<T>>,
    notifications: SpinLock<Notifications>,
    waker: AtomicWaker,
}

impl<T> CoreTask<T> {
    pub fn new() -> Self {
        Self::with_state(PENDING, Slot::Empty)
    }

    /// Creates a task that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_state(RESOLVED, Slot::Value(value))
    }

    /// Creates a task that is already rejected with `error`.
    pub fn rejected(error: TaskError) -> Self {
        Self::with_state(REJECTED, Slot::Error(error))
    }

    fn with_state(state: u8, slot: Slot<T>) -> Self {
        Self {
            state: AtomicU8::new(state),
            slot: SpinLock::new(slot),
            notifications: SpinLock::new(Notifications::default()),
            waker: AtomicWaker::new(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            RESOLVED => TaskState::Resolved,
            REJECTED => TaskState::Rejected,
            _ => TaskState::Pending,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) >= RESOLVED
    }

    /// Attempts the `Pending -> Resolved` transition.
    ///
    /// `writer` is invoked exactly once, and only when this call wins the
    /// race, to produce the payload before the new state becomes visible.
    /// Returns whether this call performed the transition.
    ///
    /// If `writer` panics the task is rejected with [`TaskError::Failed`]
    /// before the panic propagates, so awaiters still observe an outcome.
    pub fn try_resolve_with<F>(&self, writer: F) -> bool
    where
        F: FnOnce() -> T,
    {
        if !self.begin_transition() {
            tracing::trace!(target: "core_task", "resolve lost the race");
            return false;
        }

        let unwind = RejectOnUnwind { task: self };
        let value = writer();
        mem::forget(unwind);

        *self.slot.lock() = Slot::Value(value);
        self.finish_transition(RESOLVED);
        true
    }

    pub fn try_resolve(&self, value: T) -> bool {
        self.try_resolve_with(move || value)
    }

    /// Attempts the `Pending -> Rejected` transition.
    pub fn try_reject_with_error(&self, error: TaskError) -> bool {
        if !self.begin_transition() {
            tracing::trace!(target: "core_task", %error, "reject lost the race");
            return false;
        }

        *self.slot.lock() = Slot::Error(error);
        self.finish_transition(REJECTED);
        true
    }

    /// Returns the rejection error. Non-empty iff the task is rejected.
    pub fn error(&self) -> Option<TaskError> {
        if self.state.load(Ordering::Acquire) != REJECTED {
            return None;
        }

        match &*self.slot.lock() {
            Slot::Error(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Returns a copy of the payload once the task is resolved.
    ///
    /// `None` while pending, when rejected, or after the single consumer moved
    /// the value out.
    pub fn data(&self) -> Option<T>
    where
        T: Clone,
    {
        if self.state.load(Ordering::Acquire) != RESOLVED {
            return None;
        }

        match &*self.slot.lock() {
            Slot::Value(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Registers a callback fired once the task is ready.
    ///
    /// Fires immediately, on the calling thread, if the task is already ready.
    pub fn add_ready_callback(&self, callback: ReadyCallback) {
        let callback = {
            let mut notifications = self.notifications.lock();
            if !self.is_ready() {
                notifications.ready_callbacks.push(callback);
                return;
            }
            callback
        };

        callback();
    }

    /// Installs the consumer continuation.
    ///
    /// A task has a single logical consumer, so a continuation can be set only
    /// once. If the task is already ready the continuation is scheduled right
    /// away.
    pub fn set_continuation(&self, continuation: TaskContinuation) {
        let ready = {
            let mut notifications = self.notifications.lock();
            debug_assert!(
                !notifications.has_continuation,
                "Task continuation is already set"
            );
            notifications.has_continuation = true;

            if self.is_ready() {
                Some(continuation)
            } else {
                notifications.continuation = Some(continuation);
                None
            }
        };

        if let Some(continuation) = ready {
            continuation.run();
        }
    }

    pub fn has_continuation(&self) -> bool {
        self.notifications.lock().has_continuation
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Moves the outcome out for the single consumer.
    pub(crate) fn take_result(&self) -> Result<T> {
        if !self.is_ready() {
            return Err(TaskError::NotReady);
        }

        let mut slot = self.slot.lock();
        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Value(value) => Ok(value),
            Slot::Error(error) => {
                *slot = Slot::Error(error.clone());
                Err(error)
            }
            Slot::Taken => Err(TaskError::ResultTaken),
            Slot::Empty => {
                *slot = Slot::Empty;
                Err(TaskError::NotReady)
            }
        }
    }

    pub(crate) fn cloned_result(&self) -> Result<T>
    where
        T: Clone,
    {
        if !self.is_ready() {
            return Err(TaskError::NotReady);
        }

        match &*self.slot.lock() {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Error(error) => Err(error.clone()),
            Slot::Taken => Err(TaskError::ResultTaken),
            Slot::Empty => Err(TaskError::NotReady),
        }
    }

    fn begin_transition(&self) -> bool {
        self.state
            .compare_exchange(PENDING, RESOLVING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish_transition(&self, terminal: u8) {
        self.state.store(terminal, Ordering::Release);

        let (callbacks, continuation) = {
            let mut notifications = self.notifications.lock();
            (
                mem::take(&mut notifications.ready_callbacks),
                notifications.continuation.take(),
            )
        };

        for callback in callbacks {
            callback();
        }

        if let Some(continuation) = continuation {
            continuation.run();
        }

        self.waker.wake();
    }
}

/// Completes a task whose payload writer unwound mid-transition.
struct RejectOnUnwind<'a, T> {
    task: &'a CoreTask<T>,
}

impl<T> Drop for RejectOnUnwind<'_, T> {
    fn drop(&mut self) {
        tracing::error!(target: "core_task", "task payload writer panicked");
        *self.task.slot.lock() = Slot::Error(TaskError::failed("task payload writer panicked"));
        self.task.finish_transition(REJECTED);
    }
}

impl<T> Default for CoreTask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CoreTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreTask")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> AnyCoreTask for CoreTask<T> {
    fn state(&self) -> TaskState {
        CoreTask::state(self)
    }

    fn is_ready(&self) -> bool {
        CoreTask::is_ready(self)
    }

    fn error(&self) -> Option<TaskError> {
        CoreTask::error(self)
    }

    fn add_ready_callback(&self, callback: ReadyCallback) {
        CoreTask::add_ready_callback(self, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use mockall::mock;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Barrier, Mutex};
    use std::thread;

    mock! {
        pub Exec {}

        impl Executor for Exec {
            fn execute(&self, invocation: Invocation);
        }
    }

    #[test]
    fn test_resolve_once() {
        let task = CoreTask::new();
        assert_eq!(task.state(), TaskState::Pending);
        assert!(!task.is_ready());
        assert_eq!(task.data(), None);

        assert!(task.try_resolve(String::from("first")));
        assert!(!task.try_resolve(String::from("second")));
        assert!(!task.try_reject_with_error(TaskError::failed("late")));

        assert_eq!(task.state(), TaskState::Resolved);
        assert!(task.error().is_none());
        assert_eq!(task.data().as_deref(), Some("first"));
    }

    #[test]
    fn test_reject_once() {
        let task: CoreTask<u32> = CoreTask::new();

        assert!(task.try_reject_with_error(TaskError::failed("boom")));
        assert!(!task.try_resolve(1));

        assert_eq!(task.state(), TaskState::Rejected);
        assert!(task.is_ready());
        assert_eq!(task.error().unwrap().to_string(), "Task failed: boom");
        assert_eq!(task.data(), None);
    }

    #[test]
    fn test_writer_runs_only_for_winner() {
        let task = CoreTask::new();
        let calls = AtomicUsize::new(0);

        assert!(task.try_resolve_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            10
        }));
        assert!(!task.try_resolve_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            20
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(task.data(), Some(10));
    }

    #[test]
    fn test_panicking_writer_rejects_task() {
        let task = Arc::new(CoreTask::<u32>::new());
        let notified = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&notified);
        task.add_ready_callback(Box::new(move || flag.store(true, Ordering::SeqCst)));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.try_resolve_with(|| panic!("writer failed"))
        }));

        assert!(result.is_err());
        assert!(notified.load(Ordering::SeqCst));
        assert_eq!(task.state(), TaskState::Rejected);
        assert!(matches!(task.error(), Some(TaskError::Failed(_))));
        assert!(!task.try_resolve(1));
    }

    #[test]
    fn test_concurrent_transitions_have_single_winner() {
        const THREADS: usize = 16;

        for _ in 0..20 {
            let task = Arc::new(CoreTask::<usize>::new());
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS)
                .map(|index| {
                    let task = Arc::clone(&task);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let won = if index % 2 == 0 {
                            task.try_resolve(index)
                        } else {
                            task.try_reject_with_error(TaskError::failed(index.to_string()))
                        };
                        won.then_some(index)
                    })
                })
                .collect();

            let winners: Vec<usize> = handles
                .into_iter()
                .filter_map(|handle| handle.join().unwrap())
                .collect();

            assert_eq!(winners.len(), 1);
            let winner = winners[0];
            if winner % 2 == 0 {
                assert_eq!(task.state(), TaskState::Resolved);
                assert_eq!(task.data(), Some(winner));
            } else {
                assert_eq!(task.state(), TaskState::Rejected);
                assert_eq!(
                    task.error().unwrap().to_string(),
                    format!("Task failed: {winner}")
                );
            }
        }
    }

    #[test]
    fn test_ready_callbacks_fire_in_order() {
        let task = CoreTask::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for index in 0..3 {
            let order = Arc::clone(&order);
            task.add_ready_callback(Box::new(move || order.lock().unwrap().push(index)));
        }
        assert!(order.lock().unwrap().is_empty());

        task.try_resolve(());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

        let late = Arc::clone(&order);
        task.add_ready_callback(Box::new(move || late.lock().unwrap().push(3)));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_callback_may_reenter_task() {
        let task = Arc::new(CoreTask::new());
        let observed = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&task);
        let sink = Arc::clone(&observed);
        task.add_ready_callback(Box::new(move || {
            *sink.lock().unwrap() = inner.data();
        }));

        task.try_resolve(5);
        assert_eq!(*observed.lock().unwrap(), Some(5));
    }

    #[test]
    fn test_inline_continuation_runs_once() {
        let task = CoreTask::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        task.set_continuation(TaskContinuation::inline(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(task.has_continuation());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        task.try_resolve(());
        task.try_resolve(());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuation_on_ready_task_runs_immediately() {
        let task: CoreTask = CoreTask::rejected(TaskError::failed("done"));
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        task.set_continuation(TaskContinuation::inline(move || {
            flag.store(true, Ordering::SeqCst);
        }));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_continuation_scheduled_on_captured_executor() {
        let mut executor = MockExec::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|invocation| invocation());
        let executor: ExecutorPtr = Arc::new(executor);

        let task = CoreTask::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let continuation =
            TaskContinuation::new(move || flag.store(true, Ordering::SeqCst), Some(executor));
        assert!(continuation.has_executor());

        task.set_continuation(continuation);
        assert!(!ran.load(Ordering::SeqCst));

        task.try_resolve(());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_prebuilt_states() {
        let resolved = CoreTask::resolved(3u8);
        assert_eq!(resolved.state(), TaskState::Resolved);
        assert_eq!(resolved.data(), Some(3));

        let rejected: CoreTask<u8> = CoreTask::rejected(TaskError::InvalidState);
        assert_eq!(rejected.state(), TaskState::Rejected);
        assert!(rejected.error().is_some());
    }

    #[test]
    fn test_take_result_moves_value_once() {
        let task = CoreTask::resolved(vec![1, 2, 3]);

        assert_eq!(task.cloned_result().unwrap(), vec![1, 2, 3]);
        assert_eq!(task.take_result().unwrap(), vec![1, 2, 3]);
        assert!(matches!(task.take_result(), Err(TaskError::ResultTaken)));
        assert_eq!(task.data(), None);
    }

    #[test]
    fn test_type_erased_view() {
        let task: AnyCoreTaskPtr = Arc::new(CoreTask::<String>::new());
        assert_eq!(task.state(), TaskState::Pending);
        assert!(!task.is_ready());
        assert!(task.error().is_none());
    }
}

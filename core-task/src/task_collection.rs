//! Lifetime tracking for fire-and-forget tasks.
//!
//! A component that starts background work pushes every resulting task into
//! its [`TaskCollection`] and, during teardown, awaits
//! [`TaskCollection::dispose_async`] before it goes away. Dropping a collection
//! that still tracks pending tasks is a fatal error.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::core_task::AnyCoreTaskPtr;
use crate::error::fatal;
use crate::multi_task_source::MultiTaskSource;
use crate::spin_lock::SpinLock;
use crate::task::Task;

struct TrackedTask {
    id: u64,
    task: AnyCoreTaskPtr,
}

#[derive(Default)]
struct CollectionState {
    tasks: Vec<TrackedTask>,
    next_id: u64,
    /// Signals "drained to empty" to everyone awaiting completion.
    close: Option<MultiTaskSource<()>>,
    is_disposing: bool,
    is_disposed: bool,
}

#[derive(Default)]
struct Shared {
    state: SpinLock<CollectionState>,
}

impl Shared {
    fn complete(&self, id: u64) {
        let close = {
            let mut state = self.state.lock();
            if let Some(index) = state.tasks.iter().position(|tracked| tracked.id == id) {
                state.tasks.swap_remove(index);
            }
            if !state.tasks.is_empty() {
                return;
            }
            if state.is_disposing {
                state.is_disposed = true;
            }
            state.close.take()
        };

        if let Some(close) = close {
            tracing::debug!(target: "core_task", "task collection drained");
            close.resolve(());
        }
    }
}

/// Unordered set of in-flight tasks with an "all done" barrier.
///
/// # Examples
///
/// ```rust
/// use core_task::{TaskCollection, TaskSource};
///
/// let collection = TaskCollection::new();
/// let mut source = TaskSource::<()>::new();
/// collection.push(source.get_task());
///
/// let done = collection.dispose_async();
/// assert!(!done.is_ready());
///
/// source.resolve(());
/// assert!(done.is_ready());
/// assert!(collection.is_empty());
/// ```
#[derive(Default)]
pub struct TaskCollection {
    shared: Arc<Shared>,
}

impl TaskCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `task` until it completes.
    ///
    /// Empty and already completed tasks need no tracking and are dropped
    /// right away.
    pub fn push<T: Send + 'static>(&self, task: Task<T>) {
        if task.is_ready() {
            return;
        }
        let Some(core) = task.into_any() else {
            return;
        };

        let id = {
            let mut state = self.shared.state.lock();
            if state.is_disposed {
                tracing::warn!(target: "core_task", "task pushed into a disposed collection");
            }
            let id = state.next_id;
            state.next_id += 1;
            state.tasks.push(TrackedTask {
                id,
                task: Arc::clone(&core),
            });
            id
        };

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        core.add_ready_callback(Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.complete(id);
            }
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().tasks.is_empty()
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    pub fn is_disposing(&self) -> bool {
        self.shared.state.lock().is_disposing
    }

    /// `true` once the collection drained after [`dispose_async`](Self::dispose_async).
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().is_disposed
    }

    /// Returns a task that resolves once every tracked task, including tasks
    /// pushed after this call, has completed.
    pub fn await_completion(&self) -> Task<()> {
        self.close_task(false)
    }

    /// Like [`await_completion`](Self::await_completion), and marks the
    /// collection as disposing.
    pub fn dispose_async(&self) -> Task<()> {
        self.close_task(true)
    }

    fn close_task(&self, dispose: bool) -> Task<()> {
        let mut state = self.shared.state.lock();
        if dispose && !state.is_disposing {
            tracing::debug!(
                target: "core_task",
                outstanding = state.tasks.len(),
                "disposing task collection"
            );
            state.is_disposing = true;
        }

        if state.tasks.is_empty() {
            if state.is_disposing {
                state.is_disposed = true;
            }
            return Task::make_resolved(());
        }

        state
            .close
            .get_or_insert_with(MultiTaskSource::new)
            .get_next_task()
    }
}

impl Drop for TaskCollection {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        let outstanding = self
            .shared
            .state
            .lock()
            .tasks
            .iter()
            .filter(|tracked| !tracked.task.is_ready())
            .count();

        if outstanding > 0 {
            tracing::error!(target: "core_task", outstanding, "task collection dropped early");
            fatal("TaskCollection dropped with outstanding tasks");
        }
    }
}

impl fmt::Debug for TaskCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskCollection")
            .field("tasks", &state.tasks.len())
            .field("is_disposing", &state.is_disposing)
            .field("is_disposed", &state.is_disposed)
            .finish()
    }
}

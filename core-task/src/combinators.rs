//! Combinators that wait on several tasks at once.
//!
//! Inputs are observed through ready callbacks and never consumed, so the
//! caller keeps ownership of every task it passes in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core_task::{AnyCoreTaskPtr, CoreTaskPtr};
use crate::task::{Task, TaskSource};

/// Anything that can be observed by [`when_all`] and [`when_any`].
pub trait AsAnyCoreTask {
    /// `None` for an empty task.
    fn as_any_core_task(&self) -> Option<AnyCoreTaskPtr>;
}

impl<T: Send + 'static> AsAnyCoreTask for &Task<T> {
    fn as_any_core_task(&self) -> Option<AnyCoreTaskPtr> {
        self.as_any()
    }
}

impl<T: Send + 'static> AsAnyCoreTask for CoreTaskPtr<T> {
    fn as_any_core_task(&self) -> Option<AnyCoreTaskPtr> {
        Some(Arc::clone(self) as AnyCoreTaskPtr)
    }
}

impl AsAnyCoreTask for AnyCoreTaskPtr {
    fn as_any_core_task(&self) -> Option<AnyCoreTaskPtr> {
        Some(Arc::clone(self))
    }
}

/// Resolves once every task is ready, whether resolved or rejected.
///
/// Empty tasks are ignored. If nothing is pending the returned task is already
/// resolved.
///
/// ```rust
/// use core_task::{when_all, TaskSource};
///
/// let mut a = TaskSource::<u8>::new();
/// let mut b = TaskSource::<String>::new();
/// let (ta, tb) = (a.get_task(), b.get_task());
///
/// let all = when_all([&ta]);
/// a.resolve(1);
/// assert!(all.is_ready());
///
/// let all = when_all([&tb]);
/// assert!(!all.is_ready());
/// b.resolve("two".into());
/// assert!(all.is_ready());
/// ```
pub fn when_all<I>(tasks: I) -> Task<()>
where
    I: IntoIterator,
    I::Item: AsAnyCoreTask,
{
    let pending = collect_pending(tasks);
    if pending.is_empty() {
        return Task::make_resolved(());
    }

    let (source, task) = shared_source();
    let remaining = Arc::new(AtomicUsize::new(pending.len()));

    for core in pending {
        let source = Arc::clone(&source);
        let remaining = Arc::clone(&remaining);
        core.add_ready_callback(Box::new(move || {
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                source.resolve(());
            }
        }));
    }

    task
}

/// Resolves as soon as at least one task is ready.
///
/// An input without any pending task (including an empty input) yields an
/// already resolved task.
pub fn when_any<I>(tasks: I) -> Task<()>
where
    I: IntoIterator,
    I::Item: AsAnyCoreTask,
{
    let mut pending = Vec::new();
    for task in tasks {
        match task.as_any_core_task() {
            Some(core) if core.is_ready() => return Task::make_resolved(()),
            Some(core) => pending.push(core),
            None => {}
        }
    }
    if pending.is_empty() {
        return Task::make_resolved(());
    }

    let (source, task) = shared_source();
    for core in pending {
        let source = Arc::clone(&source);
        core.add_ready_callback(Box::new(move || {
            source.resolve(());
        }));
    }

    task
}

fn collect_pending<I>(tasks: I) -> Vec<AnyCoreTaskPtr>
where
    I: IntoIterator,
    I::Item: AsAnyCoreTask,
{
    tasks
        .into_iter()
        .filter_map(|task| task.as_any_core_task())
        .filter(|core| !core.is_ready())
        .collect()
}

fn shared_source() -> (Arc<TaskSource<()>>, Task<()>) {
    let mut source = TaskSource::new();
    let task = source.get_task();
    (Arc::new(source), task)
}

//! Blocking waits for code that lives outside of `async` contexts.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::task::Task;

#[derive(Default)]
struct ReadySignal {
    ready: Mutex<bool>,
    condvar: Condvar,
}

impl ReadySignal {
    fn notify(&self) {
        *self.ready.lock() = true;
        self.condvar.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut ready = self.ready.lock();
        match timeout {
            None => {
                while !*ready {
                    self.condvar.wait(&mut ready);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*ready {
                    if self.condvar.wait_until(&mut ready, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        *ready
    }
}

/// Blocks the calling thread until `task` is ready or `timeout` elapses.
///
/// Returns whether the task is ready. An empty task never becomes ready, so
/// it returns `false` immediately.
///
/// Must not be called on a thread whose work is needed to complete `task`.
///
/// A wait that times out leaves its ready callback registered until the task
/// completes. The callback only holds a weak reference to the signal, but
/// polling a long-pending task in a loop still grows its callback list by
/// one entry per timed-out call.
pub fn wait<T>(task: &Task<T>, timeout: Option<Duration>) -> bool {
    let Some(core) = task.core_task() else {
        return false;
    };
    if core.is_ready() {
        return true;
    }

    let signal = Arc::new(ReadySignal::default());
    let notifier: Weak<ReadySignal> = Arc::downgrade(&signal);
    core.add_ready_callback(Box::new(move || {
        if let Some(signal) = notifier.upgrade() {
            signal.notify();
        }
    }));

    signal.wait(timeout)
}

/// Blocks until `task` is ready and returns its outcome.
pub fn wait_result<T>(task: Task<T>) -> Result<T> {
    wait(&task, None);
    task.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::TaskSource;
    use std::thread;

    #[test]
    fn test_wait_on_ready_task() {
        let task = Task::make_resolved(1);
        assert!(wait(&task, Some(Duration::ZERO)));
    }

    #[test]
    fn test_wait_times_out() {
        let mut source = TaskSource::<()>::new();
        let task = source.get_task();

        let started = Instant::now();
        assert!(!wait(&task, Some(Duration::from_millis(30))));
        assert!(started.elapsed() >= Duration::from_millis(30));

        source.resolve(());
        assert!(wait(&task, Some(Duration::from_millis(30))));
    }

    #[test]
    fn test_timed_out_wait_releases_its_signal() {
        let mut source = TaskSource::<()>::new();
        let task = source.get_task();

        for _ in 0..3 {
            assert!(!wait(&task, Some(Duration::from_millis(1))));
        }

        // Stale callbacks find their signals gone and do nothing.
        source.resolve(());
        assert!(wait(&task, Some(Duration::ZERO)));
    }

    #[test]
    fn test_wait_result_across_threads() {
        let mut source = TaskSource::new();
        let task = source.get_task();

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            source.resolve(String::from("done"));
        });

        assert_eq!(wait_result(task).unwrap(), "done");
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_result_rejected_and_empty() {
        let rejected: Task<u8> = Task::make_rejected(TaskError::failed("x"));
        assert!(matches!(wait_result(rejected), Err(TaskError::Failed(_))));

        assert!(!wait(&Task::<u8>::empty(), None));
        assert!(matches!(wait_result(Task::<u8>::empty()), Err(TaskError::Empty)));
    }
}

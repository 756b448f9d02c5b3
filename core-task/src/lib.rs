//! Task object model for asynchronous engine work.
//!
//! This crate provides a reference-counted promise/future system that any
//! subsystem can use to hand out asynchronous results, broadcast them to many
//! consumers, and track background work for graceful shutdown.
//!
//! # Architecture
//!
//! Everything is built on top of [`CoreTask`], a shared state machine that
//! moves exactly once from pending to resolved or rejected. The remaining
//! types are thin handles around it:
//!
//! - [`TaskSource`] / [`Task`]: single-shot producer and consumer handles.
//! - [`MultiTaskSource`]: a repeatable signal that hands a fresh task to
//!   every caller of `get_next_task`.
//! - [`TaskCollection`]: an "all done" barrier for fire-and-forget tasks.
//!
//! Internal state is guarded by the non-recursive [`SpinLock`]. Where a
//! continuation runs is decided by an injected [`Executor`]; there is no
//! global executor.
//!
//! # Examples
//!
//! ```rust
//! use core_task::{MultiTaskSource, TaskCollection};
//!
//! # core_task::runtime::block_on(async {
//! let loaded = MultiTaskSource::<String>::new();
//! let background = TaskCollection::new();
//!
//! let first = loaded.get_next_task();
//! let second = loaded.get_next_task();
//! background.push(loaded.get_next_task());
//!
//! loaded.resolve("texture.dds".to_owned());
//!
//! assert_eq!(first.await.unwrap(), "texture.dds");
//! assert_eq!(second.await.unwrap(), "texture.dds");
//! background.dispose_async().await.unwrap();
//! # });
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_task_macros::{main, test};

pub mod combinators;
pub mod core_task;
pub mod error;
pub mod executor;
pub mod multi_task_source;
pub mod runtime;
pub mod spin_lock;
pub mod task;
pub mod task_collection;
pub mod wait;

pub use crate::core_task::{
    AnyCoreTask, AnyCoreTaskPtr, CoreTask, CoreTaskPtr, ReadyCallback, TaskContinuation,
    TaskState,
};
pub use combinators::{when_all, when_any, AsAnyCoreTask};
pub use error::{Result, TaskError};
pub use executor::{Executor, ExecutorPtr, InlineExecutor, Invocation, TokioExecutor};
pub use multi_task_source::MultiTaskSource;
pub use spin_lock::{
    RawSpinLock, RecursiveSpinLock, RecursiveSpinLockGuard, SpinLock, SpinLockGuard, ThreadToken,
};
pub use task::{Task, TaskSource};
pub use task_collection::TaskCollection;
pub use wait::{wait, wait_result};

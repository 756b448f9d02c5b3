//! # Core Runtime Module
//!
//! Provides the ambient infrastructure around the task object model:
//! - Logging and tracing initialisation
//! - Runtime configuration
//! - [`TaskRuntime`], a Tokio-backed host that exposes an injected executor,
//!   spawns futures as tasks and tracks background work until shutdown
//!
//! ## Overview
//!
//! `core-task` never creates threads or picks an executor on its own. This
//! crate is where a process decides how many workers it runs, what they are
//! called, and how continuations are scheduled.
//!
//! ```no_run
//! use core_runtime::{RuntimeConfig, TaskRuntime};
//!
//! let config = RuntimeConfig::builder().worker_threads(2).build()?;
//! let runtime = TaskRuntime::start(config)?;
//!
//! let task = runtime.spawn(async { 40 + 2 });
//! assert_eq!(runtime.block_on(task)?, 42);
//!
//! runtime.shutdown()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod logging;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use error::{Error, Result};
pub use host::TaskRuntime;
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};

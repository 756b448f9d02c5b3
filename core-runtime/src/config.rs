//! # Runtime Configuration
//!
//! The configuration system uses a builder pattern to construct a
//! [`RuntimeConfig`] for [`TaskRuntime`](crate::TaskRuntime). Every value has a
//! sensible default, and `build()` validates fail-fast with actionable error
//! messages.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::RuntimeConfig;
//! use core_runtime::logging::{LogLevel, LoggingConfig};
//!
//! let config = RuntimeConfig::builder()
//!     .worker_threads(4)
//!     .thread_name("asset-loader")
//!     .executor_name("assets")
//!     .logging(LoggingConfig::default().with_level(LogLevel::Debug))
//!     .build()
//!     .expect("Failed to build config");
//!
//! assert_eq!(config.worker_threads, 4);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::RuntimeConfig;
//!
//! // This will panic with an actionable error message
//! let config = RuntimeConfig::builder()
//!     .worker_threads(0)
//!     .build()
//!     .expect("Should fail - no worker threads");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::time::Duration;

/// Upper bound for `worker_threads`.
pub const MAX_WORKER_THREADS: usize = 512;

pub const DEFAULT_THREAD_NAME: &str = "task-runtime-worker";
pub const DEFAULT_EXECUTOR_NAME: &str = "default";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a [`TaskRuntime`](crate::TaskRuntime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of Tokio worker threads
    pub worker_threads: usize,

    /// Name given to every worker thread
    pub thread_name: String,

    /// Name reported by the host executor
    pub executor_name: String,

    /// Schedule continuations registered through the host on the host
    /// executor instead of running them on the resolving thread
    pub continue_on_executor: bool,

    /// How long `shutdown` waits for background tasks, and then for the
    /// worker threads
    pub shutdown_timeout: Duration,

    /// Logging to initialise on start, if any
    pub logging: Option<LoggingConfig>,
}

impl RuntimeConfig {
    /// Creates a new builder for constructing a `RuntimeConfig`.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Worker thread count is > 0 and <= [`MAX_WORKER_THREADS`]
    /// - Thread and executor names are not empty
    /// - Shutdown timeout is not zero
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config(
                "Worker thread count must be greater than 0".to_string(),
            ));
        }

        if self.worker_threads > MAX_WORKER_THREADS {
            return Err(Error::Config(format!(
                "Worker thread count exceeds maximum of {}",
                MAX_WORKER_THREADS
            )));
        }

        if self.thread_name.trim().is_empty() {
            return Err(Error::Config(
                "Thread name cannot be empty. Use .thread_name() to set it.".to_string(),
            ));
        }

        if self.executor_name.trim().is_empty() {
            return Err(Error::Config(
                "Executor name cannot be empty. Use .executor_name() to set it.".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(Error::Config(
                "Shutdown timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            executor_name: DEFAULT_EXECUTOR_NAME.to_string(),
            continue_on_executor: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            logging: None,
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|threads| threads.get())
        .unwrap_or(1)
        .min(MAX_WORKER_THREADS)
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    worker_threads: Option<usize>,
    thread_name: Option<String>,
    executor_name: Option<String>,
    continue_on_executor: Option<bool>,
    shutdown_timeout: Option<Duration>,
    logging: Option<LoggingConfig>,
}

impl RuntimeConfigBuilder {
    /// Sets the number of worker threads.
    ///
    /// Default: available parallelism
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Sets the worker thread name.
    ///
    /// Default: `"task-runtime-worker"`
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Sets the name reported by the host executor.
    pub fn executor_name(mut self, name: impl Into<String>) -> Self {
        self.executor_name = Some(name.into());
        self
    }

    /// Chooses where continuations registered through the host run.
    ///
    /// Default: `true` (on the host executor)
    pub fn continue_on_executor(mut self, enabled: bool) -> Self {
        self.continue_on_executor = Some(enabled);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Initialises logging when the runtime starts.
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Builds the final `RuntimeConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any value fails
    /// [`RuntimeConfig::validate`].
    pub fn build(self) -> Result<RuntimeConfig> {
        let defaults = RuntimeConfig::default();

        let config = RuntimeConfig {
            worker_threads: self.worker_threads.unwrap_or(defaults.worker_threads),
            thread_name: self.thread_name.unwrap_or(defaults.thread_name),
            executor_name: self.executor_name.unwrap_or(defaults.executor_name),
            continue_on_executor: self
                .continue_on_executor
                .unwrap_or(defaults.continue_on_executor),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(defaults.shutdown_timeout),
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}

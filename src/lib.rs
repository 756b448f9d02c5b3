//! Workspace placeholder crate.
//!
//! This crate exposes the workspace crates behind a single dependency. Host
//! applications can depend on `task-runtime-workspace` and enable the
//! documented features without wiring each crate individually:
//!
//! - `runtime` (default): the Tokio-backed host from `core-runtime`.

pub use core_task as task;

#[cfg(feature = "runtime")]
pub use core_runtime as runtime;

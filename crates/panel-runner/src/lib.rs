//! Panel Dispatch Engine
//!
//! Runs a batch of [`panel_core::Task`]s as external processes, at most
//! `max_concurrency` at a time, and returns one [`panel_core::TaskResult`]
//! per task in input order.
//!
//! Each task runs in its own process group with a filtered environment.
//! Its output is mirrored to `<output_dir>/<id>.md` and `<id>.stderr` while a
//! bounded, ANSI-stripped copy is kept in memory. Deadlines and cancellation
//! terminate the whole group, gracefully first and forcibly after a grace
//! period.

pub mod capture;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod executor;
pub mod terminate;

pub use capture::{strip_ansi, BoundedBuffer, MAX_CAPTURE_BYTES, TRUNCATION_MARKER};
pub use dispatch::{Dispatcher, DEFAULT_MAX_CONCURRENCY};
pub use env::{default_env, filter_env};
pub use error::RunnerError;
pub use executor::{stderr_path, stdout_path, TaskExecutor, DEFAULT_GRACE, DEFAULT_TIMEOUT};
pub use terminate::{ProcessGroup, Signal};

// Re-exported so callers need not depend on tokio-util directly.
pub use tokio_util::sync::CancellationToken;

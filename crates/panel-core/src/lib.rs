//! Panel Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Process spawning
//! - Async runtimes
//! - Terminal rendering
//!
//! Everything the dispatch engine consumes or produces is described here:
//! invocations, tasks, results, progress events, failure diagnoses and
//! cross-product expansion of tasks with modifiers.

pub mod diagnosis;
pub mod error;
pub mod event;
pub mod expand;
pub mod ids;
pub mod invocation;
pub mod modifier;
pub mod result;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use diagnosis::{classify, DiagCategory, Diagnosis};
pub use error::CoreError;
pub use event::{ProgressEvent, ProgressKind, ProgressObserver};
pub use expand::{alias_duplicates, expand, unalias, COMPOSITE_SEPARATOR};
pub use ids::{is_file_safe, CompositeId, TaskId};
pub use invocation::{AccessPolicy, Invocation, InvocationBuilder, RunParams};
pub use modifier::{inject, validate_modifier_id, FsModifierSource, ModifierCache, ModifierSource};
pub use result::{TaskResult, Usage, UsageParser, EXIT_CODE_NOT_RUN};
pub use status::Status;
pub use task::Task;

//! Error types for the dispatch engine.
//!
//! Only conditions that make a whole batch meaningless are errors here.
//! Anything that goes wrong with a single task is recorded in that task's
//! result instead.

use std::path::PathBuf;

use panel_core::TaskId;
use thiserror::Error;

/// Engine-level dispatch errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The output directory does not exist or is not a directory.
    #[error("Output directory '{0}' does not exist or is not a directory")]
    OutputDirMissing(PathBuf),

    /// Two tasks in one batch share an id, so their output files would collide.
    #[error("Duplicate task id in batch: {0}")]
    DuplicateTaskId(TaskId),
}

//! Terminal status of a dispatched task.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of a task.
///
/// A task only ever reports one of these once it has finished; there is no
/// "pending" or "running" status on a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Process exited with code 0 before its deadline.
    Success,
    /// Process exited non-zero, failed to spawn, or its output could not be captured.
    Failed,
    /// Process was still running when its deadline elapsed.
    Timeout,
    /// The dispatch was cancelled before or while the task ran.
    Cancelled,
}

impl Status {
    /// Lowercase name used in manifests and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

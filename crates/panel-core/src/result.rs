//! Task results and usage metadata.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::diagnosis::{classify, Diagnosis};
use crate::{Status, TaskId};

/// Exit code reported when the process never ran (spawn or capture failure,
/// cancellation before start).
pub const EXIT_CODE_NOT_RUN: i32 = -1;

/// Token and cost usage reported by a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub input_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub total_usd: f64,
}

impl Usage {
    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_usd == 0.0
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

/// Extracts usage metadata from a task's raw standard error.
pub trait UsageParser: Send + Sync {
    /// Parse usage from raw (not ANSI-stripped) stderr bytes.
    fn parse(&self, stderr: &[u8]) -> Option<Usage>;
}

impl<F> UsageParser for F
where
    F: Fn(&[u8]) -> Option<Usage> + Send + Sync,
{
    fn parse(&self, stderr: &[u8]) -> Option<Usage> {
        self(stderr)
    }
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    /// Id of the task this result belongs to.
    pub id: TaskId,

    /// Terminal status.
    pub status: Status,

    /// Process exit code, or [`EXIT_CODE_NOT_RUN`].
    pub exit_code: i32,

    /// Wall time from executor start to terminal state.
    pub duration: Duration,

    /// Captured standard output, ANSI-stripped and bounded.
    pub stdout: Vec<u8>,

    /// Captured standard error, ANSI-stripped and bounded.
    pub stderr: Vec<u8>,

    /// Usage metadata from the task's usage parser.
    pub usage: Option<Usage>,
}

impl TaskResult {
    /// Result for a task that never started because the dispatch was cancelled.
    pub fn cancelled(id: TaskId) -> Self {
        Self {
            id,
            status: Status::Cancelled,
            exit_code: EXIT_CODE_NOT_RUN,
            duration: Duration::ZERO,
            stdout: Vec::new(),
            stderr: Vec::new(),
            usage: None,
        }
    }

    /// Result for a task that failed before its process could run.
    pub fn not_run(id: TaskId, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::Failed,
            exit_code: EXIT_CODE_NOT_RUN,
            duration,
            stdout: Vec::new(),
            stderr: message.into().into_bytes(),
            usage: None,
        }
    }

    /// Returns true if the task succeeded.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Number of whitespace-separated words on stdout.
    pub fn word_count(&self) -> usize {
        self.stdout_text().split_whitespace().count()
    }

    /// Classify this result's stderr. `None` means a generic failure.
    pub fn diagnose(&self) -> Option<Diagnosis> {
        classify(self.id.as_str(), &self.stderr_text(), self.exit_code)
    }

    /// First line of stderr, cut at 120 characters.
    pub fn stderr_snippet(&self) -> Option<String> {
        let text = self.stderr_text();
        let first = text.trim().lines().next()?.trim();
        if first.is_empty() {
            return None;
        }
        if first.chars().count() > 120 {
            let cut: String = first.chars().take(120).collect();
            Some(format!("{}...", cut))
        } else {
            Some(first.to_string())
        }
    }
}

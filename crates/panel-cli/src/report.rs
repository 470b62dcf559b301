//! Human-readable progress lines and the end-of-run summary.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use panel_core::{ProgressEvent, ProgressKind, ProgressObserver, Status, TaskResult};

/// Prints one line per progress event.
pub struct TextReporter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> ProgressObserver for TextReporter<W> {
    fn on_progress(&self, event: ProgressEvent<'_>) {
        let line = match (event.kind, event.result) {
            (ProgressKind::Started, _) => format!("  started: {}", event.task_id),
            (ProgressKind::Completed, Some(result)) => format!(
                "  {}: {} ({} words)",
                result.status,
                result.id,
                result.word_count()
            ),
            (ProgressKind::Completed, None) => format!("  completed: {}", event.task_id),
        };
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn icon(status: Status) -> &'static str {
    match status {
        Status::Success => "+",
        Status::Failed => "x",
        Status::Timeout => "!",
        Status::Cancelled => "-",
    }
}

/// Write the per-task results table.
///
/// Failed tasks get a diagnosis when one matches, otherwise the first line
/// of their stderr.
pub fn write_summary<W: Write>(out: &mut W, results: &[TaskResult], run_dir: &Path) -> io::Result<()> {
    writeln!(out, "\n--- Results ---")?;
    let width = results.iter().map(|r| r.id.as_str().len()).max().unwrap_or(0);

    for result in results {
        writeln!(
            out,
            " {} {:<width$} {} (exit {}) {:.1}s",
            icon(result.status),
            result.id.as_str(),
            result.status,
            result.exit_code,
            result.duration.as_secs_f64(),
            width = width
        )?;
        if result.is_success() {
            continue;
        }
        if let Some(diagnosis) = result.diagnose() {
            writeln!(out, "   {}", diagnosis.message)?;
            writeln!(out, "   {}", diagnosis.suggestion)?;
        } else if let Some(snippet) = result.stderr_snippet() {
            writeln!(out, "   {}", snippet)?;
        }
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    writeln!(out, "\n{}/{} succeeded", succeeded, results.len())?;
    writeln!(out, "Output: {}", run_dir.display())
}

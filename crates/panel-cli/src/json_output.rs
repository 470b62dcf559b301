//! JSON-lines output for machine consumers.
//!
//! Each line is `{"event": ..., "timestamp": ..., "data": {...}}`.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use panel_core::{ProgressEvent, ProgressKind, ProgressObserver, TaskResult};
use serde::Serialize;

use crate::manifest::Manifest;

/// JSON event types that can be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    RunStarted,
    TaskStarted,
    TaskCompleted,
    RunCompleted,
}

/// One JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Create a new JSON event with the current timestamp.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    pub fn run_started(run_dir: &Path, task_ids: &[String]) -> Self {
        Self::new(
            JsonEventType::RunStarted,
            serde_json::json!({
                "run_dir": run_dir.display().to_string(),
                "tasks": task_ids,
            }),
        )
    }

    pub fn task_started(task_id: &str) -> Self {
        Self::new(
            JsonEventType::TaskStarted,
            serde_json::json!({
                "task_id": task_id,
            }),
        )
    }

    pub fn task_completed(result: &TaskResult) -> Self {
        let diagnosis = if result.is_success() {
            None
        } else {
            result.diagnose()
        };
        Self::new(
            JsonEventType::TaskCompleted,
            serde_json::json!({
                "task_id": result.id.as_str(),
                "status": result.status,
                "exit_code": result.exit_code,
                "duration_ms": result.duration.as_millis() as u64,
                "words": result.word_count(),
                "usage": result.usage,
                "diagnosis": diagnosis,
            }),
        )
    }

    pub fn run_completed(manifest: &Manifest) -> Self {
        Self::new(
            JsonEventType::RunCompleted,
            serde_json::to_value(manifest).unwrap_or(serde_json::Value::Null),
        )
    }

    /// Write this event as one line.
    pub fn write_to<W: Write>(&self, out: &mut W) {
        if let Ok(json) = serde_json::to_string(self) {
            let _ = writeln!(out, "{}", json);
            let _ = out.flush();
        }
    }
}

/// Streams progress events as JSON lines.
pub struct JsonReporter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Emit an event outside the progress stream.
    pub fn emit(&self, event: &JsonEvent) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        event.write_to(&mut *out);
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> ProgressObserver for JsonReporter<W> {
    fn on_progress(&self, event: ProgressEvent<'_>) {
        let json = match (event.kind, event.result) {
            (ProgressKind::Completed, Some(result)) => JsonEvent::task_completed(result),
            _ => JsonEvent::task_started(event.task_id.as_str()),
        };
        self.emit(&json);
    }
}

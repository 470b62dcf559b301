//! Progress events emitted while a batch runs.

use serde::Serialize;

use crate::{TaskId, TaskResult};

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// The task's process was spawned.
    Started,
    /// The task reached a terminal status.
    Completed,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
        }
    }
}

/// A progress notification. Only lives for the duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Task the event is about.
    pub task_id: &'a TaskId,

    /// What happened.
    pub kind: ProgressKind,

    /// Final result; present only on `Completed`.
    pub result: Option<&'a TaskResult>,
}

impl<'a> ProgressEvent<'a> {
    /// Create a `Started` event.
    pub fn started(task_id: &'a TaskId) -> Self {
        Self {
            task_id,
            kind: ProgressKind::Started,
            result: None,
        }
    }

    /// Create a `Completed` event carrying the final result.
    pub fn completed(result: &'a TaskResult) -> Self {
        Self {
            task_id: &result.id,
            kind: ProgressKind::Completed,
            result: Some(result),
        }
    }
}

/// Receives progress events from the dispatch engine.
///
/// May be invoked concurrently from several workers; implementations that
/// mutate shared state must synchronize internally.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent<'_>);
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressEvent<'_>) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent<'_>) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_started_has_no_result() {
        let id = TaskId::new("claude");
        let event = ProgressEvent::started(&id);
        assert_eq!(event.kind, ProgressKind::Started);
        assert!(event.result.is_none());
    }

    #[test]
    fn test_completed_carries_result() {
        let result = TaskResult::cancelled(TaskId::new("codex"));
        let event = ProgressEvent::completed(&result);
        assert_eq!(event.kind, ProgressKind::Completed);
        assert_eq!(event.task_id.as_str(), "codex");
        assert!(event.result.is_some());
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |event: ProgressEvent<'_>| {
            seen.lock()
                .unwrap()
                .push(format!("{}:{}", event.task_id, event.kind.as_str()));
        };
        let id = TaskId::new("amp");
        observer.on_progress(ProgressEvent::started(&id));
        assert_eq!(seen.lock().unwrap().as_slice(), ["amp:started"]);
    }
}

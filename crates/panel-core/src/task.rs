//! Dispatchable tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{Invocation, TaskId, UsageParser};

/// One unit of dispatchable work: an id plus the invocation to run.
///
/// Tasks are independent of each other and are consumed once by the engine.
#[derive(Clone)]
pub struct Task {
    /// Unique id within the batch.
    pub id: TaskId,

    /// Process to launch.
    pub invocation: Invocation,

    /// Overrides the dispatcher's shared timeout.
    pub timeout: Option<Duration>,

    /// Replaces the dispatcher's shared environment.
    pub env: Option<Vec<(String, String)>>,

    /// Parses usage metadata out of this task's stderr.
    pub usage_parser: Option<Arc<dyn UsageParser>>,
}

impl Task {
    /// Create a new Task.
    pub fn new(id: impl Into<TaskId>, invocation: Invocation) -> Self {
        Self {
            id: id.into(),
            invocation,
            timeout: None,
            env: None,
            usage_parser: None,
        }
    }

    /// Builder method to override the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builder method to replace the environment.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Some(env);
        self
    }

    /// Builder method to attach a usage parser.
    pub fn with_usage_parser(mut self, parser: Arc<dyn UsageParser>) -> Self {
        self.usage_parser = Some(parser);
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("invocation", &self.invocation)
            .field("timeout", &self.timeout)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .field("usage_parser", &self.usage_parser.is_some())
            .finish()
    }
}

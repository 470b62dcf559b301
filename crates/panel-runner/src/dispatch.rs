//! Parallel dispatch of a batch of tasks.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use panel_core::{ProgressObserver, Task, TaskId, TaskResult, UsageParser};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::env::default_env;
use crate::error::RunnerError;
use crate::executor::{TaskExecutor, DEFAULT_GRACE, DEFAULT_TIMEOUT};

/// Concurrency used when none (or zero) is configured.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Runs a batch of tasks concurrently, at most `max_concurrency` at a time.
///
/// # Example
///
/// ```rust,no_run
/// use panel_core::{Invocation, Task};
/// use panel_runner::Dispatcher;
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new("./agents/panel").with_max_concurrency(2);
///     let tasks = vec![
///         Task::new("claude", Invocation::new("claude").arg("-p").arg("hi")),
///         Task::new("gemini", Invocation::new("gemini").arg("hi")),
///     ];
///     for result in dispatcher.dispatch(tasks).await? {
///         println!("{}: {}", result.id, result.status);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    output_dir: PathBuf,
    max_concurrency: usize,
    timeout: Duration,
    grace: Duration,
    env: Option<Vec<(String, String)>>,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher writing per-task files into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            env: None,
            observer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the concurrency ceiling. Zero means the default.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = if max == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max
        };
        self
    }

    /// Set the timeout shared by tasks without their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the wait between graceful and forced termination.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set the environment shared by tasks without their own.
    ///
    /// Defaults to the filtered host environment.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Some(env);
        self
    }

    /// Set the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use `cancel` to stop the batch from outside.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Token that cancels this dispatcher's batches.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every task and return their results in input order.
    ///
    /// Returns an error only when the batch itself is invalid; individual
    /// task failures are reported in the results.
    pub async fn dispatch(&self, tasks: Vec<Task>) -> Result<Vec<TaskResult>, RunnerError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        self.validate(&tasks)?;

        info!(
            tasks = tasks.len(),
            max_concurrency = self.max_concurrency,
            output_dir = %self.output_dir.display(),
            "Dispatching batch"
        );

        let executor = Arc::new(self.executor());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut slots: Vec<(TaskId, Option<Arc<dyn UsageParser>>)> = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            slots.push((task.id.clone(), task.usage_parser.clone()));

            let executor = executor.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    debug!(task_id = %task.id, "No permit, batch cancelled");
                    return executor.skip(task);
                };
                debug!(task_id = %task.id, "Permit acquired");
                executor.run(task, &cancel).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for ((id, parser), handle) in slots.into_iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    error!(task_id = %id, reason = %reason, "Task worker panicked");

                    let mut result =
                        TaskResult::not_run(id, Duration::ZERO, format!("Task panicked: {}", reason));
                    result.usage = parser.and_then(|p| {
                        catch_unwind(AssertUnwindSafe(|| p.parse(&result.stderr)))
                            .ok()
                            .flatten()
                    });
                    executor.report(&result);
                    results.push(result);
                }
            }
        }

        info!(
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            total = results.len(),
            "Batch finished"
        );
        Ok(results)
    }

    fn validate(&self, tasks: &[Task]) -> Result<(), RunnerError> {
        if !self.output_dir.is_dir() {
            return Err(RunnerError::OutputDirMissing(self.output_dir.clone()));
        }
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(&task.id) {
                return Err(RunnerError::DuplicateTaskId(task.id.clone()));
            }
        }
        Ok(())
    }

    fn executor(&self) -> TaskExecutor {
        let env = self.env.clone().unwrap_or_else(default_env);
        let mut executor = TaskExecutor::new(&self.output_dir)
            .with_timeout(self.timeout)
            .with_grace(self.grace)
            .with_env(env);
        if let Some(observer) = &self.observer {
            executor = executor.with_observer(observer.clone());
        }
        executor
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Single-task executor.
//!
//! [`TaskExecutor::run`] takes one [`Task`] from not-started to a terminal
//! [`TaskResult`]: output files, spawn, capture, deadline, cancellation and
//! process-group cleanup. Failures never escape as errors; they are recorded
//! in the result.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use panel_core::{
    ProgressEvent, ProgressObserver, Status, Task, TaskId, TaskResult, EXIT_CODE_NOT_RUN,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{capture_stream, strip_ansi, CaptureOutput, MAX_CAPTURE_BYTES};
use crate::terminate::{deadline_in, terminate, terminate_group, GroupGuard, ProcessGroup};

/// Default per-task timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default wait between the graceful and the forced signal.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Path of the stdout file for `id` in `dir`.
pub fn stdout_path(dir: &Path, id: &TaskId) -> PathBuf {
    dir.join(format!("{}.md", id))
}

/// Path of the stderr file for `id` in `dir`.
pub fn stderr_path(dir: &Path, id: &TaskId) -> PathBuf {
    dir.join(format!("{}.stderr", id))
}

/// Raw outcome before ANSI stripping and usage parsing.
struct Outcome {
    status: Status,
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Outcome {
    fn cancelled() -> Self {
        Self {
            status: Status::Cancelled,
            exit_code: EXIT_CODE_NOT_RUN,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn not_run(message: String) -> Self {
        Self {
            status: Status::Failed,
            exit_code: EXIT_CODE_NOT_RUN,
            stdout: Vec::new(),
            stderr: message.into_bytes(),
        }
    }

    fn append_stderr(&mut self, line: &str) {
        if !self.stderr.is_empty() && !self.stderr.ends_with(b"\n") {
            self.stderr.push(b'\n');
        }
        self.stderr.extend_from_slice(line.as_bytes());
        self.stderr.push(b'\n');
    }
}

/// How the wait on a running child ended.
enum Waited {
    Cancelled,
    TimedOut,
    Exited(io::Result<ExitStatus>),
}

/// How draining the output pipes ended.
enum Drained {
    Done(Result<(CaptureOutput, CaptureOutput), tokio::task::JoinError>),
    Expired,
    Cancelled,
}

/// Runs tasks one at a time; shared by every worker of a dispatch.
pub struct TaskExecutor {
    output_dir: PathBuf,
    timeout: Duration,
    grace: Duration,
    env: Arc<Vec<(String, String)>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl TaskExecutor {
    /// Create an executor writing per-task files into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            env: Arc::new(Vec::new()),
            observer: None,
        }
    }

    /// Set the timeout for tasks that carry none of their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the termination grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set the environment for tasks that carry none of their own.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Set the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run `task` to a terminal result.
    ///
    /// Emits `started` after a successful spawn and exactly one `completed`.
    pub async fn run(&self, task: Task, cancel: &CancellationToken) -> TaskResult {
        if cancel.is_cancelled() {
            debug!(task_id = %task.id, "Cancelled before start");
            return self.skip(task);
        }

        let started = Instant::now();
        let outcome = self.execute(&task, cancel).await;
        self.finish(task, outcome, started.elapsed())
    }

    /// Record `task` as cancelled without touching the filesystem.
    pub fn skip(&self, task: Task) -> TaskResult {
        self.finish(task, Outcome::cancelled(), Duration::ZERO)
    }

    /// Report a result produced outside the executor (e.g. a panicked worker).
    pub fn report(&self, result: &TaskResult) {
        self.emit(ProgressEvent::completed(result));
    }

    fn finish(&self, task: Task, outcome: Outcome, duration: Duration) -> TaskResult {
        let usage = task
            .usage_parser
            .as_ref()
            .and_then(|parser| parser.parse(&outcome.stderr));

        let result = TaskResult {
            id: task.id,
            status: outcome.status,
            exit_code: outcome.exit_code,
            duration,
            stdout: strip_ansi(&outcome.stdout),
            stderr: strip_ansi(&outcome.stderr),
            usage,
        };

        info!(
            task_id = %result.id,
            status = %result.status,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "Task finished"
        );
        self.emit(ProgressEvent::completed(&result));
        result
    }

    /// Deliver `event`; a panicking observer is logged and otherwise ignored.
    fn emit(&self, event: ProgressEvent<'_>) {
        let Some(observer) = &self.observer else {
            return;
        };
        let task_id = event.task_id;
        let kind = event.kind;
        if catch_unwind(AssertUnwindSafe(|| observer.on_progress(event))).is_err() {
            error!(task_id = %task_id, event = kind.as_str(), "Progress observer panicked");
        }
    }

    async fn execute(&self, task: &Task, cancel: &CancellationToken) -> Outcome {
        let timeout = task.timeout.unwrap_or(self.timeout);
        let deadline = deadline_in(timeout);

        let (stdout_file, stderr_file) = match self.create_output_files(&task.id).await {
            Ok(files) => files,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to create output files");
                return Outcome::not_run(format!("failed to create output file: {}", e));
            }
        };

        let mut child = match self.spawn(task) {
            Ok(child) => child,
            Err(e) => {
                let program = &task.invocation.program;
                warn!(task_id = %task.id, program = %program, error = %e, "Failed to spawn");
                let message = if e.kind() == io::ErrorKind::NotFound {
                    format!("failed to spawn \"{}\": executable file not found", program)
                } else {
                    format!("failed to spawn \"{}\": {}", program, e)
                };
                return Outcome::not_run(message);
            }
        };

        let pid = child.id();
        let group = pid.filter(|_| cfg!(unix)).map(ProcessGroup::of);
        let mut guard = GroupGuard::new(group);
        info!(task_id = %task.id, pid = pid, timeout_ms = timeout.as_millis() as u64, "Process started");
        self.emit(ProgressEvent::started(&task.id));

        if let Some(payload) = &task.invocation.stdin {
            feed_stdin(&mut child, payload.clone().into_bytes());
        }

        let mut captures = spawn_captures(&mut child, stdout_file, stderr_file);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = &mut sleep => Waited::TimedOut,
            status = child.wait() => Waited::Exited(status),
        };

        let mut wait_error = None;
        let (mut status, mut exit_code) = match waited {
            Waited::Cancelled => {
                info!(task_id = %task.id, "Cancelling running task");
                let _ = terminate(&mut child, group, self.grace).await;
                (Status::Cancelled, EXIT_CODE_NOT_RUN)
            }
            Waited::TimedOut => {
                warn!(task_id = %task.id, timeout_ms = timeout.as_millis() as u64, "Task timed out");
                let _ = terminate(&mut child, group, self.grace).await;
                (Status::Timeout, EXIT_CODE_NOT_RUN)
            }
            Waited::Exited(Ok(exit)) => match exit.code() {
                Some(0) => (Status::Success, 0),
                Some(code) => (Status::Failed, code),
                None => (Status::Failed, EXIT_CODE_NOT_RUN),
            },
            Waited::Exited(Err(e)) => {
                warn!(task_id = %task.id, error = %e, "Failed waiting on process");
                let _ = terminate(&mut child, group, self.grace).await;
                wait_error = Some(e);
                (Status::Failed, EXIT_CODE_NOT_RUN)
            }
        };

        // A finished child gets the rest of its deadline to flush pipes; an
        // interrupted one only the grace period.
        let interrupted = matches!(status, Status::Timeout | Status::Cancelled);
        let drain_until = if interrupted {
            deadline_in(self.grace)
        } else {
            deadline
        };
        let drained = tokio::select! {
            biased;
            joined = tokio::time::timeout_at(drain_until, &mut captures) => match joined {
                Ok(joined) => Drained::Done(joined),
                Err(_) => Drained::Expired,
            },
            _ = cancel.cancelled(), if !interrupted => Drained::Cancelled,
        };

        let (stdout, stderr) = match drained {
            Drained::Done(joined) => collect(joined),
            unfinished => {
                if let Drained::Cancelled = unfinished {
                    info!(task_id = %task.id, "Cancelled while output pipes were open");
                    status = Status::Cancelled;
                    exit_code = EXIT_CODE_NOT_RUN;
                } else {
                    warn!(task_id = %task.id, "Output pipes still open past deadline");
                    if !interrupted {
                        status = Status::Timeout;
                        exit_code = EXIT_CODE_NOT_RUN;
                    }
                }
                if let Some(group) = group {
                    terminate_group(group, self.grace).await;
                }
                match tokio::time::timeout(self.grace, &mut captures).await {
                    Ok(joined) => collect(joined),
                    Err(_) => {
                        warn!(task_id = %task.id, "Abandoning output capture");
                        captures.abort();
                        (CaptureOutput::default(), CaptureOutput::default())
                    }
                }
            }
        };

        if let Some(group) = group {
            terminate_group(group, self.grace).await;
        }
        guard.disarm();

        let mut outcome = Outcome {
            status,
            exit_code,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
        };

        if let Some(e) = wait_error {
            outcome.append_stderr(&format!("failed to wait for process: {}", e));
        }
        if let Some(e) = stdout.write_error.or(stderr.write_error) {
            outcome.append_stderr(&format!("failed to write output file: {}", e));
            if outcome.status == Status::Success {
                outcome.status = Status::Failed;
                outcome.exit_code = EXIT_CODE_NOT_RUN;
            }
        }
        outcome
    }

    async fn create_output_files(&self, id: &TaskId) -> io::Result<(File, File)> {
        let stdout = open_private(&stdout_path(&self.output_dir, id)).await?;
        let stderr = open_private(&stderr_path(&self.output_dir, id)).await?;
        Ok((stdout, stderr))
    }

    fn spawn(&self, task: &Task) -> io::Result<Child> {
        let inv = &task.invocation;
        let env = task.env.as_deref().unwrap_or(self.env.as_slice());

        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args)
            .current_dir(&inv.working_dir)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if inv.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        debug!(task_id = %task.id, command = %inv, "Spawning");
        cmd.spawn()
    }
}

async fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// Write the payload and close stdin without blocking the wait on the child.
fn feed_stdin(child: &mut Child, payload: Vec<u8>) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = stdin.write_all(&payload).await {
            debug!(error = %e, "Stdin write failed");
        }
        // Dropping closes the pipe.
        drop(stdin);
    });
}

fn spawn_captures(
    child: &mut Child,
    stdout_file: File,
    stderr_file: File,
) -> JoinHandle<(CaptureOutput, CaptureOutput)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let out = async {
            match stdout {
                Some(pipe) => capture_stream(pipe, stdout_file, MAX_CAPTURE_BYTES).await,
                None => CaptureOutput::default(),
            }
        };
        let err = async {
            match stderr {
                Some(pipe) => capture_stream(pipe, stderr_file, MAX_CAPTURE_BYTES).await,
                None => CaptureOutput::default(),
            }
        };
        tokio::join!(out, err)
    })
}

fn collect(
    joined: Result<(CaptureOutput, CaptureOutput), tokio::task::JoinError>,
) -> (CaptureOutput, CaptureOutput) {
    joined.unwrap_or_else(|e| {
        warn!(error = %e, "Capture task failed");
        (CaptureOutput::default(), CaptureOutput::default())
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use panel_core::{Invocation, ProgressKind, Usage};
    use std::sync::Mutex;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    fn executor(dir: &Path) -> TaskExecutor {
        TaskExecutor::new(dir)
            .with_env(crate::env::default_env())
            .with_grace(Duration::from_millis(500))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, ProgressKind)>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, event: ProgressEvent<'_>) {
            self.events
                .lock()
                .unwrap()
                .push((event.task_id.to_string(), event.kind));
        }
    }

    struct Exploding;

    impl ProgressObserver for Exploding {
        fn on_progress(&self, _event: ProgressEvent<'_>) {
            panic!("observer exploded");
        }
    }

    #[tokio::test]
    async fn test_success_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let exec = executor(dir.path()).with_observer(recorder.clone());

        let task = Task::new("echo", sh("printf '\\033[32mhello\\033[0m world'; echo oops >&2"));
        let result = exec.run(task, &CancellationToken::new()).await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_text(), "hello world");
        assert_eq!(result.stderr_text(), "oops\n");

        let file = std::fs::read(dir.path().join("echo.md")).unwrap();
        assert_eq!(file, b"\x1b[32mhello\x1b[0m world");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("echo.stderr")).unwrap(),
            "oops\n"
        );

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.path().join("echo.md"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ("echo".to_string(), ProgressKind::Started),
                ("echo".to_string(), ProgressKind::Completed)
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let result = executor(dir.path())
            .run(Task::new("bad", sh("exit 3")), &CancellationToken::new())
            .await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_killed_by_signal_reports_minus_one() {
        let dir = tempfile::tempdir().unwrap();
        let result = executor(dir.path())
            .run(Task::new("sig", sh("kill -9 $$")), &CancellationToken::new())
            .await;
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.exit_code, EXIT_CODE_NOT_RUN);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let exec = executor(dir.path()).with_observer(recorder.clone());

        let task = Task::new("ghost", Invocation::new("panel-no-such-binary-xyz"));
        let result = exec.run(task, &CancellationToken::new()).await;

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.exit_code, EXIT_CODE_NOT_RUN);
        assert_eq!(
            result.stderr_text(),
            "failed to spawn \"panel-no-such-binary-xyz\": executable file not found"
        );
        let diagnosis = result.diagnose().unwrap();
        assert_eq!(diagnosis.category, panel_core::DiagCategory::BinaryMissing);

        // No started event without a process.
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, ProgressKind::Completed);
    }

    #[tokio::test]
    async fn test_output_file_creation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let result = executor(&missing)
            .run(Task::new("t", sh("echo hi")), &CancellationToken::new())
            .await;

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.exit_code, EXIT_CODE_NOT_RUN);
        assert!(result.stderr_text().starts_with("failed to create output file:"));
    }

    #[tokio::test]
    async fn test_timeout_kills_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; sleep 30", pid_file.display());
        let task = Task::new("slow", sh(&script)).with_timeout(Duration::from_millis(300));

        let started = std::time::Instant::now();
        let result = executor(dir.path()).run(task, &CancellationToken::new()).await;

        assert_eq!(result.status, Status::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!ProcessGroup::of(pid).is_alive());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("zero", sh("sleep 5")).with_timeout(Duration::ZERO);

        let started = std::time::Instant::now();
        let result = executor(dir.path()).run(task, &CancellationToken::new()).await;

        assert_eq!(result.status, Status::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_lingering_descendant_times_out() {
        let dir = tempfile::tempdir().unwrap();
        // The shell exits at once but a background child keeps stdout open.
        let task = Task::new("linger", sh("sleep 30 & echo done")).with_timeout(Duration::from_millis(500));

        let started = std::time::Instant::now();
        let result = executor(dir.path()).run(task, &CancellationToken::new()).await;

        assert_eq!(result.status, Status::Timeout);
        assert!(result.stdout_text().contains("done"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_before_start_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor(dir.path())
            .run(Task::new("never", sh("echo hi")), &cancel)
            .await;

        assert_eq!(result.status, Status::Cancelled);
        assert_eq!(result.exit_code, EXIT_CODE_NOT_RUN);
        assert!(!dir.path().join("never.md").exists());
    }

    #[tokio::test]
    async fn test_cancel_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = executor(dir.path())
            .run(Task::new("long", sh("sleep 30")), &cancel)
            .await;

        assert_eq!(result.status, Status::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stdin_payload_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let script = "cat; printf \" $CI $NO_COLOR ${SECRET:-unset}\"";
        let task = Task::new("cat", sh(script).with_stdin("from stdin")).with_env(
            crate::env::filter_env(vec![
                ("PATH".to_string(), std::env::var("PATH").unwrap_or_default()),
                ("SECRET".to_string(), "leak".to_string()),
            ]),
        );

        let result = executor(dir.path()).run(task, &CancellationToken::new()).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.stdout_text(), "from stdin true 1 unset");
    }

    #[tokio::test]
    async fn test_usage_parser_sees_raw_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let parser = |stderr: &[u8]| -> Option<Usage> {
            let text = String::from_utf8_lossy(stderr);
            text.contains("\x1b[1m")
                .then(|| Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                    total_usd: 0.5,
                })
        };
        let task = Task::new("usage", sh("printf '\\033[1mtokens\\033[0m' >&2"))
            .with_usage_parser(Arc::new(parser));

        let result = executor(dir.path()).run(task, &CancellationToken::new()).await;
        assert_eq!(result.stderr_text(), "tokens");
        assert_eq!(result.usage.unwrap().output_tokens, 20);
    }

    #[tokio::test]
    async fn test_huge_timeout_runs_normally() {
        let dir = tempfile::tempdir().unwrap();
        let result = executor(dir.path())
            .with_timeout(Duration::from_secs(i64::MAX as u64))
            .run(Task::new("patient", sh("echo hi")), &CancellationToken::new())
            .await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.stdout_text(), "hi\n");
    }

    #[tokio::test]
    async fn test_cancel_while_descendant_holds_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        // The shell exits at once; the background sleep keeps stdout open.
        let task = Task::new("linger", sh("sleep 8 & echo done")).with_timeout(Duration::from_secs(60));
        let started = std::time::Instant::now();
        let result = executor(dir.path()).run(task, &cancel).await;

        assert_eq!(result.status, Status::Cancelled);
        assert_eq!(result.exit_code, EXIT_CODE_NOT_RUN);
        assert!(result.stdout_text().contains("done"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_aborted_run_kills_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("leader.pid");
        let script = format!("echo $$ > {}; sleep 30 & wait", pid_file.display());
        let exec = Arc::new(executor(dir.path()));

        let handle = tokio::spawn({
            let exec = exec.clone();
            async move { exec.run(Task::new("orphan", sh(&script)), &CancellationToken::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let group = ProcessGroup::of(pid);
        let give_up = std::time::Instant::now() + Duration::from_secs(2);
        while group.is_alive() && std::time::Instant::now() < give_up {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!group.is_alive());
    }

    #[tokio::test]
    async fn test_panicking_observer_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let result = executor(dir.path())
            .with_observer(Arc::new(Exploding))
            .run(Task::new("calm", sh("echo fine")), &CancellationToken::new())
            .await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.stdout_text(), "fine\n");
    }
}

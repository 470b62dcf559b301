//! Process-group termination.
//!
//! Every child is started as the leader of its own process group, so the
//! whole tree it spawns can be signalled at once. Termination is graceful
//! first, forced after a grace period.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stand-in for deadlines too far away to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant `duration` from now, saturating for huge durations.
pub(crate) fn deadline_in(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Which signal to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ask the group to exit (SIGTERM).
    Graceful,
    /// Kill the group outright (SIGKILL).
    Forced,
}

/// Handle to the process group led by a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pgid: u32,
}

impl ProcessGroup {
    /// Group led by `pid`. Only meaningful for children started with
    /// `process_group(0)`.
    pub fn of(pid: u32) -> Self {
        Self { pgid: pid }
    }

    pub fn id(&self) -> u32 {
        self.pgid
    }

    #[cfg(unix)]
    fn pid(&self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.pgid as i32)
    }

    /// Deliver `signal` to every member of the group.
    #[cfg(unix)]
    pub fn signal(&self, signal: Signal) -> io::Result<()> {
        use nix::sys::signal::{killpg, Signal as NixSignal};

        let sig = match signal {
            Signal::Graceful => NixSignal::SIGTERM,
            Signal::Forced => NixSignal::SIGKILL,
        };
        match killpg(self.pid(), sig) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true while any member of the group is still running.
    ///
    /// Zombies are not counted: orphaned members may never be reaped when
    /// nothing acts as init.
    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        if nix::sys::signal::killpg(self.pid(), None).is_err() {
            return false;
        }
        #[cfg(target_os = "linux")]
        {
            has_running_member(self.pgid)
        }
        #[cfg(not(target_os = "linux"))]
        {
            true
        }
    }

    #[cfg(not(unix))]
    pub fn signal(&self, _signal: Signal) -> io::Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn is_alive(&self) -> bool {
        false
    }
}

/// Force-kills a process group when dropped, unless disarmed first.
///
/// Held while a child runs so that a worker unwinding or being aborted
/// does not leave the rest of the group behind.
#[derive(Debug)]
pub(crate) struct GroupGuard {
    group: Option<ProcessGroup>,
}

impl GroupGuard {
    pub(crate) fn new(group: Option<ProcessGroup>) -> Self {
        Self { group }
    }

    /// The group has been swept; dropping is now a no-op.
    pub(crate) fn disarm(&mut self) {
        self.group = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(group) = self.group.take() {
            warn!(pgid = group.id(), "Task abandoned while running, killing process group");
            let _ = group.signal(Signal::Forced);
        }
    }
}

/// Scan `/proc` for a non-zombie process in group `pgid`.
#[cfg(target_os = "linux")]
fn has_running_member(pgid: u32) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return true;
    };
    entries.flatten().any(|entry| {
        let is_pid = entry.file_name().to_str().is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            return false;
        }
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            return false;
        };
        // "<pid> (<comm>) <state> <ppid> <pgrp> ..."; comm may contain spaces.
        let Some((_, rest)) = stat.rsplit_once(')') else {
            return false;
        };
        let mut fields = rest.split_whitespace();
        let state = fields.next();
        let pgrp = fields.nth(1).and_then(|f| f.parse::<u32>().ok());
        pgrp == Some(pgid) && !matches!(state, Some("Z") | Some("X"))
    })
}

/// Stop `child` and its group, escalating to a forced kill after `grace`.
///
/// Returns the child's exit status once it has been reaped.
pub async fn terminate(
    child: &mut Child,
    group: Option<ProcessGroup>,
    grace: Duration,
) -> io::Result<ExitStatus> {
    match group {
        Some(group) => {
            if let Err(e) = group.signal(Signal::Graceful) {
                warn!(pgid = group.id(), error = %e, "Failed to signal process group");
            }
        }
        None => {
            // No group to signal (non-unix); fall back to the child alone.
            let _ = child.start_kill();
        }
    }

    let give_up = deadline_in(grace);
    while Instant::now() < give_up {
        let exited = child.try_wait()?.is_some();
        let group_gone = group.map_or(true, |g| !g.is_alive());
        if exited && group_gone {
            debug!("Process group exited after graceful signal");
            return child.wait().await;
        }
        sleep(POLL_INTERVAL).await;
    }

    warn!(
        pgid = group.map(|g| g.id()),
        grace_ms = grace.as_millis() as u64,
        "Grace period elapsed, killing process group"
    );
    if let Some(group) = group {
        if let Err(e) = group.signal(Signal::Forced) {
            warn!(pgid = group.id(), error = %e, "Failed to kill process group");
        }
    }
    let _ = child.start_kill();
    child.wait().await
}

/// Stop whatever is left of a group whose leader has already been reaped.
pub async fn terminate_group(group: ProcessGroup, grace: Duration) {
    if !group.is_alive() {
        return;
    }
    debug!(pgid = group.id(), "Terminating leftover group members");
    if let Err(e) = group.signal(Signal::Graceful) {
        warn!(pgid = group.id(), error = %e, "Failed to signal process group");
    }

    let give_up = deadline_in(grace);
    while Instant::now() < give_up {
        if !group.is_alive() {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }

    warn!(pgid = group.id(), "Leftover group members ignored SIGTERM, killing");
    if let Err(e) = group.signal(Signal::Forced) {
        warn!(pgid = group.id(), error = %e, "Failed to kill process group");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_group(script: &str) -> (Child, ProcessGroup) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);
        let child = cmd.spawn().unwrap();
        let group = ProcessGroup::of(child.id().unwrap());
        (child, group)
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let (mut child, group) = spawn_group("exec sleep 30");
        assert!(group.is_alive());

        let status = terminate(&mut child, Some(group), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!status.success());
        assert!(!group.is_alive());
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_term_ignored() {
        let (mut child, group) = spawn_group("trap '' TERM; while true; do sleep 1; done");
        // Let the shell install its trap.
        sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        terminate(&mut child, Some(group), Duration::from_millis(300))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        sleep(Duration::from_millis(100)).await;
        assert!(!group.is_alive());
    }

    #[tokio::test]
    async fn test_terminate_group_reaps_background_members() {
        let (mut child, group) = spawn_group("sleep 30 & exit 0");
        let status = child.wait().await.unwrap();
        assert!(status.success());
        assert!(group.is_alive());

        terminate_group(group, Duration::from_secs(5)).await;
        sleep(Duration::from_millis(100)).await;
        assert!(!group.is_alive());
    }

    #[tokio::test]
    async fn test_guard_kills_group_on_drop() {
        let (_child, group) = spawn_group("sleep 30 & wait");
        sleep(Duration::from_millis(100)).await;
        assert!(group.is_alive());

        drop(GroupGuard::new(Some(group)));
        sleep(Duration::from_millis(200)).await;
        assert!(!group.is_alive());
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_group() {
        let (mut child, group) = spawn_group("exec sleep 30");
        let mut guard = GroupGuard::new(Some(group));
        guard.disarm();
        drop(guard);
        sleep(Duration::from_millis(100)).await;
        assert!(group.is_alive());

        terminate(&mut child, Some(group), Duration::from_secs(5)).await.unwrap();
    }

    #[test]
    fn test_deadline_saturates() {
        let far = deadline_in(Duration::from_secs(i64::MAX as u64));
        assert!(far > Instant::now() + Duration::from_secs(86400 * 365));
        assert!(deadline_in(Duration::ZERO) <= Instant::now());
    }
}

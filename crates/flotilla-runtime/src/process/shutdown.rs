//! Graceful shutdown for `tokio::process::Child` with SIGTERM → SIGKILL escalation.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
#[cfg(unix)]
use tokio::time::timeout;
use tracing::warn;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How a child ended after a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub status: ExitStatus,
    /// True when the grace period elapsed and the process was killed.
    pub forced: bool,
}

/// Gracefully shut down a child process, escalating to a forced kill.
///
/// # Strategy
/// 1. Send SIGTERM to the child's process group and wait up to `grace`
/// 2. If still running, send SIGKILL to the group
/// 3. Wait for reaping (required to avoid zombies)
///
/// Children are spawned as process-group leaders, so signalling the group
/// also reaches helpers the service started itself (shell wrappers, npm).
///
/// # Platform behavior
/// - Unix: SIGTERM then SIGKILL via `nix`
/// - Windows: Immediately calls `.kill()` (no graceful shutdown available)
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ShutdownOutcome> {
    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        shutdown_windows(child, grace).await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ShutdownOutcome> {
    // No PID means the child was already reaped
    let Some(pid) = child.id() else {
        let status = child.wait().await?;
        return Ok(ShutdownOutcome {
            status,
            forced: false,
        });
    };
    let group = Pid::from_raw(i32::try_from(pid).map_err(io::Error::other)?);

    // Phase 1: SIGTERM with grace period
    match signal::killpg(group, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(io::Error::other(e)),
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result.map(|status| ShutdownOutcome {
            status,
            forced: false,
        });
    }

    // Phase 2: SIGKILL the whole group
    warn!(pid = %pid, grace_ms = grace.as_millis(), "Process ignored SIGTERM, sending SIGKILL");
    match signal::killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(io::Error::other(e)),
    }

    // Phase 3: Wait for reaping (should be fast after SIGKILL)
    let status = child.wait().await?;
    Ok(ShutdownOutcome {
        status,
        forced: true,
    })
}

#[cfg(not(unix))]
async fn shutdown_windows(child: &mut Child, _grace: Duration) -> io::Result<ShutdownOutcome> {
    // Windows has no SIGTERM equivalent - terminate immediately
    child.kill().await?;
    let status = child.wait().await?;
    Ok(ShutdownOutcome {
        status,
        forced: true,
    })
}

/// Describe how a process ended, for status messages.
pub fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return format!("terminated by signal {sig}");
        }
    }
    "exited with unknown status".to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .process_group(0)
            .spawn()
            .expect("failed to spawn sh")
    }

    #[tokio::test]
    async fn shutdown_responds_to_sigterm() {
        let mut child = spawn_sh("exec sleep 30");

        let outcome = shutdown_child(&mut child, Duration::from_secs(5)).await.unwrap();
        assert!(!outcome.forced);
    }

    #[tokio::test]
    async fn shutdown_escalates_when_sigterm_ignored() {
        let mut child = spawn_sh("trap '' TERM; while true; do sleep 0.05; done");
        // Let the trap install before signalling
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = shutdown_child(&mut child, Duration::from_millis(200)).await.unwrap();
        assert!(outcome.forced);
        assert_eq!(describe_exit(outcome.status), "terminated by signal 9");
    }

    #[tokio::test]
    async fn shutdown_handles_already_exited() {
        let mut child = spawn_sh("exit 0");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = shutdown_child(&mut child, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome.status.code(), Some(0));
    }

    #[tokio::test]
    async fn describe_exit_reports_code() {
        let status = spawn_sh("exit 3").wait().await.unwrap();
        assert_eq!(describe_exit(status), "exited with code 3");
    }
}

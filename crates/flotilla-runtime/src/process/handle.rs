//! Ownership of one running service process.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use flotilla_core::{LogStream, ServiceDefinition};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use super::shutdown::{ShutdownOutcome, shutdown_child};
use super::stream::{OutputLine, spawn_stream_reader};

/// Wraps the OS process for exactly one service instance.
///
/// The handle is created by `spawn` and consumed by the instance task; when
/// it is dropped the child is killed (`kill_on_drop`), so a handle can never
/// leak a process.
#[derive(Debug)]
pub struct ProcessHandle {
    service: String,
    generation: u64,
    pid: Option<u32>,
    child: Child,
}

impl ProcessHandle {
    /// Spawn the process described by `def`.
    ///
    /// stdout and stderr are piped; call `attach_output` to start reading
    /// them. Fails if `def` has no command or the OS refuses to create the
    /// process.
    pub fn spawn(def: &ServiceDefinition, generation: u64) -> io::Result<Self> {
        let program = def.command.as_deref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "service has no command")
        })?;

        let mut cmd = Command::new(program);
        cmd.args(&def.args)
            .envs(&def.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &def.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group so shutdown can signal the whole tree
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(service = %def.name, pid = ?pid, generation, "Spawned process");

        Ok(Self {
            service: def.name.clone(),
            generation,
            pid,
            child,
        })
    }

    /// Start reader tasks that forward stdout and stderr lines into `tx`.
    pub fn attach_output(&mut self, tx: &mpsc::Sender<OutputLine>) {
        if let Some(stdout) = self.child.stdout.take() {
            spawn_stream_reader(stdout, self.service.clone(), LogStream::Stdout, tx.clone());
        }
        if let Some(stderr) = self.child.stderr.take() {
            spawn_stream_reader(stderr, self.service.clone(), LogStream::Stderr, tx.clone());
        }
    }

    /// Service this process belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Start counter distinguishing this instance from earlier ones.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// OS process ID captured at spawn time.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit. Cancel safe.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Request graceful termination, forcing it after `grace`.
    pub async fn shutdown(&mut self, grace: Duration) -> io::Result<ShutdownOutcome> {
        debug!(service = %self.service, pid = ?self.pid, "Stopping process");
        shutdown_child(&mut self.child, grace).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_applies_env_and_working_dir() {
        let def = ServiceDefinition::managed("env", "sh")
            .with_args(["-c", "echo \"$SHARED_PATH\"; pwd"])
            .with_env("SHARED_PATH", "/opt/shared")
            .with_working_dir("/");

        let mut handle = ProcessHandle::spawn(&def, 1).unwrap();
        assert!(handle.pid().is_some());
        assert_eq!(handle.generation(), 1);

        let (tx, mut rx) = mpsc::channel(8);
        handle.attach_output(&tx);
        drop(tx);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.text);
        }
        assert_eq!(lines, vec!["/opt/shared", "/"]);
        assert!(handle.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let def = ServiceDefinition::managed("ghost", "/nonexistent/definitely-not-here");
        let err = ProcessHandle::spawn(&def, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

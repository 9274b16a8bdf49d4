//! The instance task: one tokio task per running service process.
//!
//! The task exclusively owns the `ProcessHandle`. It merges the service's
//! stdout and stderr, watches for readiness markers and port conflicts, runs
//! the startup timer, and reacts to exit or a stop request. Every status
//! transition for a managed service after spawn happens here.

use std::sync::Arc;
use std::time::Duration;

use flotilla_core::{LogLevel, ReadinessPolicy, ServiceDefinition, SupervisorError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Shared;
use crate::logs::{discover_port, is_port_conflict};
use crate::process::{OutputLine, ProcessHandle, describe_exit};
use crate::status::StatusPatch;

/// Buffered output lines per service before readers apply backpressure.
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on draining buffered output after the process exits.
///
/// A grandchild that inherited the pipes can keep them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How a start attempt resolved.
#[derive(Debug)]
pub(super) enum StartupOutcome {
    /// Running, via marker or promotion.
    Ready,
    /// A stop request arrived before readiness.
    Stopped,
    /// Startup failed; the status is already `Error`.
    Failed(SupervisorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Running,
}

/// Context for one instance task.
pub(super) struct Instance {
    pub shared: Arc<Shared>,
    pub def: ServiceDefinition,
    pub handle: ProcessHandle,
    pub stop: CancellationToken,
    pub startup_timeout: Duration,
    pub ready_tx: Option<oneshot::Sender<StartupOutcome>>,
}

impl Instance {
    /// Drive the process until it exits or is stopped.
    pub async fn run(mut self) {
        let (line_tx, mut line_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        self.handle.attach_output(&line_tx);
        drop(line_tx);

        let deadline = Instant::now() + self.startup_timeout;
        let mut phase = Phase::Starting;
        let mut discovered_port = None;

        loop {
            tokio::select! {
                biased;

                () = self.stop.cancelled() => {
                    self.stop_requested(&mut line_rx).await;
                    break;
                }

                Some(line) = line_rx.recv() => {
                    match self.on_line(&line, phase, &mut discovered_port).await {
                        LineAction::Continue => {}
                        LineAction::Ready => {
                            self.mark_running(discovered_port, "readiness marker observed");
                            phase = Phase::Running;
                        }
                        LineAction::Terminated => break,
                    }
                }

                result = self.handle.wait() => {
                    let drained = self.drain(&mut line_rx, phase).await;
                    if phase == Phase::Starting && drained.ready {
                        self.mark_running(discovered_port.or(drained.port), "readiness marker observed");
                        phase = Phase::Running;
                    }
                    self.exited(result, phase, drained.conflict);
                    break;
                }

                () = sleep_until(deadline), if phase == Phase::Starting => {
                    if self.startup_timed_out(discovered_port).await {
                        phase = Phase::Running;
                    } else {
                        break;
                    }
                }
            }
        }

        self.shared.release(&self.def.name, self.handle.generation()).await;
    }

    async fn on_line(
        &mut self,
        line: &OutputLine,
        phase: Phase,
        discovered_port: &mut Option<u16>,
    ) -> LineAction {
        let name = self.def.name.clone();
        self.shared
            .pipeline
            .ingest(&name, line.stream, &line.text, &self.def.readiness_markers);

        if self.def.port.is_none()
            && discovered_port.is_none()
            && let Some(port) = discover_port(&line.text)
        {
            *discovered_port = Some(port);
            if phase == Phase::Running {
                info!(service = %name, port, "Discovered listening port");
                self.shared.tracker.set_state(&name, StatusPatch::Port(port));
            }
        }

        if phase != Phase::Starting {
            return LineAction::Continue;
        }

        if is_port_conflict(&line.text) {
            let message = self
                .def
                .port
                .map_or_else(|| line.text.clone(), |port| format!("port {port} is already in use"));
            self.terminate().await;
            self.fail(SupervisorError::PortConflict {
                service: name,
                message,
            });
            return LineAction::Terminated;
        }

        if self.def.is_ready_line(&line.text) {
            LineAction::Ready
        } else {
            LineAction::Continue
        }
    }

    fn mark_running(&mut self, discovered_port: Option<u16>, reason: &str) {
        let name = &self.def.name;
        let port = self.def.port.or(discovered_port);
        let pid = self.handle.pid();
        self.shared
            .tracker
            .set_state(name, StatusPatch::Running { pid, port });
        info!(service = %name, pid = ?pid, port = ?port, "Service running ({reason})");
        self.resolve(StartupOutcome::Ready);
    }

    /// Apply the readiness policy. Returns true if the service was promoted.
    async fn startup_timed_out(&mut self, discovered_port: Option<u16>) -> bool {
        let name = self.def.name.clone();
        let timeout_ms = u64::try_from(self.startup_timeout.as_millis()).unwrap_or(u64::MAX);

        match self.def.readiness {
            ReadinessPolicy::Promote => {
                warn!(service = %name, timeout_ms, "No readiness marker before timeout, promoting to running");
                self.shared.pipeline.note(
                    &name,
                    LogLevel::Warning,
                    format!(
                        "No readiness signal within {timeout_ms}ms; assuming the service is running"
                    ),
                );
                self.mark_running(discovered_port, "startup timeout promotion");
                true
            }
            ReadinessPolicy::Fail => {
                self.terminate().await;
                self.fail(SupervisorError::StartupTimeout {
                    service: name,
                    timeout_ms,
                });
                false
            }
        }
    }

    async fn stop_requested(&mut self, line_rx: &mut mpsc::Receiver<OutputLine>) {
        let name = self.def.name.clone();
        match self.handle.shutdown(self.shared.settings.effective_grace_period()).await {
            Ok(outcome) => {
                let how = if outcome.forced { "killed after grace period" } else { "stopped" };
                info!(service = %name, exit = %describe_exit(outcome.status), "Service {how}");
                let _ = self.drain(line_rx, Phase::Running).await;
                self.shared.pipeline.note(
                    &name,
                    LogLevel::Info,
                    format!("Service {how} ({})", describe_exit(outcome.status)),
                );
            }
            Err(e) => {
                // The handle's kill_on_drop still reaps the child
                error!(service = %name, error = %e, "Failed to shut down process cleanly");
            }
        }
        self.shared.tracker.set_state(&name, StatusPatch::Stopped);
        self.resolve(StartupOutcome::Stopped);
    }

    fn exited(
        &mut self,
        result: std::io::Result<std::process::ExitStatus>,
        phase: Phase,
        conflict: Option<String>,
    ) {
        let name = self.def.name.clone();
        let (clean, reason) = match result {
            Ok(status) => (status.success(), describe_exit(status)),
            Err(e) => (false, format!("wait failed: {e}")),
        };

        match phase {
            Phase::Starting if conflict.is_some() => {
                let message = self.def.port.map_or_else(
                    || conflict.unwrap_or_default(),
                    |port| format!("port {port} is already in use"),
                );
                self.fail(SupervisorError::PortConflict {
                    service: name,
                    message,
                });
            }
            Phase::Starting => {
                self.fail(SupervisorError::ExitedDuringStartup {
                    service: name,
                    reason,
                });
            }
            Phase::Running if clean => {
                info!(service = %name, "Service exited cleanly");
                self.shared
                    .pipeline
                    .note(&name, LogLevel::Info, format!("Service {reason}"));
                self.shared.tracker.set_state(&name, StatusPatch::Stopped);
            }
            Phase::Running => {
                error!(service = %name, %reason, "Service crashed");
                let message = format!("Process {reason}");
                self.shared
                    .pipeline
                    .note(&name, LogLevel::Error, message.clone());
                self.shared.tracker.set_state(&name, StatusPatch::Error(message));
            }
        }
    }

    /// Record a startup failure and resolve the pending start.
    fn fail(&mut self, err: SupervisorError) {
        let name = &self.def.name;
        let message = err.to_string();
        error!(service = %name, error = %message, "Service failed to start");
        self.shared.pipeline.note(name, LogLevel::Error, message.clone());
        self.shared.tracker.set_state(name, StatusPatch::Error(message));
        self.resolve(StartupOutcome::Failed(err));
    }

    async fn terminate(&mut self) {
        let grace = self.shared.settings.effective_grace_period();
        if let Err(e) = self.handle.shutdown(grace).await {
            warn!(service = %self.def.name, error = %e, "Failed to terminate process");
        }
    }

    /// Flush output that was produced before exit.
    ///
    /// While still `Starting`, the buffered lines are scanned in order for a
    /// readiness marker, a port announcement and a port conflict, so a
    /// service that announced readiness and then exited is classified the
    /// same however the exit raced its output. Whichever of marker and
    /// conflict comes first wins.
    async fn drain(&self, line_rx: &mut mpsc::Receiver<OutputLine>, phase: Phase) -> Drained {
        let name = self.def.name.clone();
        let def = &self.def;
        let pipeline = &self.shared.pipeline;
        let mut drained = Drained::default();
        let _ = timeout(DRAIN_TIMEOUT, async {
            while let Some(line) = line_rx.recv().await {
                pipeline.ingest(&name, line.stream, &line.text, &def.readiness_markers);
                if phase != Phase::Starting || drained.ready || drained.conflict.is_some() {
                    continue;
                }
                if def.port.is_none() && drained.port.is_none() {
                    drained.port = discover_port(&line.text);
                }
                if is_port_conflict(&line.text) {
                    drained.conflict = Some(line.text);
                } else if def.is_ready_line(&line.text) {
                    drained.ready = true;
                }
            }
        })
        .await;
        drained
    }

    fn resolve(&mut self, outcome: StartupOutcome) {
        if let Some(tx) = self.ready_tx.take() {
            // The caller may have stopped waiting
            let _ = tx.send(outcome);
        }
    }
}

/// What the post-exit drain saw while the service was still starting.
#[derive(Debug, Default)]
struct Drained {
    ready: bool,
    port: Option<u16>,
    conflict: Option<String>,
}

enum LineAction {
    Continue,
    Ready,
    Terminated,
}

//! Up command handler: the long-running host.
//!
//! Starts every service, then streams supervisor events to stdout until
//! Ctrl-C. With `--stdio` events are JSON lines and stdin accepts one JSON
//! command per line, e.g. `{"id": 7, "command": "restart", "service": "api"}`;
//! each gets a `{"type": "response", "id": 7, "response": {...}}` line back.
//! Closing stdin ends the session like Ctrl-C.

use std::io::BufRead;
use std::time::Duration;

use anyhow::Result;
use flotilla_core::{LogLevel, SupervisorEvent};
use flotilla_runtime::{CommandResponse, ProcessSupervisor, SupervisorCommand};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bootstrap::CliContext;

/// Run the host until interrupted, then stop every service.
pub async fn execute(ctx: &CliContext, stdio: bool, health_interval: Option<u64>) -> Result<()> {
    let supervisor = ctx.supervisor().clone();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));

    let events_done = CancellationToken::new();
    let forwarder = tokio::spawn(forward_events(
        supervisor.subscribe(),
        out_tx.clone(),
        stdio,
        events_done.clone(),
    ));

    let monitor_cancel = CancellationToken::new();
    if let Some(secs) = health_interval.filter(|&secs| secs > 0) {
        let monitor = supervisor.health_monitor(Duration::from_secs(secs), monitor_cancel.clone());
        tokio::spawn(async move {
            let mut reports = Box::pin(monitor.monitor());
            while reports.next().await.is_some() {}
        });
    }

    let started = supervisor.start_all().await;
    match &started {
        Ok(statuses) => {
            info!(services = statuses.len(), "All services started");
            wait_for_exit(&supervisor, stdio, &out_tx).await;
        }
        Err(err) => error!(error = %err, "Start sequence aborted"),
    }

    monitor_cancel.cancel();
    supervisor.shutdown().await;

    events_done.cancel();
    drop(out_tx);
    if let Err(e) = forwarder.await {
        debug!(error = %e, "Event forwarder ended abnormally");
    }
    if let Err(e) = writer.await {
        debug!(error = %e, "Output writer ended abnormally");
    }

    started?;
    Ok(())
}

async fn wait_for_exit(
    supervisor: &ProcessSupervisor,
    stdio: bool,
    out: &mpsc::UnboundedSender<String>,
) {
    if stdio {
        tokio::select! {
            result = tokio::signal::ctrl_c() => log_interrupt(result),
            () = serve_stdin(supervisor, out) => info!("stdin closed, shutting down"),
        }
    } else {
        log_interrupt(tokio::signal::ctrl_c().await);
    }
}

fn log_interrupt(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Interrupted, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
}

/// Read stdin on a detached thread.
///
/// tokio's stdin parks a read in the blocking pool, which would hold up
/// runtime shutdown after Ctrl-C.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Read commands from stdin until EOF, dispatching each concurrently.
async fn serve_stdin(supervisor: &ProcessSupervisor, out: &mpsc::UnboundedSender<String>) {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }

        let (id, command) = parse_request(&line);
        let out = out.clone();
        match command {
            Ok(command) => {
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    let response = supervisor.dispatch(command).await;
                    let _ = out.send(response_line(&id, &response));
                });
            }
            Err(message) => {
                let _ = out.send(response_line(&id, &CommandResponse::invalid(message)));
            }
        }
    }
}

/// Split a request line into its correlation id and command.
fn parse_request(line: &str) -> (Value, Result<SupervisorCommand, String>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (Value::Null, Err(format!("Invalid JSON: {e}"))),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let command = serde_json::from_value(value).map_err(|e| format!("Invalid command: {e}"));
    (id, command)
}

fn response_line(id: &Value, response: &CommandResponse) -> String {
    json!({ "type": "response", "id": id, "response": response }).to_string()
}

/// Forward supervisor events to the output writer until `done`.
async fn forward_events(
    mut rx: broadcast::Receiver<SupervisorEvent>,
    out: mpsc::UnboundedSender<String>,
    as_json: bool,
    done: CancellationToken,
) {
    let render = |event: &SupervisorEvent| {
        if as_json {
            serde_json::to_string(event).ok()
        } else {
            Some(format_event(event))
        }
    };

    loop {
        tokio::select! {
            biased;

            event = rx.recv() => match event {
                Ok(event) => {
                    if let Some(line) = render(&event) {
                        let _ = out.send(line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, some events were dropped");
                }
                Err(RecvError::Closed) => break,
            },

            () = done.cancelled() => {
                while let Ok(event) = rx.try_recv() {
                    if let Some(line) = render(&event) {
                        let _ = out.send(line);
                    }
                }
                break;
            }
        }
    }
}

/// Human-readable rendering for terminal output.
fn format_event(event: &SupervisorEvent) -> String {
    match event {
        SupervisorEvent::Log(entry) => {
            let tag = match entry.level {
                LogLevel::Info => "",
                LogLevel::Success => "ok: ",
                LogLevel::Warning => "warning: ",
                LogLevel::Error => "error: ",
            };
            format!(
                "{} [{}] {tag}{}",
                entry.timestamp.format("%H:%M:%S"),
                entry.service,
                entry.message
            )
        }
        SupervisorEvent::Status { service, status } => {
            let mut line = format!("[{service}] -> {}", status.state);
            if let Some(pid) = status.pid {
                line.push_str(&format!(" pid={pid}"));
            }
            if let Some(port) = status.port {
                line.push_str(&format!(" port={port}"));
            }
            if let Some(err) = &status.last_error {
                line.push_str(&format!(" ({err})"));
            }
            line
        }
        SupervisorEvent::Health { report } => {
            let parts: Vec<String> = report
                .iter()
                .map(|(name, healthy)| {
                    format!("{name}={}", if *healthy { "healthy" } else { "unhealthy" })
                })
                .collect();
            format!("health: {}", parts.join(" "))
        }
    }
}

/// Single writer for stdout so lines never interleave.
async fn write_lines(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            debug!(error = %e, "stdout closed, dropping output");
            break;
        }
    }
}

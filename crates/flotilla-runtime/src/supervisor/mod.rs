//! Process supervisor for the host's auxiliary services.
//!
//! One `ProcessSupervisor` is constructed per host process. It owns the
//! service registry, the status table, the handle table and the event
//! fan-out; nothing else mutates them.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──▶ Starting ──marker / timeout──▶ Running ──exit 0 / stop──▶ Stopped
//!                       │                              │
//!                       └──spawn fail / exit──▶ Error ◀┘ exit ≠ 0
//! Error ──start / restart──▶ Starting
//! ```

mod instance;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use flotilla_core::{
    EventSink, HealthReport, LogLevel, ServiceDefinition, ServiceRegistry, ServiceState,
    ServiceStatus, SupervisorError, SupervisorEvent, SupervisorSettings,
};
use futures_util::future::join_all;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcaster::EventBroadcaster;
use crate::health::{HealthChecker, HealthMonitor, HealthProbe, HttpProbe};
use crate::logs::LogPipeline;
use crate::process::ProcessHandle;
use crate::status::{StatusPatch, StatusTracker};
use instance::{Instance, StartupOutcome};

/// Bookkeeping for the live instance task of one service.
struct RunningInstance {
    generation: u64,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared between the supervisor and its instance tasks.
struct Shared {
    registry: ServiceRegistry,
    settings: SupervisorSettings,
    tracker: Arc<StatusTracker>,
    pipeline: LogPipeline,
    instances: Mutex<HashMap<String, RunningInstance>>,
    next_generation: AtomicU64,
}

impl Shared {
    /// Drop the handle-table entry for a finished instance.
    ///
    /// Only removes the entry if it still belongs to `generation`; a newer
    /// instance started in the meantime keeps its slot.
    async fn release(&self, name: &str, generation: u64) {
        let mut instances = self.instances.lock().await;
        if instances
            .get(name)
            .is_some_and(|running| running.generation == generation)
        {
            instances.remove(name);
            debug!(service = %name, generation, "Released instance");
        }
    }
}

/// Starts, stops and monitors the services of a `ServiceRegistry`.
///
/// Cheap to clone; clones share the same services. Call `shutdown` before
/// the host exits so children get a graceful termination request.
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    events: Arc<EventBroadcaster>,
    health: Arc<HealthChecker>,
}

impl ProcessSupervisor {
    /// Create a supervisor that probes health over HTTP.
    pub fn new(registry: ServiceRegistry, settings: SupervisorSettings) -> Self {
        let probe = Arc::new(HttpProbe::new(settings.effective_health_timeout()));
        Self::with_probe(registry, settings, probe)
    }

    /// Create a supervisor with a custom health probe.
    pub fn with_probe(
        registry: ServiceRegistry,
        settings: SupervisorSettings,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let events = Arc::new(EventBroadcaster::new());
        let sink: Arc<dyn EventSink> = events.clone();

        let tracker = Arc::new(StatusTracker::new(registry.names(), Arc::clone(&sink)));
        let pipeline = LogPipeline::new(sink, settings.success_markers.clone());
        let health = Arc::new(HealthChecker::new(&registry, probe));

        info!(services = registry.len(), "Process supervisor initialized");

        Self {
            shared: Arc::new(Shared {
                registry,
                settings,
                tracker,
                pipeline,
                instances: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
            events,
            health,
        }
    }

    /// Start one service and wait until it is Running or has failed.
    ///
    /// A service that is already Starting or Running is left alone and its
    /// current status returned.
    pub async fn start(&self, name: &str) -> Result<ServiceStatus, SupervisorError> {
        let def = self.definition(name)?.clone();
        let shared = &self.shared;

        let ready_rx = {
            let mut instances = shared.instances.lock().await;

            if let Some(current) = shared.tracker.get(name)
                && current.state.is_active()
            {
                debug!(service = %name, state = %current.state, "Start ignored, already active");
                return Ok(current);
            }

            shared
                .tracker
                .set_state(name, StatusPatch::Starting { started_at: Utc::now() });

            if !def.is_managed() {
                return Ok(self.attach_external(&def));
            }

            let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let handle = match ProcessHandle::spawn(&def, generation) {
                Ok(handle) => handle,
                Err(e) => {
                    let err = SupervisorError::SpawnFailed {
                        service: name.to_string(),
                        reason: e.to_string(),
                    };
                    error!(service = %name, error = %e, "Failed to spawn service");
                    shared.pipeline.note(name, LogLevel::Error, err.to_string());
                    shared.tracker.set_state(name, StatusPatch::Error(err.to_string()));
                    return Err(err);
                }
            };

            info!(service = %name, pid = ?handle.pid(), "Service starting");
            if let Some(pid) = handle.pid() {
                shared
                    .pipeline
                    .note(name, LogLevel::Info, format!("Spawned process {pid}"));
            }

            let (ready_tx, ready_rx) = oneshot::channel();
            let stop = CancellationToken::new();
            let startup_timeout = def
                .startup_timeout()
                .unwrap_or_else(|| shared.settings.effective_startup_timeout());

            let task = tokio::spawn(
                Instance {
                    shared: Arc::clone(shared),
                    def,
                    handle,
                    stop: stop.clone(),
                    startup_timeout,
                    ready_tx: Some(ready_tx),
                }
                .run(),
            );

            instances.insert(
                name.to_string(),
                RunningInstance {
                    generation,
                    stop,
                    task,
                },
            );
            ready_rx
        };

        match ready_rx.await {
            Ok(StartupOutcome::Ready | StartupOutcome::Stopped) => self.status(name),
            Ok(StartupOutcome::Failed(err)) => Err(err),
            Err(_) => Err(SupervisorError::Internal(format!(
                "instance task for {name} ended without a startup outcome"
            ))),
        }
    }

    fn attach_external(&self, def: &ServiceDefinition) -> ServiceStatus {
        let shared = &self.shared;
        let port = def.port;
        info!(service = %def.name, port = ?port, "Attached to external service");
        if let Some(port) = port {
            shared.pipeline.note(
                &def.name,
                LogLevel::Info,
                format!("Using already-running server on port {port}"),
            );
        }
        shared
            .tracker
            .set_state(&def.name, StatusPatch::Running { pid: None, port })
            .unwrap_or_else(|| ServiceStatus::stopped(def.name.clone()))
    }

    /// Stop one service and wait for its process to exit.
    ///
    /// Sends a graceful termination request and forces it after the grace
    /// period. Stopping a service with no live process is a no-op.
    pub async fn stop(&self, name: &str) -> Result<ServiceStatus, SupervisorError> {
        let def = self.definition(name)?;
        let shared = &self.shared;

        let running = shared.instances.lock().await.remove(name);
        if let Some(running) = running {
            info!(service = %name, "Stopping service");
            running.stop.cancel();
            if let Err(e) = running.task.await {
                error!(service = %name, error = %e, "Instance task failed");
                shared
                    .tracker
                    .set_state(name, StatusPatch::Error(format!("instance task failed: {e}")));
            }
        } else if !def.is_managed()
            && shared
                .tracker
                .state(name)
                .is_some_and(ServiceState::is_active)
        {
            shared
                .pipeline
                .note(name, LogLevel::Info, "Detached from external service");
            shared.tracker.set_state(name, StatusPatch::Stopped);
        } else {
            debug!(service = %name, "Stop ignored, no live process");
        }

        self.status(name)
    }

    /// Stop a service, wait for it to exit, settle, then start it again.
    ///
    /// Waiting for the exit notification keeps the new process from racing
    /// the old one for the same port.
    pub async fn restart(&self, name: &str) -> Result<ServiceStatus, SupervisorError> {
        self.definition(name)?;
        let was_active = self
            .shared
            .tracker
            .state(name)
            .is_some_and(ServiceState::is_active);

        info!(service = %name, "Restarting service");
        self.stop(name).await?;
        if was_active {
            tokio::time::sleep(self.shared.settings.effective_restart_settle()).await;
        }
        self.start(name).await
    }

    /// Start every service sequentially in declared order.
    ///
    /// A non-critical failure is logged and skipped; a critical one aborts
    /// the sequence and is returned.
    pub async fn start_all(&self) -> Result<Vec<ServiceStatus>, SupervisorError> {
        for def in self.shared.registry.definitions() {
            match self.start(&def.name).await {
                Ok(status) => debug!(service = %def.name, state = %status.state, "Start step done"),
                Err(err) if !def.critical => {
                    warn!(service = %def.name, error = %err, "Non-critical service failed to start, continuing");
                }
                Err(err) => {
                    error!(service = %def.name, error = %err, "Critical service failed, aborting start sequence");
                    return Err(SupervisorError::StartAborted {
                        service: def.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(self.status_all())
    }

    /// Stop every service that is not already Stopped, concurrently.
    pub async fn stop_all(&self) -> Vec<ServiceStatus> {
        let targets: Vec<&str> = self
            .status_all()
            .iter()
            .filter(|s| s.state != ServiceState::Stopped)
            .filter_map(|s| self.shared.registry.get(&s.name))
            .map(|d| d.name.as_str())
            .collect();

        for result in join_all(targets.iter().map(|name| self.stop(name))).await {
            if let Err(err) = result {
                warn!(error = %err, "Stop failed during stop_all");
            }
        }
        self.status_all()
    }

    /// Stop everything before the host exits.
    pub async fn shutdown(&self) {
        info!("Shutting down process supervisor");
        self.stop_all().await;
    }

    /// Current status of one service. No side effects.
    pub fn status(&self, name: &str) -> Result<ServiceStatus, SupervisorError> {
        self.shared
            .tracker
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))
    }

    /// Current status of every service in declared order. No side effects.
    pub fn status_all(&self) -> Vec<ServiceStatus> {
        self.shared.tracker.get_all()
    }

    /// Probe every Running service once.
    pub async fn check_health(&self) -> HealthReport {
        self.health.check_all(&self.status_all()).await
    }

    /// Build a periodic health monitor over this supervisor's services.
    pub fn health_monitor(&self, interval: Duration, cancel: CancellationToken) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.health),
            Arc::clone(&self.shared.tracker),
            self.events.clone(),
            interval,
            cancel,
        )
    }

    /// Subscribe to log and status events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// The event broadcaster, for adapters that forward events.
    pub fn events(&self) -> Arc<EventBroadcaster> {
        Arc::clone(&self.events)
    }

    /// The service registry this supervisor was built from.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.shared.registry
    }

    fn definition(&self, name: &str) -> Result<&ServiceDefinition, SupervisorError> {
        self.shared
            .registry
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("tracker", &self.shared.tracker)
            .finish_non_exhaustive()
    }
}

//! Status tracking for supervised services.
//!
//! The tracker owns the status table. Only the supervisor applies patches;
//! everyone else reads snapshots or listens for status events.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use flotilla_core::{EventSink, ServiceState, ServiceStatus, SupervisorEvent};
use tracing::debug;

/// A typed change to one service's status.
///
/// Applying a patch keeps the status invariants: pid, port and uptime exist
/// only while Running, and `last_error` only in Error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPatch {
    /// Entering `Starting`; records the start timestamp.
    Starting { started_at: DateTime<Utc> },
    /// Entering `Running`.
    Running { pid: Option<u32>, port: Option<u16> },
    /// Port learned while Running (ignored in other states).
    Port(u16),
    /// Entering `Stopped`.
    Stopped,
    /// Entering `Error` with a human-readable reason.
    Error(String),
}

impl StatusPatch {
    pub(crate) fn apply(self, status: &mut ServiceStatus) {
        match self {
            Self::Starting { started_at } => {
                status.state = ServiceState::Starting;
                status.started_at = Some(started_at);
                status.pid = None;
                status.port = None;
                status.last_error = None;
            }
            Self::Running { pid, port } => {
                status.state = ServiceState::Running;
                status.pid = pid;
                status.port = port;
                status.last_error = None;
                if status.started_at.is_none() {
                    status.started_at = Some(Utc::now());
                }
            }
            Self::Port(port) => {
                if status.state == ServiceState::Running {
                    status.port = Some(port);
                }
            }
            Self::Stopped => {
                status.state = ServiceState::Stopped;
                status.pid = None;
                status.port = None;
                status.started_at = None;
                status.last_error = None;
            }
            Self::Error(message) => {
                status.state = ServiceState::Error;
                status.pid = None;
                status.port = None;
                status.started_at = None;
                status.last_error = Some(message);
            }
        }
        status.uptime_secs = None;
    }
}

/// Holds the current status of every service and publishes changes.
pub struct StatusTracker {
    statuses: RwLock<HashMap<String, ServiceStatus>>,
    order: Vec<String>,
    sink: Arc<dyn EventSink>,
}

impl StatusTracker {
    /// Create a tracker with every named service in `Stopped`.
    pub fn new<I, S>(names: I, sink: Arc<dyn EventSink>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = names.into_iter().map(Into::into).collect();
        let statuses = order
            .iter()
            .map(|name| (name.clone(), ServiceStatus::stopped(name.clone())))
            .collect();
        Self {
            statuses: RwLock::new(statuses),
            order,
            sink,
        }
    }

    /// Apply a patch and publish a status event if anything changed.
    ///
    /// Returns the resulting snapshot, or `None` for an unknown service.
    pub fn set_state(&self, name: &str, patch: StatusPatch) -> Option<ServiceStatus> {
        let mut statuses = self.statuses.write().unwrap_or_else(PoisonError::into_inner);
        let status = statuses.get_mut(name)?;

        let before = status.clone();
        patch.apply(status);
        let snapshot = status.clone().with_uptime(Utc::now());

        if *status != before {
            debug!(
                service = %name,
                from = %before.state,
                to = %status.state,
                pid = ?status.pid,
                port = ?status.port,
                "Status changed"
            );
            // Emitted under the lock so events for one service keep apply order
            self.sink.emit(SupervisorEvent::status(snapshot.clone()));
        }
        Some(snapshot)
    }

    /// Current status of one service, with uptime computed now.
    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        let statuses = self.statuses.read().unwrap_or_else(PoisonError::into_inner);
        statuses.get(name).cloned().map(|s| s.with_uptime(Utc::now()))
    }

    /// Current status of every service in declared order.
    pub fn get_all(&self) -> Vec<ServiceStatus> {
        let statuses = self.statuses.read().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        self.order
            .iter()
            .filter_map(|name| statuses.get(name).cloned())
            .map(|s| s.with_uptime(now))
            .collect()
    }

    /// Current lifecycle state of one service.
    pub fn state(&self, name: &str) -> Option<ServiceState> {
        let statuses = self.statuses.read().unwrap_or_else(PoisonError::into_inner);
        statuses.get(name).map(|s| s.state)
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker")
            .field("services", &self.order)
            .finish_non_exhaustive()
    }
}

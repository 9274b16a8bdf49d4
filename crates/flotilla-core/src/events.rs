//! Supervisor events for real-time state synchronization.
//!
//! These events are emitted by the supervisor and consumed by the host UI
//! (through whatever transport it uses) to keep a live view of every
//! service. Status events carry a full snapshot, so consumers never need to
//! merge partial updates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{LogEntry, ServiceStatus};

/// Health of every service at one point in time (`name -> healthy`).
pub type HealthReport = BTreeMap<String, bool>;

/// Event payload published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SupervisorEvent {
    /// One line of service output (or a supervisor lifecycle note).
    Log(LogEntry),

    /// A service's status changed (state or any field).
    Status {
        service: String,
        status: ServiceStatus,
    },

    /// Periodic health monitor result; emitted only when it changes.
    Health { report: HealthReport },
}

impl SupervisorEvent {
    /// Create a status event from a snapshot.
    pub fn status(status: ServiceStatus) -> Self {
        Self::Status {
            service: status.name.clone(),
            status,
        }
    }

    /// Event name used by transports that route on a string key.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Log(_) => "service:log",
            Self::Status { .. } => "service:status",
            Self::Health { .. } => "service:health",
        }
    }

    /// Service this event concerns, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::Log(entry) => Some(&entry.service),
            Self::Status { service, .. } => Some(service),
            Self::Health { .. } => None,
        }
    }
}

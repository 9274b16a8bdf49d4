//! Service lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not running.
    #[default]
    Stopped,
    /// Spawned, waiting for a readiness signal.
    Starting,
    /// Ready (marker observed or optimistically promoted).
    Running,
    /// Failed to start or exited abnormally.
    Error,
}

impl ServiceState {
    /// Whether a process is (or is about to be) alive for this state.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of one service's status.
///
/// `port`, `pid` and `uptime_secs` are only present while `Running`;
/// `last_error` is only present in `Error`. `uptime_secs` is derived at
/// read time from `started_at` and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Current lifecycle state.
    pub state: ServiceState,
    /// Port the service listens on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// OS process ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// When the current start attempt began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since `started_at`, filled in on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    /// Human-readable reason for the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ServiceStatus {
    /// A fresh `Stopped` status.
    pub fn stopped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Stopped,
            port: None,
            pid: None,
            started_at: None,
            uptime_secs: None,
            last_error: None,
        }
    }

    /// Uptime relative to `now`, only meaningful while running.
    pub fn uptime_at(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.state != ServiceState::Running {
            return None;
        }
        self.started_at
            .map(|started| u64::try_from((now - started).num_seconds()).unwrap_or(0))
    }

    /// Copy of this status with `uptime_secs` computed for `now`.
    #[must_use]
    pub fn with_uptime(mut self, now: DateTime<Utc>) -> Self {
        self.uptime_secs = self.uptime_at(now);
        self
    }

    /// Whether the service is Running.
    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }
}

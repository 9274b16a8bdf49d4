//! Supervisor policy settings.
//!
//! All fields are optional so a manifest can override only what it needs;
//! the `effective_*` accessors fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a service may spend in `Starting` before the readiness policy applies.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Default wait between a graceful termination request and a forced kill.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Default delay between the old instance exiting and the restart spawning.
pub const DEFAULT_RESTART_SETTLE_MS: u64 = 500;

/// Default timeout for a single health probe.
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;

/// Supervisor-wide policy values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SupervisorSettings {
    /// Startup timeout for services without their own override.
    pub startup_timeout_ms: Option<u64>,

    /// Grace period before escalating to a forced kill.
    pub grace_period_ms: Option<u64>,

    /// Settle delay applied by `restart` after the old process exits.
    pub restart_settle_ms: Option<u64>,

    /// Per-probe health check timeout.
    pub health_timeout_ms: Option<u64>,

    /// Substrings that classify a log line as `success`.
    pub success_markers: Vec<String>,
}

impl SupervisorSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            startup_timeout_ms: Some(DEFAULT_STARTUP_TIMEOUT_MS),
            grace_period_ms: Some(DEFAULT_GRACE_PERIOD_MS),
            restart_settle_ms: Some(DEFAULT_RESTART_SETTLE_MS),
            health_timeout_ms: Some(DEFAULT_HEALTH_TIMEOUT_MS),
            success_markers: Vec::new(),
        }
    }

    /// Get the effective startup timeout (with default fallback).
    #[must_use]
    pub fn effective_startup_timeout(&self) -> Duration {
        Duration::from_millis(
            self.startup_timeout_ms
                .unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS),
        )
    }

    /// Get the effective grace period (with default fallback).
    #[must_use]
    pub fn effective_grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS))
    }

    /// Get the effective restart settle delay (with default fallback).
    #[must_use]
    pub fn effective_restart_settle(&self) -> Duration {
        Duration::from_millis(
            self.restart_settle_ms
                .unwrap_or(DEFAULT_RESTART_SETTLE_MS),
        )
    }

    /// Get the effective health probe timeout (with default fallback).
    #[must_use]
    pub fn effective_health_timeout(&self) -> Duration {
        Duration::from_millis(
            self.health_timeout_ms
                .unwrap_or(DEFAULT_HEALTH_TIMEOUT_MS),
        )
    }

    /// Set the startup timeout.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = Some(millis(timeout));
        self
    }

    /// Set the grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = Some(millis(grace));
        self
    }

    /// Set the restart settle delay.
    #[must_use]
    pub fn with_restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle_ms = Some(millis(settle));
        self
    }

    /// Set the health probe timeout.
    #[must_use]
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout_ms = Some(millis(timeout));
        self
    }

    /// Add a success marker.
    #[must_use]
    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_markers.push(marker.into());
        self
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_fall_back_to_defaults() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.effective_startup_timeout(), Duration::from_secs(30));
        assert_eq!(settings.effective_grace_period(), Duration::from_secs(5));
        assert_eq!(settings.effective_restart_settle(), Duration::from_millis(500));
        assert_eq!(settings.effective_health_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_overrides() {
        let settings: SupervisorSettings =
            serde_json::from_str(r#"{"gracePeriodMs": 250, "successMarkers": ["ok"]}"#).unwrap();
        assert_eq!(settings.effective_grace_period(), Duration::from_millis(250));
        assert_eq!(settings.effective_startup_timeout(), Duration::from_secs(30));
        assert_eq!(settings.success_markers, vec!["ok"]);
    }

    #[test]
    fn test_builders() {
        let settings = SupervisorSettings::with_defaults()
            .with_startup_timeout(Duration::from_millis(100))
            .with_grace_period(Duration::from_millis(50));
        assert_eq!(settings.startup_timeout_ms, Some(100));
        assert_eq!(settings.grace_period_ms, Some(50));
    }
}

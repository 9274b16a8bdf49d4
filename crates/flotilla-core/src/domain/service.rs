//! Service definition types.
//!
//! A `ServiceDefinition` is loaded once at startup and never mutated. It
//! describes how to launch one service and how to tell when it is ready.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default liveness path probed by the health checker.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// How the supervisor relates to a service's process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Spawned, monitored and terminated by the supervisor.
    #[default]
    Managed,
    /// Already running elsewhere (e.g. a dev server); only referenced by port.
    External,
}

/// What to do when no readiness marker shows up within the startup timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPolicy {
    /// Optimistically mark the service Running and log a warning.
    ///
    /// Trades correctness for availability: a service with no reliable
    /// readiness output is assumed ready once the timeout elapses.
    #[default]
    Promote,
    /// Treat the timeout as a startup failure and terminate the process.
    Fail,
}

/// Immutable description of one supervised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Unique service name (registry key).
    pub name: String,
    /// Managed process or external reference.
    #[serde(default)]
    pub kind: ServiceKind,
    /// Executable to launch. Required for managed services.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variable overrides applied on top of the host environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Port the service is expected to listen on.
    #[serde(default)]
    pub port: Option<u16>,
    /// Output substrings that signal the service has finished initializing.
    #[serde(default)]
    pub readiness_markers: Vec<String>,
    /// Whether a startup failure aborts `start_all`.
    #[serde(default = "default_critical")]
    pub critical: bool,
    /// Per-service override of the startup timeout, in milliseconds.
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    /// Behavior when the startup timeout elapses without a marker.
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    /// Liveness path for health probes.
    #[serde(default)]
    pub health_path: Option<String>,
}

const fn default_critical() -> bool {
    true
}

impl ServiceDefinition {
    /// Create a managed service definition that launches `command`.
    pub fn managed(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ServiceKind::Managed,
            command: Some(command.into()),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            port: None,
            readiness_markers: Vec::new(),
            critical: true,
            startup_timeout_ms: None,
            readiness: ReadinessPolicy::Promote,
            health_path: None,
        }
    }

    /// Create a reference to an already-running server on `port`.
    pub fn external(name: impl Into<String>, port: u16) -> Self {
        Self {
            kind: ServiceKind::External,
            command: None,
            port: Some(port),
            ..Self::managed(name, String::new())
        }
    }

    /// Set the process arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the expected listening port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add a readiness marker.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.readiness_markers.push(marker.into());
        self
    }

    /// Mark the service as non-critical.
    #[must_use]
    pub const fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Override the startup timeout for this service.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the readiness policy.
    #[must_use]
    pub const fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Set the liveness path used by health probes.
    #[must_use]
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Per-service startup timeout, if overridden.
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_ms.map(Duration::from_millis)
    }

    /// Effective liveness path.
    pub fn effective_health_path(&self) -> &str {
        self.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH)
    }

    /// Whether `line` contains one of this service's readiness markers.
    pub fn is_ready_line(&self, line: &str) -> bool {
        self.readiness_markers
            .iter()
            .any(|marker| !marker.is_empty() && line.contains(marker.as_str()))
    }

    /// Whether the supervisor spawns this service itself.
    pub const fn is_managed(&self) -> bool {
        matches!(self.kind, ServiceKind::Managed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r#"{"name": "backend", "command": "python", "port": 8000}"#;
        let def: ServiceDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.kind, ServiceKind::Managed);
        assert!(def.critical);
        assert_eq!(def.readiness, ReadinessPolicy::Promote);
        assert_eq!(def.effective_health_path(), "/health");
        assert!(def.startup_timeout().is_none());
    }

    #[test]
    fn test_deserialize_camel_case_fields() {
        let json = r#"{
            "name": "admin",
            "command": "node",
            "args": ["server.js"],
            "workingDir": "admin",
            "env": {"NODE_PATH": "../shared"},
            "readinessMarkers": ["listening"],
            "critical": false,
            "startupTimeoutMs": 1500,
            "readiness": "fail",
            "healthPath": "/live"
        }"#;
        let def: ServiceDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.args, vec!["server.js"]);
        assert_eq!(def.env.get("NODE_PATH").map(String::as_str), Some("../shared"));
        assert!(!def.critical);
        assert_eq!(def.startup_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(def.readiness, ReadinessPolicy::Fail);
        assert_eq!(def.effective_health_path(), "/live");
    }

    #[test]
    fn test_external_has_port_and_no_command() {
        let def = ServiceDefinition::external("devserver", 5173);
        assert!(!def.is_managed());
        assert_eq!(def.port, Some(5173));
        assert!(def.command.is_none());
    }

    #[test]
    fn test_ready_line_ignores_empty_markers() {
        let def = ServiceDefinition::managed("a", "sh").with_marker("");
        assert!(!def.is_ready_line("anything"));

        let def = def.with_marker("READY");
        assert!(def.is_ready_line("server READY on 8000"));
        assert!(!def.is_ready_line("server ready"));
    }
}

//! Error types for the supervisor domain.
//!
//! Runtime failures are captured by the supervisor and surfaced as status
//! and log events; these types are what a caller of a lifecycle operation
//! sees when that operation itself failed.

use thiserror::Error;

/// Failure of a supervisor lifecycle operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorError {
    /// The name is not in the service registry (caller error).
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The OS refused to create the process (e.g. executable not found).
    #[error("Failed to spawn {service}: {reason}")]
    SpawnFailed { service: String, reason: String },

    /// The service reported that its address is already in use.
    #[error("Port conflict for {service}: {message}")]
    PortConflict { service: String, message: String },

    /// The process exited before it became ready.
    #[error("{service} exited during startup: {reason}")]
    ExitedDuringStartup { service: String, reason: String },

    /// No readiness marker within the timeout and the policy forbids promotion.
    #[error("{service} did not become ready within {timeout_ms}ms")]
    StartupTimeout { service: String, timeout_ms: u64 },

    /// A critical service failed, so `start_all` stopped early.
    #[error("Start sequence aborted at critical service {service}: {reason}")]
    StartAborted { service: String, reason: String },

    /// The instance task ended without reporting an outcome.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// Service this error concerns, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::UnknownService(name) => Some(name),
            Self::SpawnFailed { service, .. }
            | Self::PortConflict { service, .. }
            | Self::ExitedDuringStartup { service, .. }
            | Self::StartupTimeout { service, .. }
            | Self::StartAborted { service, .. } => Some(service),
            Self::Internal(_) => None,
        }
    }

    /// Stable machine-readable kind for transports.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownService(_) => "unknownService",
            Self::SpawnFailed { .. } => "spawnFailed",
            Self::PortConflict { .. } => "portConflict",
            Self::ExitedDuringStartup { .. } => "exitedDuringStartup",
            Self::StartupTimeout { .. } => "startupTimeout",
            Self::StartAborted { .. } => "startAborted",
            Self::Internal(_) => "internal",
        }
    }
}

/// Failure to load or validate service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two definitions share a name.
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    /// A definition is unusable as written.
    #[error("Invalid definition for {service}: {reason}")]
    InvalidDefinition { service: String, reason: String },

    /// The manifest file could not be read.
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for the expected shape.
    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

//! Core domain types and port definitions for the flotilla process supervisor.
//!
//! This crate has no process or network code. It defines what a service is,
//! what its status looks like, which events the supervisor publishes, and how
//! the service manifest is loaded.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod events;
pub mod manifest;
pub mod ports;
pub mod registry;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    DEFAULT_HEALTH_PATH, LogEntry, LogLevel, LogStream, ReadinessPolicy, ServiceDefinition,
    ServiceKind, ServiceState, ServiceStatus,
};
pub use error::{ConfigError, SupervisorError};
pub use events::{HealthReport, SupervisorEvent};
pub use manifest::Manifest;
pub use ports::{EventSink, NoopSink};
pub use registry::ServiceRegistry;
pub use settings::SupervisorSettings;

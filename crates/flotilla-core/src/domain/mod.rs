//! Domain types shared by the supervisor and its adapters.

mod log;
mod service;
mod status;

pub use log::{LogEntry, LogLevel, LogStream};
pub use service::{DEFAULT_HEALTH_PATH, ReadinessPolicy, ServiceDefinition, ServiceKind};
pub use status::{ServiceState, ServiceStatus};

//! Process supervision runtime for flotilla.
//!
//! Spawns the services described by a `ServiceRegistry`, streams their
//! output as classified log events, tracks lifecycle status, and probes
//! health over HTTP. Hosts talk to it through `ProcessSupervisor` directly
//! or through the serde command surface in [`commands`].

#![deny(unsafe_code)]

mod broadcaster;
pub mod commands;
pub mod health;
pub mod logs;
pub mod process;
pub mod status;
mod supervisor;

#[cfg(test)]
mod testing;

pub use broadcaster::EventBroadcaster;
pub use commands::{CommandError, CommandResponse, SupervisorCommand};
pub use health::{HealthChecker, HealthMonitor, HealthProbe, HttpProbe};
pub use logs::LogPipeline;
pub use status::{StatusPatch, StatusTracker};
pub use supervisor::ProcessSupervisor;

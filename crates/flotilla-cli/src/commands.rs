//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the services defined in the manifest
    List,

    /// Start all services and stream their events until interrupted
    Up {
        /// Emit events as JSON lines and accept JSON commands on stdin
        #[arg(long)]
        stdio: bool,

        /// Probe service health every N seconds
        #[arg(long, value_name = "SECS")]
        health_interval: Option<u64>,
    },

    /// Start all services, report health once, then stop them
    Check,
}

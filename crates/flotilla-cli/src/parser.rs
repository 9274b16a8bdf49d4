//! Root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Run and watch a project's auxiliary services.
#[derive(Parser)]
#[command(name = "flotilla")]
#[command(about = "Supervise the auxiliary services of a desktop app")]
#[command(version)]
pub struct Cli {
    /// Service manifest (JSON)
    #[arg(long, env = "FLOTILLA_MANIFEST", global = true)]
    pub manifest: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

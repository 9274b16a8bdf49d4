//! Command-line host for the flotilla process supervisor.
//!
//! `main.rs` is the composition root; everything it wires lives here so the
//! parser and handlers stay testable.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the binary target only
use dotenvy as _;

pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliConfig, CliContext, bootstrap, init_tracing};
pub use commands::Commands;
pub use parser::Cli;

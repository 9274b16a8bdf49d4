//! Command handlers.
//!
//! Each handler takes the `CliContext`, drives the supervisor, and formats
//! output for the terminal or the stdio bridge.

pub mod check;
pub mod list;
pub mod up;

//! OS process plumbing for supervised services.
//!
//! # Structure
//!
//! - `ProcessHandle` - Owns one spawned child and its output pipes
//! - `spawn_stream_reader` - Byte-safe line readers for stdout/stderr
//! - `shutdown_child` - SIGTERM → grace period → SIGKILL escalation

mod handle;
pub mod shutdown;
mod stream;

pub use handle::ProcessHandle;
pub use shutdown::{ShutdownOutcome, describe_exit, shutdown_child};
pub use stream::{OutputLine, spawn_stream_reader};

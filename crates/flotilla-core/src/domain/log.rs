//! Structured log entries produced from service output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity assigned to a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// Where a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Lifecycle notes written by the supervisor itself.
    Supervisor,
}

impl LogStream {
    /// Stream label used in tracing output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Supervisor => "supervisor",
        }
    }
}

/// A single leveled log line for one service.
///
/// Immutable once created; forwarded to subscribers and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Service that produced the line.
    pub service: String,
    /// Classified severity.
    pub level: LogLevel,
    /// Line text without the trailing newline.
    pub message: String,
    /// Origin of the line.
    pub stream: LogStream,
    /// When the line was ingested.
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Create a log entry stamped with the current time.
    pub fn new(
        service: impl Into<String>,
        level: LogLevel,
        stream: LogStream,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            level,
            message: message.into(),
            stream,
            timestamp: Utc::now(),
        }
    }
}

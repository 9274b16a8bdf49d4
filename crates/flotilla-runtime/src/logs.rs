//! Log pipeline: raw service output to leveled `LogEntry` events.
//!
//! Services print free-form text, so levels are inferred with substring
//! heuristics. The pipeline also recognizes two operational signals in
//! output: a port the service announces, and "address already in use".

use std::sync::{Arc, LazyLock};

use flotilla_core::{EventSink, LogEntry, LogLevel, LogStream, SupervisorEvent};
use regex::Regex;
use tracing::debug;

const ERROR_PATTERNS: &[&str] = &["error", "fail", "panic", "exception", "traceback"];
const WARNING_PATTERNS: &[&str] = &["warn"];
const PORT_CONFLICT_PATTERNS: &[&str] = &[
    "address already in use",
    "eaddrinuse",
    "port is already in use",
    "only one usage of each socket address",
];

static URL_PORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https?://(?:\[[0-9A-Fa-f:]+\]|[\w.\-]+):(\d{2,5})\b").ok());

/// "port N" only counts after a listening verb, so "connecting to db on
/// port 5432" is not mistaken for the service's own port.
static PHRASE_PORT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:listen(?:s|ing)?|serving|running|started|bound)\b[^\n]*?\bport\s*[:=]?\s*(\d{2,5})\b",
    )
    .ok()
});

/// Classify one line of output.
///
/// Error patterns win over warnings, warnings over success markers.
/// Matching is case-insensitive for the built-in patterns and exact for
/// markers.
pub fn classify(line: &str, success_markers: &[String]) -> LogLevel {
    let lower = line.to_lowercase();
    if ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        LogLevel::Error
    } else if WARNING_PATTERNS.iter().any(|p| lower.contains(p)) {
        LogLevel::Warning
    } else if success_markers
        .iter()
        .any(|m| !m.is_empty() && line.contains(m.as_str()))
    {
        LogLevel::Success
    } else {
        LogLevel::Info
    }
}

/// Whether a line reports that the service's address is taken.
pub fn is_port_conflict(line: &str) -> bool {
    let lower = line.to_lowercase();
    PORT_CONFLICT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Extract a listening port announced in a line of output.
pub fn discover_port(line: &str) -> Option<u16> {
    [&*URL_PORT, &*PHRASE_PORT]
        .into_iter()
        .flatten()
        .flat_map(|re| re.captures_iter(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u16>().ok())
        .find(|&port| port != 0)
}

/// Split a chunk into lines, dropping line terminators and blank lines.
pub fn split_lines(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

/// Converts service output into `LogEntry` events.
///
/// Entries are emitted in the order they are ingested. The supervisor feeds
/// each service's stdout and stderr through a single task, so per-service
/// order matches the order the output was read.
pub struct LogPipeline {
    sink: Arc<dyn EventSink>,
    success_markers: Vec<String>,
}

impl LogPipeline {
    /// Create a pipeline that emits to `sink`.
    pub fn new(sink: Arc<dyn EventSink>, success_markers: Vec<String>) -> Self {
        Self {
            sink,
            success_markers,
        }
    }

    /// Ingest a chunk of output for a service.
    ///
    /// `readiness_markers` are treated as success markers for this service in
    /// addition to the configured ones. Returns the emitted entries.
    pub fn ingest(
        &self,
        service: &str,
        stream: LogStream,
        chunk: &str,
        readiness_markers: &[String],
    ) -> Vec<LogEntry> {
        split_lines(chunk)
            .map(|line| {
                let level = self.level_for(line, readiness_markers);
                debug!(service = %service, stream = stream.as_str(), "{}", line);
                let entry = LogEntry::new(service, level, stream, line);
                self.sink.emit(SupervisorEvent::Log(entry.clone()));
                entry
            })
            .collect()
    }

    /// Emit a supervisor-originated lifecycle note for a service.
    pub fn note(&self, service: &str, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(service, level, LogStream::Supervisor, message);
        self.sink.emit(SupervisorEvent::Log(entry.clone()));
        entry
    }

    fn level_for(&self, line: &str, readiness_markers: &[String]) -> LogLevel {
        match classify(line, &self.success_markers) {
            LogLevel::Info if classify(line, readiness_markers) == LogLevel::Success => {
                LogLevel::Success
            }
            level => level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSink;
    use mockall::Sequence;

    fn markers(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_classify_levels() {
        let success = markers(&["Application startup complete"]);
        assert_eq!(classify("ERROR: boom", &success), LogLevel::Error);
        assert_eq!(classify("Connection failed", &success), LogLevel::Error);
        assert_eq!(classify("DeprecationWarning: x", &success), LogLevel::Warning);
        assert_eq!(
            classify("INFO: Application startup complete.", &success),
            LogLevel::Success
        );
        assert_eq!(classify("GET /api 200", &success), LogLevel::Info);
    }

    #[test]
    fn test_error_wins_over_success_marker() {
        let success = markers(&["ready"]);
        assert_eq!(classify("ready but error", &success), LogLevel::Error);
    }

    #[test]
    fn test_split_lines_handles_crlf_and_blanks() {
        let lines: Vec<_> = split_lines("one\r\ntwo\n\n  \nthree").collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_port_conflict_detection() {
        assert!(is_port_conflict(
            "OSError: [Errno 98] Address already in use"
        ));
        assert!(is_port_conflict("Error: listen EADDRINUSE: :::3000"));
        assert!(!is_port_conflict("listening on 3000"));
    }

    #[test]
    fn test_discover_port() {
        assert_eq!(
            discover_port("Uvicorn running on http://127.0.0.1:8000 (Press CTRL+C)"),
            Some(8000)
        );
        assert_eq!(discover_port("Local:   http://localhost:5173/"), Some(5173));
        assert_eq!(discover_port("Listening on port 9001"), Some(9001));
        assert_eq!(discover_port("Server started, port=4000"), Some(4000));
        assert_eq!(discover_port("compiled 42 modules"), None);
        assert_eq!(discover_port("listening on port 99999"), None);
    }

    #[test]
    fn test_discover_port_ignores_incidental_ports() {
        assert_eq!(discover_port("connecting to db on port 5432"), None);
        assert_eq!(discover_port("port=4000"), None);
        assert_eq!(
            discover_port("redis at redis://cache:6379 ready, listening on port 8080"),
            Some(8080)
        );
    }

    #[test]
    fn test_discover_port_falls_through_unparseable_url() {
        assert_eq!(
            discover_port("proxy http://upstream:99999 unreachable; listening on port 8080"),
            Some(8080)
        );
        assert_eq!(
            discover_port("http://a:70000 and http://b:3001"),
            Some(3001)
        );
    }

    #[test]
    fn test_ingest_emits_one_event_per_line_in_order() {
        let mut sink = MockSink::new();
        let mut seq = Sequence::new();
        for expected in ["first", "second", "third"] {
            sink.expect_emit()
                .withf(move |event| {
                    matches!(event, SupervisorEvent::Log(entry) if entry.message == expected)
                })
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }

        let pipeline = LogPipeline::new(Arc::new(sink), Vec::new());
        let entries = pipeline.ingest("api", LogStream::Stdout, "first\nsecond\r\nthird\n", &[]);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.service == "api"));
    }

    #[test]
    fn test_readiness_marker_counts_as_success() {
        let mut sink = MockSink::new();
        sink.expect_emit().return_const(());
        let pipeline = LogPipeline::new(Arc::new(sink), Vec::new());

        let entries = pipeline.ingest("api", LogStream::Stdout, "READY", &markers(&["READY"]));
        assert_eq!(entries[0].level, LogLevel::Success);
    }

    #[test]
    fn test_note_uses_supervisor_stream() {
        let mut sink = MockSink::new();
        sink.expect_emit()
            .withf(|event| {
                matches!(event, SupervisorEvent::Log(entry) if entry.stream == LogStream::Supervisor)
            })
            .times(1)
            .return_const(());
        let pipeline = LogPipeline::new(Arc::new(sink), Vec::new());
        let entry = pipeline.note("api", LogLevel::Warning, "promoted");
        assert_eq!(entry.level, LogLevel::Warning);
    }
}

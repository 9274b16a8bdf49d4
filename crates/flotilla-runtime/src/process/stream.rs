//! Async stream log readers (non-UTF8-safe).
//!
//! Services can emit non-UTF8 bytes on stdout/stderr. `BufReader::lines()`
//! terminates on invalid UTF-8, so lines are read as bytes and decoded
//! lossily to keep the stream alive.

use flotilla_core::LogStream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// One line of process output, tagged with its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: LogStream,
    pub text: String,
}

/// Forward every line of `stream` into `tx` until EOF or the receiver is gone.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    service: String,
    kind: LogStream,
    tx: mpsc::Sender<OutputLine>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    // Trim trailing newline(s)
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(OutputLine { stream: kind, text }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(service = %service, stream = kind.as_str(), error = %e, "log stream reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(service = %service, stream = kind.as_str(), "log stream reader task exiting");
    });
}

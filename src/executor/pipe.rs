//! Internal utilities for streaming remote command output to logs.
//!
//! This module handles reading from the local `ssh` process's stdout/stderr
//! pipes, logging each line as it arrives and capturing the raw bytes for
//! the caller.

use std::io::{BufRead, BufReader, Read};

/// Type of output stream for logging purposes.
#[derive(Clone, Copy)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts a human-readable message from a thread panic.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads from a pipe until EOF, logging each line and returning everything read.
///
/// - stdout is logged at DEBUG level, stderr at WARN level.
/// - Binary data uses lossy UTF-8 conversion for logging; the returned
///   buffer holds the raw bytes.
/// - I/O errors stop reading but don't fail command execution; the command's
///   success is determined by its exit status.
/// - A `None` pipe logs an error and returns an empty buffer.
pub(super) fn read_pipe<R: Read>(pipe: Option<R>, stream_type: StreamType) -> Vec<u8> {
    let mut captured = Vec::new();
    let Some(pipe) = pipe else {
        tracing::error!(
            stream = %stream_type,
            "pipe was None (unexpected: Stdio::piped() was set), no output will be captured"
        );
        return captured;
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break,
            Ok(_) => {
                let log_content = line_buf.strip_suffix(b"\n").unwrap_or(&line_buf);
                log_line(log_content, stream_type);
                captured.extend_from_slice(&line_buf);
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }

    captured
}

/// Logs a complete line at the appropriate level.
///
/// Trailing CR is trimmed to handle CRLF line endings from tty sessions.
fn log_line(line: &[u8], stream_type: StreamType) {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim_end_matches('\r');
    match stream_type {
        StreamType::Stdout => tracing::debug!(stream = %stream_type, "{}", trimmed),
        StreamType::Stderr => tracing::warn!(stream = %stream_type, "{}", trimmed),
    }
}

//! Domain-specific error types for rsprovision.
//!
//! This module defines `RsprovisionError`, a `thiserror`-based enum that
//! provides typed error variants for every failure mode of a provisioning
//! run. The core (detection, selection, strategies, orchestrator) returns
//! `Result<T, RsprovisionError>`, while the transport boundary
//! ([`CommandChannel`](crate::executor::CommandChannel)) and the `run_*`
//! entry points use `anyhow::Result`.
//!
//! `RsprovisionError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at boundaries that return `anyhow::Result`.

use std::io;
use std::time::Duration;

use crate::provision::BootstrapStep;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for rsprovision.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RsprovisionError {
    /// The host operating system could not be identified.
    #[error("os detection failed: {0}")]
    Detection(String),

    /// No registered strategy accepted the detected operating system.
    #[error("no compatible provisioner found for os id '{os_id}'")]
    NoCompatibleProvisioner {
        /// The `ID` reported by the host.
        os_id: String,
    },

    /// A registry lookup found no binding for the requested name.
    #[error("no provisioner registered under '{name}'")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A remote command returned non-zero or the channel itself failed.
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The full command line sent to the host.
        command: String,
        /// Exit code, signal information, or the channel's own error message.
        status: String,
    },

    /// The engine daemon never became responsive within the readiness ceiling.
    #[error("readiness timeout: engine not responding after {attempts} attempt(s) in {timeout:?}")]
    ReadinessTimeout {
        /// The configured ceiling.
        timeout: Duration,
        /// How many times the probe ran before giving up.
        attempts: u32,
    },

    /// The run was aborted by an external cancellation signal.
    #[error("provisioning cancelled")]
    Cancelled,

    /// The strategy does not implement the requested package or service action.
    #[error("unsupported action on {family}: {action}")]
    UnsupportedAction {
        /// OS family of the strategy.
        family: String,
        /// The action that was requested.
        action: String,
    },

    /// The host driver could not answer a query (e.g. its IP address).
    #[error("host driver error: {0}")]
    Driver(String),

    /// A bootstrap step failed; carries the step and its original cause.
    #[error("step {index} ({step}) failed: {source}")]
    Step {
        /// 1-based position of the step in the bootstrap sequence.
        index: usize,
        /// The step that failed.
        step: BootstrapStep,
        /// The error the step returned.
        #[source]
        source: Box<RsprovisionError>,
    },

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually including a path.
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection.
        #[source]
        source: std::io::Error,
    },
}

impl RsprovisionError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Creates an `Execution` variant for a command line.
    pub(crate) fn execution(command: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            status: status.into(),
        }
    }

    /// Returns the innermost error, unwrapping any `Step` layers.
    pub fn root_cause(&self) -> &RsprovisionError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

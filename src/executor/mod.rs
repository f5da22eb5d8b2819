//! Remote command execution abstraction for rsprovision.
//!
//! This module provides:
//! - [`CommandOutput`]: Captured result of a remote command
//! - [`CommandChannel`]: Trait for the synchronous "run this command line" primitive
//! - [`SshCommandChannel`]: Production implementation over the `ssh` client
//! - [`run_checked()`]: Cancellation-aware execution with exit status checking

mod pipe;
mod ssh;

use anyhow::Result;

use crate::cancel::CancellationToken;
use crate::error::RsprovisionError;

pub use ssh::{SshCommandChannel, SshConfig};

/// Quotes a string for safe interpolation into a POSIX shell command line.
///
/// Strings made only of characters that are never special to the shell are
/// returned unchanged; everything else is wrapped in single quotes with
/// embedded single quotes escaped as `'\''`.
pub fn shell_quote(s: &str) -> String {
    let is_plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if is_plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Builds a command line that writes `content` to `path` on the remote host.
///
/// The content is streamed through `sudo sh -c` into a uuid-named temporary
/// file next to the target, given `mode`, and then renamed over the target,
/// so readers never observe a partially written file.
pub fn remote_write_command(path: &str, content: &str, mode: u32) -> String {
    let tmp = format!("{}.rsprovision-{}", path, uuid::Uuid::new_v4());
    let script = format!(
        "cat > {tmp} && chmod {mode:o} {tmp} && mv {tmp} {path}",
        tmp = shell_quote(&tmp),
        mode = mode,
        path = shell_quote(path),
    );
    format!("printf '%s' {} | sudo sh -c {}", shell_quote(content), shell_quote(&script))
}

/// Shortens a command line for log output.
///
/// Commands that carry file contents (certificates, rendered options) are
/// reduced to their first line plus a byte count.
pub(crate) fn command_summary(command: &str) -> String {
    const MAX: usize = 120;
    let first_line = command.lines().next().unwrap_or_default();
    if first_line.len() == command.len() && command.len() <= MAX {
        return command.to_string();
    }
    let mut end = first_line.len().min(MAX);
    while !first_line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &first_line[..end], command.len())
}

/// Captured result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the remote command (None in dry-run mode)
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: Vec<u8>,
    /// Captured standard error
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    pub fn success_with_stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (status is None), this always returns true.
    pub fn success(&self) -> bool {
        self.status.is_none_or(|code| code == 0)
    }

    /// Returns stdout decoded as UTF-8 (lossy).
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Returns stderr decoded as UTF-8 (lossy).
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Trait for remote command execution.
///
/// Implementations are responsible for transport only: the caller assembles
/// the full shell command line, including any `sudo` prefix. Implementations
/// must be `Send + Sync` so a channel can be shared as `Arc<dyn CommandChannel>`
/// between a driver and the provisioner that uses it.
pub trait CommandChannel: Send + Sync {
    /// Runs `command` on the host and waits until it completes.
    ///
    /// A non-zero exit is reported through [`CommandOutput::status`], not as
    /// an error. `Err` is reserved for transport failures.
    fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Runs `command` with a pseudo-terminal allocated on the remote side.
    ///
    /// Needed for commands that must pass `sudo`'s `requiretty` check.
    fn run_tty(&self, command: &str) -> Result<CommandOutput> {
        self.run(command)
    }
}

/// Runs a command through `channel` and checks its exit status.
///
/// The token is checked before the command is issued and again after it
/// completes; a result that arrives after cancellation is discarded.
/// Transport failures and non-zero exits both become
/// [`RsprovisionError::Execution`] carrying the command line.
pub fn run_checked(
    channel: &dyn CommandChannel,
    cancel: &CancellationToken,
    command: &str,
    tty: bool,
) -> Result<CommandOutput, RsprovisionError> {
    cancel.check()?;
    tracing::trace!("running remote command: {}", command_summary(command));

    let result = if tty {
        channel.run_tty(command)
    } else {
        channel.run(command)
    };

    cancel.check()?;

    let output = result.map_err(|e| match e.downcast::<RsprovisionError>() {
        Ok(typed) => typed,
        Err(e) => RsprovisionError::execution(command_summary(command), format!("{:#}", e)),
    })?;

    match output.status {
        Some(code) if code != 0 => {
            let stderr = output.stderr_string();
            let status = if stderr.trim().is_empty() {
                format!("exit status: {}", code)
            } else {
                format!("exit status: {}: {}", code, stderr.trim())
            };
            Err(RsprovisionError::execution(command_summary(command), status))
        }
        _ => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedChannel {
        output: CommandOutput,
        fail: bool,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedChannel {
        fn new(output: CommandOutput) -> Self {
            Self {
                output,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandChannel for ScriptedChannel {
        fn run(&self, command: &str) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push((command.to_string(), false));
            if self.fail {
                anyhow::bail!("connection reset by peer");
            }
            Ok(self.output.clone())
        }

        fn run_tty(&self, command: &str) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push((command.to_string(), true));
            Ok(self.output.clone())
        }
    }

    #[test]
    fn shell_quote_leaves_plain_words() {
        assert_eq!(shell_quote("curl"), "curl");
        assert_eq!(shell_quote("/etc/docker/ca.pem"), "/etc/docker/ca.pem");
    }

    #[test]
    fn shell_quote_wraps_special_characters() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn remote_write_command_uses_temp_file_and_rename() {
        let cmd = remote_write_command("/etc/sysconfig/docker", "OPTIONS='x'\n", 0o644);
        assert!(cmd.starts_with("printf '%s' "));
        assert!(cmd.contains("| sudo sh -c "));
        assert!(cmd.contains("/etc/sysconfig/docker.rsprovision-"));
        assert!(cmd.contains("chmod 644"));
        assert!(cmd.contains("mv "));
    }

    #[test]
    fn command_summary_truncates_multiline() {
        let summary = command_summary("printf '%s' 'line one\nline two'");
        assert!(summary.starts_with("printf '%s' 'line one..."));
        assert!(summary.ends_with("bytes)"));
        assert_eq!(command_summary("sudo docker version"), "sudo docker version");
    }

    #[test]
    fn success_treats_dry_run_as_success() {
        assert!(CommandOutput::default().success());
        assert!(CommandOutput::success_with_stdout("ok").success());
        let failed = CommandOutput {
            status: Some(1),
            ..Default::default()
        };
        assert!(!failed.success());
    }

    #[test]
    fn run_checked_returns_output_on_success() {
        let channel = ScriptedChannel::new(CommandOutput::success_with_stdout("node1\n"));
        let output = run_checked(&channel, &CancellationToken::new(), "hostname", false).unwrap();
        assert_eq!(output.stdout_string(), "node1\n");
    }

    #[test]
    fn run_checked_maps_nonzero_exit_to_execution_error() {
        let channel = ScriptedChannel::new(CommandOutput {
            status: Some(2),
            stdout: Vec::new(),
            stderr: b"No package foo available.\n".to_vec(),
        });
        let err =
            run_checked(&channel, &CancellationToken::new(), "sudo yum install foo", false)
                .unwrap_err();
        match err {
            RsprovisionError::Execution { command, status } => {
                assert_eq!(command, "sudo yum install foo");
                assert_eq!(status, "exit status: 2: No package foo available.");
            }
            other => panic!("expected Execution, got: {:?}", other),
        }
    }

    #[test]
    fn run_checked_maps_transport_failure_to_execution_error() {
        let mut channel = ScriptedChannel::new(CommandOutput::default());
        channel.fail = true;
        let err = run_checked(&channel, &CancellationToken::new(), "true", false).unwrap_err();
        assert!(matches!(err, RsprovisionError::Execution { .. }));
        assert!(err.to_string().contains("connection reset by peer"));
    }

    #[test]
    fn run_checked_does_not_issue_when_cancelled() {
        let channel = ScriptedChannel::new(CommandOutput::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_checked(&channel, &cancel, "true", false).unwrap_err();
        assert!(matches!(err, RsprovisionError::Cancelled));
        assert!(channel.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn run_checked_routes_tty_commands() {
        let channel = ScriptedChannel::new(CommandOutput::default());
        run_checked(&channel, &CancellationToken::new(), "sudo sed", true).unwrap();
        assert_eq!(channel.calls.lock().unwrap()[0], ("sudo sed".to_string(), true));
    }
}

//! SSH command channel implementation.
//!
//! This module provides [`SshCommandChannel`], which runs remote commands
//! by spawning the local `ssh` client with captured, real-time logged output,
//! a per-command deadline, and cancellation support.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::Deserialize;
use which::which;

use super::pipe::{StreamType, panic_message, read_pipe};
use super::{CommandChannel, CommandOutput, command_summary};
use crate::cancel::{CANCEL_POLL_SLICE, CancellationToken};
use crate::error::RsprovisionError;

/// SSH connection settings for a host.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    pub host: String,
    /// Remote user
    #[serde(default = "default_user")]
    pub user: String,
    /// Remote SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the private key; relative paths are resolved against the profile
    #[serde(default)]
    pub identity_file: Option<Utf8PathBuf>,
    /// Additional arguments passed to `ssh` before the destination
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Seconds to wait for the TCP/SSH handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds a single remote command may run before it is killed
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl SshConfig {
    /// Creates a configuration for `host` with default settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: default_user(),
            port: default_port(),
            identity_file: None,
            extra_args: Vec::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }

    /// Returns the `user@host` destination string.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Cleans up a child process and its associated reader threads.
///
/// Kills the child, waits for it to terminate, and joins all reader threads
/// so no pipe readers outlive the call.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<Vec<u8>>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

/// Command channel that runs commands on a remote host through `ssh`.
///
/// When `dry_run` is true, commands are logged but not executed,
/// and `run()` returns a [`CommandOutput`] whose status is `None`.
pub struct SshCommandChannel {
    config: SshConfig,
    dry_run: bool,
    cancel: CancellationToken,
}

impl SshCommandChannel {
    pub fn new(config: SshConfig, dry_run: bool, cancel: CancellationToken) -> Self {
        Self {
            config,
            dry_run,
            cancel,
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Builds the `ssh` argument vector for a remote command.
    pub fn ssh_args(&self, command: &str, tty: bool) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=quiet".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-p".to_string(),
            self.config.port.to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string());
        }
        if tty {
            args.push("-tt".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(self.config.destination());
        args.push(command.to_string());
        args
    }

    fn execute(&self, command: &str, tty: bool) -> Result<CommandOutput> {
        if self.dry_run {
            tracing::info!(
                "dry run: ssh {}: {}",
                self.config.destination(),
                command_summary(command)
            );
            return Ok(CommandOutput::default());
        }

        let ssh = which("ssh").context("command not found: ssh")?;
        let args = self.ssh_args(command, tty);
        let summary = command_summary(command);

        let mut child = Command::new(ssh)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn ssh to {}", self.config.destination()))?;

        tracing::trace!("spawned ssh: {}: pid={}", self.config.destination(), child.id());

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || read_pipe(stdout_pipe, StreamType::Stdout))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(RsprovisionError::execution(
                    &summary,
                    format!("failed to spawn stdout reader thread: {}", e),
                )
                .into());
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || read_pipe(stderr_pipe, StreamType::Stderr))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(RsprovisionError::execution(
                    &summary,
                    format!("failed to spawn stderr reader thread: {}", e),
                )
                .into());
            }
        };

        let timeout = Duration::from_secs(self.config.command_timeout_secs);
        // An unrepresentable deadline means the command is never timed out.
        let deadline = Instant::now().checked_add(timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                    return Err(RsprovisionError::execution(
                        &summary,
                        format!("failed to wait for ssh: {}", e),
                    )
                    .into());
                }
            }

            if self.cancel.is_cancelled() {
                tracing::debug!("cancellation requested, killing ssh: {}", summary);
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(RsprovisionError::Cancelled.into());
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                cleanup_child_process(&mut child, [stdout_handle, stderr_handle]);
                return Err(RsprovisionError::execution(
                    &summary,
                    format!("timed out after {:?}", timeout),
                )
                .into());
            }

            thread::sleep(CANCEL_POLL_SLICE);
        };

        let mut captured = Vec::with_capacity(2);
        let mut panicked_streams = Vec::new();
        let handles = [("stdout", stdout_handle), ("stderr", stderr_handle)];
        for (name, handle) in handles {
            match handle.join() {
                Ok(bytes) => captured.push(bytes),
                Err(e) => {
                    let msg = panic_message(&*e);
                    tracing::error!(stream = name, panic = msg, "reader thread panicked");
                    panicked_streams.push(format!("{}: {}", name, msg));
                    captured.push(Vec::new());
                }
            }
        }

        if !panicked_streams.is_empty() {
            return Err(RsprovisionError::execution(
                &summary,
                format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            )
            .into());
        }

        let Some(code) = status.code() else {
            return Err(RsprovisionError::execution(
                &summary,
                format!("ssh terminated without exit code: {}", status),
            )
            .into());
        };

        tracing::trace!("executed remote command: {}: exit={}", summary, code);

        let stderr = captured.pop().unwrap_or_default();
        let stdout = captured.pop().unwrap_or_default();
        Ok(CommandOutput {
            status: Some(code),
            stdout,
            stderr,
        })
    }
}

impl CommandChannel for SshCommandChannel {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.execute(command, false)
    }

    fn run_tty(&self, command: &str) -> Result<CommandOutput> {
        self.execute(command, true)
    }
}

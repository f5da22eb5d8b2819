#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use rsprovision::cancel::CancellationToken;
use rsprovision::config::{Profile, load_profile};
use rsprovision::driver::HostDriver;
use rsprovision::executor::{CommandChannel, CommandOutput};

pub const CENTOS_OS_RELEASE: &str = r#"NAME="CentOS Linux"
VERSION="7 (Core)"
ID="centos"
ID_LIKE="rhel fedora"
VERSION_ID="7"
PRETTY_NAME="CentOS Linux 7 (Core)"
"#;

pub const UBUNTU_OS_RELEASE: &str = r#"NAME="Ubuntu"
VERSION="14.04.5 LTS, Trusty Tahr"
ID=ubuntu
ID_LIKE=debian
PRETTY_NAME="Ubuntu 14.04.5 LTS"
VERSION_ID="14.04"
"#;

enum Rule {
    /// Matching commands exit non-zero with this stderr
    Fail(String),
    /// Matching commands fail at the transport level
    Error(String),
    /// Matching commands succeed with this stdout
    Respond(String),
    /// Matching commands raise the token, then succeed
    Cancel(CancellationToken),
}

/// Command channel that records every command and answers from rules.
///
/// Rules match by substring and the first matching rule wins. Unmatched
/// commands succeed with empty output.
#[derive(Default)]
pub struct RecordingChannel {
    rules: Mutex<Vec<(String, Rule)>>,
    calls: Mutex<Vec<(String, bool)>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel that reports `os_release` for `cat /etc/os-release`.
    pub fn with_os_release(os_release: &str) -> Arc<Self> {
        let channel = Self::new();
        channel.respond("cat /etc/os-release", os_release);
        channel
    }

    pub fn fail_on(&self, pattern: &str, stderr: &str) {
        self.push_rule(pattern, Rule::Fail(stderr.to_string()));
    }

    pub fn error_on(&self, pattern: &str, message: &str) {
        self.push_rule(pattern, Rule::Error(message.to_string()));
    }

    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.push_rule(pattern, Rule::Respond(stdout.to_string()));
    }

    pub fn cancel_on(&self, pattern: &str, token: &CancellationToken) {
        self.push_rule(pattern, Rule::Cancel(token.clone()));
    }

    fn push_rule(&self, pattern: &str, rule: Rule) {
        self.rules.lock().unwrap().push((pattern.to_string(), rule));
    }

    /// Every command issued, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Commands issued over a tty.
    pub fn tty_commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tty)| *tty)
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Index of the first command containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    /// Number of commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    fn answer(&self, command: &str, tty: bool) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push((command.to_string(), tty));
        let rules = self.rules.lock().unwrap();
        let Some((_, rule)) = rules.iter().find(|(pattern, _)| command.contains(pattern.as_str()))
        else {
            return Ok(CommandOutput::success_with_stdout(""));
        };
        match rule {
            Rule::Fail(stderr) => Ok(CommandOutput {
                status: Some(1),
                stdout: Vec::new(),
                stderr: stderr.clone().into_bytes(),
            }),
            Rule::Error(message) => anyhow::bail!("{}", message),
            Rule::Respond(stdout) => Ok(CommandOutput::success_with_stdout(stdout.as_str())),
            Rule::Cancel(token) => {
                token.cancel();
                Ok(CommandOutput::success_with_stdout(""))
            }
        }
    }
}

impl CommandChannel for RecordingChannel {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.answer(command, false)
    }

    fn run_tty(&self, command: &str) -> Result<CommandOutput> {
        self.answer(command, true)
    }
}

/// Host driver with a fixed identity backed by a [`RecordingChannel`].
pub struct MockDriver {
    pub machine_name: String,
    pub driver_name: String,
    pub ip: Option<String>,
    pub channel: Arc<RecordingChannel>,
}

impl MockDriver {
    pub fn new(machine_name: &str, channel: &Arc<RecordingChannel>) -> Self {
        Self {
            machine_name: machine_name.to_string(),
            driver_name: "generic".to_string(),
            ip: Some("192.168.99.100".to_string()),
            channel: Arc::clone(channel),
        }
    }

    /// A driver whose address lookup fails.
    pub fn without_ip(mut self) -> Self {
        self.ip = None;
        self
    }

    pub fn shared(self) -> Arc<dyn HostDriver> {
        Arc::new(self)
    }
}

impl HostDriver for MockDriver {
    fn machine_name(&self) -> &str {
        &self.machine_name
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn ip_address(&self) -> Result<String> {
        self.ip
            .clone()
            .ok_or_else(|| anyhow::anyhow!("machine has no address yet"))
    }

    fn channel(&self) -> &dyn CommandChannel {
        self.channel.as_ref()
    }
}

/// Writes placeholder TLS material into `dir` and returns its path.
pub fn write_certs(dir: &Utf8Path) -> Utf8PathBuf {
    let certs = dir.join("certs");
    std::fs::create_dir_all(&certs).expect("failed to create certs dir");
    for name in ["ca.pem", "server.pem", "server-key.pem"] {
        std::fs::write(certs.join(name), format!("-----BEGIN {}-----\n", name))
            .expect("failed to write cert");
    }
    certs
}

/// Minimal valid profile body; `extra` is appended verbatim.
pub fn profile_yaml(extra: &str) -> String {
    format!(
        "---\n\
         machine:\n  name: node1\n\
         ssh:\n  host: 192.168.99.100\n\
         auth:\n  ca_cert_path: certs/ca.pem\n  \
         server_cert_path: certs/server.pem\n  \
         server_key_path: certs/server-key.pem\n\
         {}",
        extra
    )
}

/// Writes `yaml` as `profile.yml` in `dir` and returns its path.
pub fn write_profile(dir: &Utf8Path, yaml: &str) -> Utf8PathBuf {
    let path = dir.join("profile.yml");
    std::fs::write(&path, yaml).expect("failed to write profile");
    path
}

/// Writes certs and a profile into a fresh temp dir and loads it.
///
/// The temp dir is returned so the files outlive the call.
pub fn load_profile_from_yaml(yaml: &str) -> Result<(tempfile::TempDir, Profile)> {
    let dir = tempfile::tempdir()?;
    let base = Utf8Path::from_path(dir.path())
        .ok_or_else(|| anyhow::anyhow!("temp dir is not UTF-8"))?
        .to_path_buf();
    write_certs(&base);
    let path = write_profile(&base, yaml);
    let profile = load_profile(&path)?;
    Ok((dir, profile))
}

//! YAML profile describing one host to provision.

use std::fs::{self, File};
use std::io::BufReader;
use std::time::Duration;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use crate::auth::AuthOptions;
use crate::engine::EngineOptions;
use crate::error::RsprovisionError;
use crate::executor::SshConfig;
use crate::provision::{ProvisionOptions, validate_hostname};
use crate::swarm::SwarmOptions;
use crate::wait::WaitConfig;

/// Upper bound for every timeout a profile may set, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Identity of the machine being provisioned.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    /// Logical name, applied as the host's hostname
    pub name: String,
    /// Driver name, rendered into the `provider=` engine label
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_driver() -> String {
    "generic".to_string()
}

/// Engine readiness polling settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    3_000
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_interval_ms() -> u64 {
    30_000
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_secs: default_timeout_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl ReadinessConfig {
    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            backoff_multiplier: self.backoff_multiplier,
            max_interval: Duration::from_millis(self.max_interval_ms.max(self.interval_ms)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub machine: MachineConfig,
    pub ssh: SshConfig,
    #[serde(default)]
    pub engine: EngineOptions,
    pub auth: AuthOptions,
    #[serde(default)]
    pub swarm: SwarmOptions,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Skips detection and treats the host as this os-release `ID`
    #[serde(default)]
    pub os_id: Option<String>,
}

impl Profile {
    /// Resolves relative file paths against `base`.
    pub fn resolve_paths(&mut self, base: &Utf8Path) {
        self.auth.resolve_paths(base);
        if let Some(identity) = self.ssh.identity_file.as_mut() {
            if identity.is_relative() {
                *identity = base.join(&*identity);
            }
        }
    }

    /// Option bundles handed to the orchestrator.
    pub fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            engine: self.engine.clone(),
            auth: self.auth.clone(),
            swarm: self.swarm.clone(),
        }
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.readiness.wait_config()
    }

    /// Checks constraints serde cannot express.
    pub fn validate(&self) -> Result<(), RsprovisionError> {
        if validate_hostname(&self.machine.name).is_err() {
            return Err(RsprovisionError::Validation(format!(
                "machine.name is not a valid hostname: {:?}",
                self.machine.name
            )));
        }

        // The driver name is rendered into the engine options as a label.
        let driver = &self.machine.driver;
        if driver.is_empty()
            || !driver
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
        {
            return Err(RsprovisionError::Validation(format!(
                "machine.driver must contain only letters, digits, '_', '.' or '-': {:?}",
                driver
            )));
        }

        if self.ssh.host.trim().is_empty() {
            return Err(RsprovisionError::Validation("ssh.host must not be empty".to_string()));
        }
        if self.ssh.port == 0 {
            return Err(RsprovisionError::Validation("ssh.port must not be 0".to_string()));
        }
        validate_timeout("ssh.connect_timeout_secs", self.ssh.connect_timeout_secs)?;
        validate_timeout("ssh.command_timeout_secs", self.ssh.command_timeout_secs)?;
        if let Some(identity) = &self.ssh.identity_file {
            validate_file_exists(identity, "ssh identity file")?;
        }

        self.validate_engine()?;

        validate_file_exists(&self.auth.ca_cert_path, "CA certificate")?;
        validate_file_exists(&self.auth.server_cert_path, "server certificate")?;
        validate_file_exists(&self.auth.server_key_path, "server key")?;

        let readiness = &self.readiness;
        validate_timeout("readiness.timeout_secs", readiness.timeout_secs)?;
        if readiness.interval_ms == 0 {
            return Err(RsprovisionError::Validation(
                "readiness.interval_ms must be greater than 0".to_string(),
            ));
        }
        if readiness.interval_ms > readiness.timeout_secs.saturating_mul(1_000) {
            return Err(RsprovisionError::Validation(format!(
                "readiness.interval_ms ({}) exceeds readiness.timeout_secs ({})",
                readiness.interval_ms, readiness.timeout_secs
            )));
        }
        if readiness.backoff_multiplier.is_nan() || readiness.backoff_multiplier < 1.0 {
            return Err(RsprovisionError::Validation(format!(
                "readiness.backoff_multiplier must be at least 1.0, got {}",
                readiness.backoff_multiplier
            )));
        }

        if self.swarm.is_swarm {
            if self.swarm.discovery.trim().is_empty() {
                return Err(RsprovisionError::Validation(
                    "swarm.discovery is required when swarm is enabled".to_string(),
                ));
            }
            self.swarm.manager_port()?;
        }

        if self.os_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(RsprovisionError::Validation("os_id must not be empty".to_string()));
        }

        Ok(())
    }

    /// Engine values end up inside a single-quoted shell assignment, one
    /// per line.
    fn validate_engine(&self) -> Result<(), RsprovisionError> {
        let engine = &self.engine;
        if engine.port == 0 {
            return Err(RsprovisionError::Validation("engine.port must not be 0".to_string()));
        }
        if engine.storage_driver.trim().is_empty() {
            return Err(RsprovisionError::Validation(
                "engine.storage_driver must not be empty".to_string(),
            ));
        }

        let groups: [(&str, &[String]); 5] = [
            ("engine.storage_driver", std::slice::from_ref(&engine.storage_driver)),
            ("engine.labels", engine.labels.as_slice()),
            ("engine.insecure_registry", engine.insecure_registry.as_slice()),
            ("engine.registry_mirror", engine.registry_mirror.as_slice()),
            ("engine.arbitrary_flags", engine.arbitrary_flags.as_slice()),
        ];
        for (field, values) in groups {
            if let Some(bad) = values
                .iter()
                .find(|v| v.is_empty() || v.contains('\'') || v.contains('\n'))
            {
                return Err(RsprovisionError::Validation(format!(
                    "{} contains an empty value or a quote/newline: {:?}",
                    field, bad
                )));
            }
        }
        Ok(())
    }
}

fn validate_timeout(field: &str, secs: u64) -> Result<(), RsprovisionError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(RsprovisionError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            field, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(())
}

fn validate_file_exists(path: &Utf8Path, label: &str) -> Result<(), RsprovisionError> {
    let metadata = fs::metadata(path)
        .map_err(|e| RsprovisionError::io(format!("failed to read {}: {}", label, path), e))?;
    if !metadata.is_file() {
        return Err(RsprovisionError::Validation(format!("{} is not a file: {}", label, path)));
    }
    Ok(())
}

/// Loads a profile and resolves its relative paths against the profile's
/// directory.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, RsprovisionError> {
    let file = File::open(path)
        .map_err(|e| RsprovisionError::io(format!("failed to load file: {}", path), e))?;
    let reader = BufReader::new(file);
    let mut profile: Profile = serde_yaml::from_reader(reader)
        .map_err(|e| RsprovisionError::Config(format!("failed to parse yaml: {}: {}", path, e)))?;

    let base = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    profile.resolve_paths(base);
    debug!("loaded profile for machine {} from {}", profile.machine.name, path);
    Ok(profile)
}

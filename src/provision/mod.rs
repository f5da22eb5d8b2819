//! Provisioning strategies and the shared bootstrap machinery.
//!
//! A strategy is one OS family's answer to the [`Provisioner`] trait: how to
//! install packages, drive services, refresh package metadata, and open the
//! firewall on that family. Everything that does not depend on the family
//! (hostname handling, rendering, readiness probing) lives in provided trait
//! methods, and the ordered bootstrap sequence lives in [`orchestrator`].
//!
//! Adding a new OS family requires:
//! 1. Adding a variant to [`OsFamily`] and to [`OsFamily::ALL`]
//! 2. Creating a strategy module implementing [`Provisioner`]
//! 3. Returning its constructor from [`OsFamily::factory`]

pub mod centos;
pub mod orchestrator;
pub mod registry;
pub mod ubuntu;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use strum::{Display, EnumString};
use tracing::warn;

pub use centos::CentosProvisioner;
pub use orchestrator::{BootstrapStep, Orchestrator, RunState};
pub use registry::{ProvisionerFactory, ProvisionerRegistration, ProvisionerRegistry};
pub use ubuntu::UbuntuProvisioner;

use crate::auth::AuthOptions;
use crate::cancel::CancellationToken;
use crate::driver::HostDriver;
use crate::engine::{DockerOptions, EngineConfigContext, EngineOptions, OptionsFormat};
use crate::error::RsprovisionError;
use crate::executor::{CommandOutput, run_checked};
use crate::os_release::OsRelease;
use crate::pkgaction::{PackageAction, ServiceAction};
use crate::swarm::SwarmOptions;

/// Directory holding the engine's TLS material on every supported family.
pub const DOCKER_OPTIONS_DIR: &str = "/etc/docker";

/// Probe command used to decide whether the engine daemon is up.
pub const ENGINE_READY_COMMAND: &str = "sudo docker version";

const LABEL: &str = "[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?";

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{0}(\.{0})*$", LABEL)).expect("hostname pattern is valid")
});

/// Validates that `name` is an RFC 1123 hostname.
///
/// Hostnames are interpolated unquoted into remote commands, so anything
/// outside the hostname alphabet is rejected.
pub fn validate_hostname(name: &str) -> Result<(), RsprovisionError> {
    if name.len() > 253 || !HOSTNAME_RE.is_match(name) {
        return Err(RsprovisionError::Validation(format!("invalid hostname: {:?}", name)));
    }
    Ok(())
}

/// Built-in OS families, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OsFamily {
    Centos,
    Ubuntu,
}

impl OsFamily {
    /// Every built-in family, in registration order.
    pub const ALL: [OsFamily; 2] = [OsFamily::Centos, OsFamily::Ubuntu];

    /// The `ID` value from os-release this family matches exactly.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Centos => "centos",
            Self::Ubuntu => "ubuntu",
        }
    }

    /// Returns the constructor for this family's strategy.
    pub fn factory(&self) -> ProvisionerFactory {
        match self {
            Self::Centos => CentosProvisioner::boxed,
            Self::Ubuntu => UbuntuProvisioner::boxed,
        }
    }
}

/// Option bundles supplied to a provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    pub engine: EngineOptions,
    pub auth: AuthOptions,
    pub swarm: SwarmOptions,
}

/// State shared by every strategy.
///
/// Each strategy embeds one of these and exposes it through
/// [`Provisioner::core`]. The option bundles are inputs installed at the
/// start of a run, not state the strategy creates.
pub struct ProvisionerCore {
    driver: Arc<dyn HostDriver>,
    packages: Vec<String>,
    os_release: Option<OsRelease>,
    engine_options: EngineOptions,
    auth_options: AuthOptions,
    swarm_options: SwarmOptions,
    cancel: CancellationToken,
}

impl ProvisionerCore {
    pub fn new(driver: Arc<dyn HostDriver>, packages: Vec<String>) -> Self {
        Self {
            driver,
            packages,
            os_release: None,
            engine_options: EngineOptions::default(),
            auth_options: AuthOptions::default(),
            swarm_options: SwarmOptions::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Capability interface of a provisioning strategy.
///
/// Family-specific behavior is required; everything else is provided on top
/// of [`core()`](Self::core). External collaborators (engine installer,
/// auth and swarm configurators) receive a `&dyn Provisioner` and issue
/// commands through it.
pub trait Provisioner: Send {
    /// The OS family this strategy serves.
    fn family(&self) -> OsFamily;

    fn core(&self) -> &ProvisionerCore;

    fn core_mut(&mut self) -> &mut ProvisionerCore;

    /// Runs the family's package manager for `name`.
    fn package(&self, name: &str, action: PackageAction) -> Result<(), RsprovisionError>;

    /// Runs the family's init system for service `name`.
    fn service(&self, name: &str, action: ServiceAction) -> Result<(), RsprovisionError>;

    /// Rewrites privilege-escalation settings that break non-interactive use.
    fn fix_privilege_config(&self) -> Result<(), RsprovisionError>;

    /// Refreshes package metadata.
    fn update_packages(&self) -> Result<(), RsprovisionError>;

    /// Opens `port`/tcp in the host firewall, if the family runs one.
    fn configure_firewall(&self, port: u16) -> Result<(), RsprovisionError>;

    /// Where and how the rendered engine options are stored.
    fn options_format(&self) -> OptionsFormat;

    /// Returns true when the detected `ID` is exactly this family's id.
    fn compatible_with_host(&self) -> bool {
        self.core()
            .os_release
            .as_ref()
            .is_some_and(|release| release.id == self.family().id())
    }

    fn set_os_release(&mut self, info: OsRelease) {
        self.core_mut().os_release = Some(info);
    }

    fn os_release(&self) -> Option<&OsRelease> {
        self.core().os_release.as_ref()
    }

    fn driver(&self) -> &dyn HostDriver {
        self.core().driver.as_ref()
    }

    /// Baseline packages installed before the engine.
    fn packages(&self) -> &[String] {
        &self.core().packages
    }

    fn engine_options(&self) -> &EngineOptions {
        &self.core().engine_options
    }

    fn auth_options(&self) -> &AuthOptions {
        &self.core().auth_options
    }

    fn set_auth_options(&mut self, options: AuthOptions) {
        self.core_mut().auth_options = options;
    }

    fn swarm_options(&self) -> &SwarmOptions {
        &self.core().swarm_options
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.core().cancel
    }

    /// Installs the run's option bundles and cancellation token.
    fn install_options(&mut self, options: ProvisionOptions, cancel: CancellationToken) {
        let core = self.core_mut();
        core.engine_options = options.engine;
        core.auth_options = options.auth;
        core.swarm_options = options.swarm;
        core.cancel = cancel;
    }

    /// Runs a command on the host, failing on non-zero exit.
    fn ssh_command(&self, command: &str) -> Result<CommandOutput, RsprovisionError> {
        run_checked(self.driver().channel(), self.cancellation(), command, false)
    }

    /// Like [`ssh_command`](Self::ssh_command) but with a remote tty.
    fn ssh_command_tty(&self, command: &str) -> Result<CommandOutput, RsprovisionError> {
        run_checked(self.driver().channel(), self.cancellation(), command, true)
    }

    /// Returns the host's current hostname.
    fn hostname(&self) -> Result<String, RsprovisionError> {
        let output = self.ssh_command("hostname")?;
        Ok(output.stdout_string().trim_end().to_string())
    }

    /// Sets the hostname now, persists it, and maps it to the loopback address.
    ///
    /// The `/etc/hosts` entry is appended only when the name is not already
    /// on the `127.0.0.1` line, so repeated runs leave the file unchanged.
    fn set_hostname(&self, hostname: &str) -> Result<(), RsprovisionError> {
        validate_hostname(hostname)?;

        self.ssh_command(&format!(
            "sudo hostname {0} && echo \"{0}\" | sudo tee /etc/hostname",
            hostname
        ))?;

        let pattern = format!(
            "^127\\.0\\.0\\.1.*[[:space:]]{}([[:space:]]|$)",
            hostname.replace('.', "\\.")
        );
        self.ssh_command(&format!(
            "grep -qE '{}' /etc/hosts || sudo sed -i '/^127.0.0.1/ s/$/ {}/' /etc/hosts",
            pattern, hostname
        ))?;

        Ok(())
    }

    /// Directory created on the host for the engine's TLS material.
    fn docker_options_dir(&self) -> &'static str {
        DOCKER_OPTIONS_DIR
    }

    /// Renders the engine options for `port` with the current option bundles.
    ///
    /// `provider=<driver name>` is appended to a copy of the labels, so the
    /// stored options are not modified and repeated calls render identically.
    fn generate_docker_options(&self, port: u16) -> DockerOptions {
        let mut engine_options = self.engine_options().clone();
        engine_options
            .labels
            .push(format!("provider={}", self.driver().driver_name()));

        let ctx = EngineConfigContext {
            docker_port: port,
            auth_options: self.auth_options(),
            engine_options: &engine_options,
        };
        crate::engine::render_docker_options(&ctx, self.options_format())
    }

    /// Readiness probe: true once `sudo docker version` succeeds.
    fn docker_daemon_responding(&self) -> bool {
        match self.ssh_command(ENGINE_READY_COMMAND) {
            Ok(_) => true,
            Err(e) => {
                warn!("engine not responding yet: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn valid_hostnames() {
        for name in ["node1", "docker-host-01", "a.b.example.com", "x"] {
            assert!(validate_hostname(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn invalid_hostnames() {
        for name in ["", "-lead", "trail-", "has space", "semi;colon", "a..b", "$(reboot)"] {
            assert!(validate_hostname(name).is_err(), "{:?} should be invalid", name);
        }
    }

    #[test]
    fn family_ids_and_names() {
        assert_eq!(OsFamily::Centos.id(), "centos");
        assert_eq!(OsFamily::Ubuntu.to_string(), "ubuntu");
        assert_eq!(OsFamily::from_str("Centos").unwrap(), OsFamily::Centos);
        assert!(OsFamily::from_str("arch").is_err());
    }
}

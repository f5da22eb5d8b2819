//! The fixed bootstrap sequence shared by every strategy.
//!
//! The orchestrator runs [`BootstrapStep::ALL`] in order against one
//! provisioner. Each step depends on host state left by the previous one,
//! so the first failure ends the run; nothing is rolled back and a failed
//! run is never resumed. Every step is idempotent, so starting over from
//! step 1 is safe.

use strum::Display;
use tracing::{debug, info};

use super::{ProvisionOptions, Provisioner};
use crate::auth::{AuthConfigurator, TlsAuthConfigurator, resolve_remote_auth_options};
use crate::cancel::CancellationToken;
use crate::engine::{EngineInstaller, GenericEngineInstaller};
use crate::error::RsprovisionError;
use crate::pkgaction::PackageAction;
use crate::swarm::{DockerSwarmConfigurator, SwarmConfigurator};
use crate::wait::{WaitConfig, wait_for};

/// One step of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BootstrapStep {
    #[strum(to_string = "fix privilege config")]
    FixPrivilegeConfig,
    #[strum(to_string = "set hostname")]
    SetHostname,
    #[strum(to_string = "update packages")]
    UpdatePackages,
    #[strum(to_string = "install packages")]
    InstallPackages,
    #[strum(to_string = "configure firewall")]
    ConfigureFirewall,
    #[strum(to_string = "install engine")]
    InstallEngine,
    #[strum(to_string = "wait for engine")]
    WaitForEngine,
    #[strum(to_string = "make options dir")]
    MakeOptionsDir,
    #[strum(to_string = "resolve auth options")]
    ResolveAuthOptions,
    #[strum(to_string = "configure auth")]
    ConfigureAuth,
    #[strum(to_string = "configure swarm")]
    ConfigureSwarm,
}

impl BootstrapStep {
    /// Every step, in execution order.
    pub const ALL: [BootstrapStep; 11] = [
        BootstrapStep::FixPrivilegeConfig,
        BootstrapStep::SetHostname,
        BootstrapStep::UpdatePackages,
        BootstrapStep::InstallPackages,
        BootstrapStep::ConfigureFirewall,
        BootstrapStep::InstallEngine,
        BootstrapStep::WaitForEngine,
        BootstrapStep::MakeOptionsDir,
        BootstrapStep::ResolveAuthOptions,
        BootstrapStep::ConfigureAuth,
        BootstrapStep::ConfigureSwarm,
    ];

    /// 1-based position in [`BootstrapStep::ALL`].
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|step| step == self)
            .map_or(0, |pos| pos + 1)
    }
}

/// Progress of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running(BootstrapStep),
    Succeeded,
    Failed(BootstrapStep),
}

/// Drives a provisioner through the bootstrap sequence.
pub struct Orchestrator {
    installer: Box<dyn EngineInstaller>,
    auth: Box<dyn AuthConfigurator>,
    swarm: Box<dyn SwarmConfigurator>,
    wait: WaitConfig,
    cancel: CancellationToken,
    state: RunState,
}

impl Orchestrator {
    /// Creates an orchestrator with the built-in collaborators.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            installer: Box::new(GenericEngineInstaller),
            auth: Box::new(TlsAuthConfigurator),
            swarm: Box::new(DockerSwarmConfigurator),
            wait: WaitConfig::default(),
            cancel,
            state: RunState::NotStarted,
        }
    }

    pub fn with_engine_installer(mut self, installer: Box<dyn EngineInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_auth_configurator(mut self, auth: Box<dyn AuthConfigurator>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_swarm_configurator(mut self, swarm: Box<dyn SwarmConfigurator>) -> Self {
        self.swarm = swarm;
        self
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs every bootstrap step against `provisioner`.
    ///
    /// The option bundles and this orchestrator's cancellation token are
    /// installed on the provisioner first.
    ///
    /// # Errors
    ///
    /// Returns [`RsprovisionError::Step`] wrapping the first step failure.
    /// A raised cancellation token fails the next step with
    /// [`RsprovisionError::Cancelled`] as its source.
    pub fn provision(
        &mut self,
        provisioner: &mut dyn Provisioner,
        options: ProvisionOptions,
    ) -> Result<(), RsprovisionError> {
        provisioner.install_options(options, self.cancel.clone());

        info!(
            "provisioning {} as {}",
            provisioner.driver().machine_name(),
            provisioner.family()
        );

        for step in BootstrapStep::ALL {
            self.state = RunState::Running(step);
            info!("running step {}/{}: {}", step.index(), BootstrapStep::ALL.len(), step);

            let result = self
                .cancel
                .check()
                .and_then(|()| self.run_step(step, provisioner));

            if let Err(e) = result {
                self.state = RunState::Failed(step);
                return Err(RsprovisionError::Step {
                    index: step.index(),
                    step,
                    source: Box::new(e),
                });
            }
            debug!("step {} completed", step);
        }

        self.state = RunState::Succeeded;
        info!("provisioning completed successfully");
        Ok(())
    }

    fn run_step(
        &self,
        step: BootstrapStep,
        provisioner: &mut dyn Provisioner,
    ) -> Result<(), RsprovisionError> {
        match step {
            BootstrapStep::FixPrivilegeConfig => provisioner.fix_privilege_config(),
            BootstrapStep::SetHostname => {
                let hostname = provisioner.driver().machine_name().to_string();
                provisioner.set_hostname(&hostname)
            }
            BootstrapStep::UpdatePackages => provisioner.update_packages(),
            BootstrapStep::InstallPackages => {
                for package in provisioner.packages() {
                    provisioner.package(package, PackageAction::Install)?;
                }
                Ok(())
            }
            BootstrapStep::ConfigureFirewall => {
                provisioner.configure_firewall(provisioner.engine_options().port)
            }
            BootstrapStep::InstallEngine => self.installer.install_engine(&*provisioner),
            BootstrapStep::WaitForEngine => {
                wait_for(&self.wait, &self.cancel, || provisioner.docker_daemon_responding())
            }
            BootstrapStep::MakeOptionsDir => {
                let command = format!("sudo mkdir -p {}", provisioner.docker_options_dir());
                provisioner.ssh_command(&command).map(|_| ())
            }
            BootstrapStep::ResolveAuthOptions => {
                let resolved = resolve_remote_auth_options(&*provisioner)?;
                provisioner.set_auth_options(resolved);
                Ok(())
            }
            BootstrapStep::ConfigureAuth => {
                let auth = provisioner.auth_options().clone();
                self.auth.configure_auth(&*provisioner, &auth)
            }
            BootstrapStep::ConfigureSwarm => {
                let swarm = provisioner.swarm_options().clone();
                self.swarm.configure_swarm(&*provisioner, &swarm)
            }
        }
    }
}

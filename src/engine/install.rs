//! Engine installation shared by every strategy.

use tracing::info;

use crate::error::RsprovisionError;
use crate::executor::shell_quote;
use crate::pkgaction::ServiceAction;
use crate::provision::Provisioner;

/// Installs the container engine using a provisioner as the command handle.
pub trait EngineInstaller: Send + Sync {
    fn install_engine(&self, provisioner: &dyn Provisioner) -> Result<(), RsprovisionError>;
}

/// Runs the upstream install script unless `docker` is already present, then
/// starts the service.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericEngineInstaller;

impl GenericEngineInstaller {
    pub fn install_command(install_url: &str) -> String {
        format!(
            "if ! type docker; then curl -sSL {} | sh -; fi",
            shell_quote(install_url)
        )
    }
}

impl EngineInstaller for GenericEngineInstaller {
    fn install_engine(&self, provisioner: &dyn Provisioner) -> Result<(), RsprovisionError> {
        let url = &provisioner.engine_options().install_url;
        info!("installing engine from {}", url);
        provisioner.ssh_command(&Self::install_command(url))?;
        provisioner.service("docker", ServiceAction::Start)
    }
}

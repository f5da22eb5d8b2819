//! Debian family strategy (apt-get, upstart/SysV `service`).

use std::sync::Arc;

use tracing::info;

use super::{OsFamily, Provisioner, ProvisionerCore};
use crate::driver::HostDriver;
use crate::engine::OptionsFormat;
use crate::error::RsprovisionError;
use crate::executor::shell_quote;
use crate::pkgaction::{PackageAction, ServiceAction};

/// Engine options location read by the Ubuntu init script.
pub const UBUNTU_OPTIONS_FORMAT: OptionsFormat = OptionsFormat {
    variable: "DOCKER_OPTS",
    remote_path: "/etc/default/docker",
};

const APT_GET: &str = "sudo DEBIAN_FRONTEND=noninteractive apt-get -y";

pub struct UbuntuProvisioner {
    core: ProvisionerCore,
}

impl UbuntuProvisioner {
    pub fn new(driver: Arc<dyn HostDriver>) -> Self {
        Self {
            core: ProvisionerCore::new(driver, vec!["curl".to_string()]),
        }
    }

    pub fn boxed(driver: Arc<dyn HostDriver>) -> Box<dyn Provisioner> {
        Box::new(Self::new(driver))
    }
}

impl Provisioner for UbuntuProvisioner {
    fn family(&self) -> OsFamily {
        OsFamily::Ubuntu
    }

    fn core(&self) -> &ProvisionerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProvisionerCore {
        &mut self.core
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<(), RsprovisionError> {
        let verb = match action {
            PackageAction::Install | PackageAction::Remove => action.as_ref(),
            PackageAction::Upgrade => {
                return Err(RsprovisionError::UnsupportedAction {
                    family: self.family().to_string(),
                    action: format!("package {}", action),
                });
            }
        };
        info!("{} package {} via apt-get", verb, name);
        self.ssh_command(&format!("{} {} {}", APT_GET, verb, shell_quote(name)))?;
        Ok(())
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), RsprovisionError> {
        let command = if action.is_boot_config() {
            format!("sudo update-rc.d {} {}", name, action)
        } else {
            format!("sudo service {} {}", name, action)
        };
        self.ssh_command(&command)?;
        Ok(())
    }

    /// Ubuntu's default sudoers works without a tty.
    fn fix_privilege_config(&self) -> Result<(), RsprovisionError> {
        Ok(())
    }

    fn update_packages(&self) -> Result<(), RsprovisionError> {
        info!("refreshing apt metadata");
        self.ssh_command(&format!("{} update", APT_GET))?;
        Ok(())
    }

    /// No host firewall is managed on Ubuntu.
    fn configure_firewall(&self, _port: u16) -> Result<(), RsprovisionError> {
        Ok(())
    }

    fn options_format(&self) -> OptionsFormat {
        UBUNTU_OPTIONS_FORMAT
    }
}

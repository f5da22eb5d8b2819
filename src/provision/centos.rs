//! Red Hat family strategy (yum, SysV `service`, firewalld).

use std::sync::Arc;

use tracing::info;

use super::{OsFamily, Provisioner, ProvisionerCore};
use crate::driver::HostDriver;
use crate::engine::OptionsFormat;
use crate::error::RsprovisionError;
use crate::executor::shell_quote;
use crate::pkgaction::{PackageAction, ServiceAction};

/// Engine options location read by the CentOS init script.
pub const CENTOS_OPTIONS_FORMAT: OptionsFormat = OptionsFormat {
    variable: "OPTIONS",
    remote_path: "/etc/sysconfig/docker",
};

const FIREWALLD_SERVICE_PATH: &str = "/etc/firewalld/services/docker.xml";
const FIREWALLD_ZONE_PATH: &str = "/etc/firewalld/zones/public.xml";

/// Comments out `Defaults requiretty` so sudo works without a terminal.
///
/// Must run over a tty: until this edit lands, sudo refuses to start
/// without one.
const REQUIRETTY_FIX_COMMAND: &str = "sudo sed -i \
    's/^Defaults.*requiretty$/#\\ commented\\ out\\ by\\ rsprovision\\n#Defaults\\ \\ \\ \\ requiretty/g' \
    /etc/sudoers";

pub struct CentosProvisioner {
    core: ProvisionerCore,
}

impl CentosProvisioner {
    pub fn new(driver: Arc<dyn HostDriver>) -> Self {
        Self {
            core: ProvisionerCore::new(driver, vec!["curl".to_string()]),
        }
    }

    pub fn boxed(driver: Arc<dyn HostDriver>) -> Box<dyn Provisioner> {
        Box::new(Self::new(driver))
    }
}

fn firewalld_service_xml(port: u16) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <service>\n  \
         <short>Docker</short>\n  \
         <description>Docker engine TLS listener</description>\n  \
         <port protocol=\"tcp\" port=\"{}\"/>\n\
         </service>\n",
        port
    )
}

impl Provisioner for CentosProvisioner {
    fn family(&self) -> OsFamily {
        OsFamily::Centos
    }

    fn core(&self) -> &ProvisionerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProvisionerCore {
        &mut self.core
    }

    fn package(&self, name: &str, action: PackageAction) -> Result<(), RsprovisionError> {
        info!("{} package {} via yum", action, name);
        self.ssh_command(&format!("sudo -E yum -y {} {}", action, shell_quote(name)))?;
        Ok(())
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), RsprovisionError> {
        let command = if action.is_boot_config() {
            format!("sudo systemctl {} {}", action, name)
        } else {
            format!("sudo service {} {}", name, action)
        };
        self.ssh_command(&command)?;
        Ok(())
    }

    fn fix_privilege_config(&self) -> Result<(), RsprovisionError> {
        self.ssh_command_tty(REQUIRETTY_FIX_COMMAND)?;
        Ok(())
    }

    fn update_packages(&self) -> Result<(), RsprovisionError> {
        info!("refreshing yum metadata");
        self.ssh_command("sudo -E yum -y update")?;
        Ok(())
    }

    /// Declares a firewalld service for `port`, adds it to the public zone
    /// once, and restarts firewalld.
    fn configure_firewall(&self, port: u16) -> Result<(), RsprovisionError> {
        let xml = shell_quote(&firewalld_service_xml(port));
        let command = format!(
            "printf '%s' {xml} | sudo tee {svc} >/dev/null && \
             (sudo grep -q '<service name=\"docker\"/>' {zone} || \
             sudo sed -i 's/<\\/zone>/  <service name=\"docker\"\\/>\\n<\\/zone>/g' {zone}) && \
             sudo service firewalld restart",
            xml = xml,
            svc = FIREWALLD_SERVICE_PATH,
            zone = FIREWALLD_ZONE_PATH,
        );
        self.ssh_command(&command)?;
        Ok(())
    }

    fn options_format(&self) -> OptionsFormat {
        CENTOS_OPTIONS_FORMAT
    }
}

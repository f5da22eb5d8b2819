//! Host driver abstraction.
//!
//! A driver identifies the machine being provisioned and hands out the
//! [`CommandChannel`] used to reach it. VM/cloud lifecycle is not part of
//! this interface.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::executor::CommandChannel;

/// Trait for host drivers.
pub trait HostDriver: Send + Sync {
    /// Returns the logical machine name, used as the host's hostname.
    fn machine_name(&self) -> &str;

    /// Returns the driver's name, rendered into the `provider=` engine label.
    fn driver_name(&self) -> &str;

    /// Returns the address other machines use to reach this host.
    fn ip_address(&self) -> Result<String>;

    /// Returns the command channel to the host.
    fn channel(&self) -> &dyn CommandChannel;
}

/// Driver for an already running host reachable over SSH.
pub struct GenericDriver {
    machine_name: String,
    driver_name: String,
    address: String,
    ssh_port: u16,
    resolve: bool,
    channel: Arc<dyn CommandChannel>,
}

impl GenericDriver {
    pub fn new(
        machine_name: impl Into<String>,
        driver_name: impl Into<String>,
        address: impl Into<String>,
        ssh_port: u16,
        channel: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            machine_name: machine_name.into(),
            driver_name: driver_name.into(),
            address: address.into(),
            ssh_port,
            resolve: true,
            channel,
        }
    }

    /// Reports the configured address verbatim instead of resolving it.
    /// Used for dry runs, where the host may not exist yet.
    pub fn without_resolution(mut self) -> Self {
        self.resolve = false;
        self
    }
}

impl HostDriver for GenericDriver {
    fn machine_name(&self) -> &str {
        &self.machine_name
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Returns the configured address if it is an IP literal, otherwise the
    /// first address it resolves to.
    fn ip_address(&self) -> Result<String> {
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(ip.to_string());
        }
        if !self.resolve {
            return Ok(self.address.clone());
        }
        let mut addrs = (self.address.as_str(), self.ssh_port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve host address: {}", self.address))?;
        addrs
            .next()
            .map(|addr| addr.ip().to_string())
            .with_context(|| format!("host address resolved to nothing: {}", self.address))
    }

    fn channel(&self) -> &dyn CommandChannel {
        self.channel.as_ref()
    }
}

//! Cluster membership via swarm agent containers.

use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::RsprovisionError;
use crate::executor::shell_quote;
use crate::provision::Provisioner;

pub const SWARM_MASTER_CONTAINER: &str = "swarm-agent-master";
pub const SWARM_AGENT_CONTAINER: &str = "swarm-agent";

/// Swarm membership settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SwarmOptions {
    #[serde(default, rename = "enabled")]
    pub is_swarm: bool,
    /// Run the manager on this host as well as the agent
    #[serde(default)]
    pub master: bool,
    /// Discovery URL shared by every member (e.g. `token://...`)
    #[serde(default)]
    pub discovery: String,
    /// Listen address of the manager
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_image")]
    pub image: String,
}

fn default_host() -> String {
    "tcp://0.0.0.0:3376".to_string()
}

fn default_image() -> String {
    "swarm:latest".to_string()
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self {
            is_swarm: false,
            master: false,
            discovery: String::new(),
            host: default_host(),
            image: default_image(),
        }
    }
}

impl SwarmOptions {
    /// Port the manager listens on, taken from [`host`](Self::host).
    pub fn manager_port(&self) -> Result<u16, RsprovisionError> {
        let url = Url::parse(&self.host).map_err(|e| {
            RsprovisionError::Validation(format!("invalid swarm host {:?}: {}", self.host, e))
        })?;
        url.port().ok_or_else(|| {
            RsprovisionError::Validation(format!("swarm host has no port: {}", self.host))
        })
    }
}

/// Joins the host to a cluster.
pub trait SwarmConfigurator: Send + Sync {
    fn configure_swarm(
        &self,
        provisioner: &dyn Provisioner,
        swarm: &SwarmOptions,
    ) -> Result<(), RsprovisionError>;
}

/// Runs the swarm manager and agent as engine containers.
///
/// Containers left by an earlier run are removed before being started
/// again, so re-provisioning converges on the same two containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerSwarmConfigurator;

fn remove_container_command(name: &str) -> String {
    format!("sudo docker rm -f {} >/dev/null 2>&1 || true", name)
}

impl SwarmConfigurator for DockerSwarmConfigurator {
    fn configure_swarm(
        &self,
        provisioner: &dyn Provisioner,
        swarm: &SwarmOptions,
    ) -> Result<(), RsprovisionError> {
        if !swarm.is_swarm {
            return Ok(());
        }

        let auth = provisioner.auth_options();
        let ip = match &auth.remote_ip {
            Some(ip) => ip.clone(),
            None => provisioner
                .driver()
                .ip_address()
                .map_err(|e| RsprovisionError::Driver(format!("{:#}", e)))?,
        };
        let engine_port = provisioner.engine_options().port;
        let discovery = shell_quote(&swarm.discovery);
        let image = shell_quote(&swarm.image);
        let dir = provisioner.docker_options_dir();

        info!("pulling swarm image {}", swarm.image);
        provisioner.ssh_command(&format!("sudo docker pull {}", image))?;

        if swarm.master {
            let port = swarm.manager_port()?;
            info!("starting swarm manager on port {}", port);
            provisioner.ssh_command(&remove_container_command(SWARM_MASTER_CONTAINER))?;
            provisioner.ssh_command(&format!(
                "sudo docker run -d --restart=always --name {name} -p {port}:{port} \
                 -v {dir}:{dir} {image} manage --tlsverify --tlscacert={ca} \
                 --tlscert={cert} --tlskey={key} -H {host} {discovery}",
                name = SWARM_MASTER_CONTAINER,
                port = port,
                dir = dir,
                image = image,
                ca = shell_quote(&auth.ca_cert_remote_path),
                cert = shell_quote(&auth.server_cert_remote_path),
                key = shell_quote(&auth.server_key_remote_path),
                host = shell_quote(&swarm.host),
                discovery = discovery,
            ))?;
        }

        info!("joining swarm as {}:{}", ip, engine_port);
        provisioner.ssh_command(&remove_container_command(SWARM_AGENT_CONTAINER))?;
        provisioner.ssh_command(&format!(
            "sudo docker run -d --restart=always --name {} {} join --addr {}:{} {}",
            SWARM_AGENT_CONTAINER, image, ip, engine_port, discovery
        ))?;

        Ok(())
    }
}

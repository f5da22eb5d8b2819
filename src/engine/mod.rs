//! Container engine options, rendering, and installation.

pub mod install;
pub mod options;

use serde::Deserialize;

pub use install::{EngineInstaller, GenericEngineInstaller};
pub use options::{DockerOptions, EngineConfigContext, OptionsFormat, render_docker_options};

/// Default TCP port the engine listens on with TLS.
pub const DEFAULT_ENGINE_PORT: u16 = 2376;

/// Structured engine daemon options.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    /// TCP port for the TLS listener
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_storage_driver")]
    pub storage_driver: String,
    /// `key=value` labels, in order
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub insecure_registry: Vec<String>,
    #[serde(default)]
    pub registry_mirror: Vec<String>,
    /// Extra daemon flags without the leading `--`
    #[serde(default)]
    pub arbitrary_flags: Vec<String>,
    /// URL of the install script fetched by the generic installer
    #[serde(default = "default_install_url")]
    pub install_url: String,
}

fn default_port() -> u16 {
    DEFAULT_ENGINE_PORT
}

fn default_storage_driver() -> String {
    "aufs".to_string()
}

fn default_install_url() -> String {
    "https://get.docker.com".to_string()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
            storage_driver: default_storage_driver(),
            labels: Vec::new(),
            insecure_registry: Vec::new(),
            registry_mirror: Vec::new(),
            arbitrary_flags: Vec::new(),
            install_url: default_install_url(),
        }
    }
}

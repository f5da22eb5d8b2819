//! TLS material for the engine's remote API.
//!
//! [`AuthOptions`] carries the local certificate paths from the profile and,
//! once [`resolve_remote_auth_options`] has run against a live host, the
//! paths those files occupy on the host plus the host's address.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::info;

use crate::error::RsprovisionError;
use crate::executor::remote_write_command;
use crate::pkgaction::ServiceAction;
use crate::provision::Provisioner;

const CA_CERT_FILE: &str = "ca.pem";
const SERVER_CERT_FILE: &str = "server.pem";
const SERVER_KEY_FILE: &str = "server-key.pem";

/// Certificate locations, local and remote.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthOptions {
    /// CA certificate on the machine running rsprovision
    pub ca_cert_path: Utf8PathBuf,
    pub server_cert_path: Utf8PathBuf,
    pub server_key_path: Utf8PathBuf,
    #[serde(skip)]
    pub ca_cert_remote_path: String,
    #[serde(skip)]
    pub server_cert_remote_path: String,
    #[serde(skip)]
    pub server_key_remote_path: String,
    /// Address of the host, filled in during resolution
    #[serde(skip)]
    pub remote_ip: Option<String>,
}

impl AuthOptions {
    /// Resolves relative local paths against `base`.
    pub fn resolve_paths(&mut self, base: &Utf8Path) {
        for path in [
            &mut self.ca_cert_path,
            &mut self.server_cert_path,
            &mut self.server_key_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Local and remote path pairs, certificates first.
    fn uploads(&self) -> [(&Utf8Path, &str, u32); 3] {
        [
            (self.ca_cert_path.as_path(), self.ca_cert_remote_path.as_str(), 0o644),
            (self.server_cert_path.as_path(), self.server_cert_remote_path.as_str(), 0o644),
            (self.server_key_path.as_path(), self.server_key_remote_path.as_str(), 0o600),
        ]
    }
}

/// Returns the provisioner's auth options with host-side paths filled in.
///
/// Remote paths live under [`Provisioner::docker_options_dir`]; the address
/// comes from the host driver.
pub fn resolve_remote_auth_options(
    provisioner: &dyn Provisioner,
) -> Result<AuthOptions, RsprovisionError> {
    let dir = provisioner.docker_options_dir();
    let mut auth = provisioner.auth_options().clone();
    auth.ca_cert_remote_path = format!("{}/{}", dir, CA_CERT_FILE);
    auth.server_cert_remote_path = format!("{}/{}", dir, SERVER_CERT_FILE);
    auth.server_key_remote_path = format!("{}/{}", dir, SERVER_KEY_FILE);

    let ip = provisioner
        .driver()
        .ip_address()
        .map_err(|e| RsprovisionError::Driver(format!("{:#}", e)))?;
    auth.remote_ip = Some(ip);
    Ok(auth)
}

/// Installs TLS material and the engine configuration that references it.
pub trait AuthConfigurator: Send + Sync {
    fn configure_auth(
        &self,
        provisioner: &dyn Provisioner,
        auth: &AuthOptions,
    ) -> Result<(), RsprovisionError>;
}

/// Uploads the certificates, writes the rendered engine options, and
/// restarts the engine so it comes back with TLS enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsAuthConfigurator;

impl AuthConfigurator for TlsAuthConfigurator {
    fn configure_auth(
        &self,
        provisioner: &dyn Provisioner,
        auth: &AuthOptions,
    ) -> Result<(), RsprovisionError> {
        for (local, remote, mode) in auth.uploads() {
            let content = fs::read_to_string(local)
                .map_err(|e| RsprovisionError::io(format!("failed to read {}", local), e))?;
            info!("copying {} to {}", local, remote);
            provisioner.ssh_command(&remote_write_command(remote, &content, mode))?;
        }

        let options = provisioner.generate_docker_options(provisioner.engine_options().port);
        info!("writing engine options to {}", options.remote_path);
        provisioner.ssh_command(&remote_write_command(
            &options.remote_path,
            &options.content,
            0o644,
        ))?;

        provisioner.service("docker", ServiceAction::Restart)
    }
}

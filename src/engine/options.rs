//! Rendering of the engine daemon's startup configuration.
//!
//! The rendered text is a shell-style variable assignment holding one daemon
//! flag per line, consumed by the host's init scripts when the engine starts.
//! Rendering is pure: identical inputs produce byte-identical output.

use super::EngineOptions;
use crate::auth::AuthOptions;

/// Unix socket the engine always listens on.
pub const DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";

/// Family-specific shape of the rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsFormat {
    /// Shell variable the init script reads (e.g. `OPTIONS`, `DOCKER_OPTS`)
    pub variable: &'static str,
    /// Absolute path the artifact is written to on the host
    pub remote_path: &'static str,
}

/// Rendered engine configuration and where it belongs on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOptions {
    pub content: String,
    pub remote_path: String,
}

/// Inputs to a single rendering.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfigContext<'a> {
    pub docker_port: u16,
    pub auth_options: &'a AuthOptions,
    pub engine_options: &'a EngineOptions,
}

/// Builder collecting one daemon flag per line.
#[derive(Debug, Default)]
struct OptionLines {
    lines: Vec<String>,
}

impl OptionLines {
    /// Append a flag with no value.
    fn push_flag(&mut self, flag: &str) {
        self.lines.push(flag.to_string());
    }

    /// Append a flag and its value on one line.
    fn push_flag_value(&mut self, flag: &str, value: &str) {
        self.lines.push(format!("{} {}", flag, value));
    }

    /// Append `flag value` for each element of `values`, in order.
    /// An empty slice appends nothing.
    fn push_flag_values(&mut self, flag: &str, values: &[String]) {
        for value in values {
            self.push_flag_value(flag, value);
        }
    }

    fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Renders the engine options for `format`.
///
/// Layout: listen addresses (TCP port, then the unix socket), the storage
/// driver, the TLS flags, then the repeated groups: labels, insecure
/// registries, registry mirrors, and arbitrary flags. Each element of a
/// group becomes one flag line in input order; an empty group is omitted.
pub fn render_docker_options(
    ctx: &EngineConfigContext<'_>,
    format: OptionsFormat,
) -> DockerOptions {
    let engine = ctx.engine_options;
    let auth = ctx.auth_options;

    let mut builder = OptionLines::default();
    builder.push_flag_value("-H", &format!("tcp://0.0.0.0:{}", ctx.docker_port));
    builder.push_flag_value("-H", DOCKER_SOCKET);
    builder.push_flag_value("--storage-driver", &engine.storage_driver);
    builder.push_flag("--tlsverify");
    builder.push_flag_value("--tlscacert", &auth.ca_cert_remote_path);
    builder.push_flag_value("--tlscert", &auth.server_cert_remote_path);
    builder.push_flag_value("--tlskey", &auth.server_key_remote_path);
    builder.push_flag_values("--label", &engine.labels);
    builder.push_flag_values("--insecure-registry", &engine.insecure_registry);
    builder.push_flag_values("--registry-mirror", &engine.registry_mirror);
    for flag in &engine.arbitrary_flags {
        builder.push_flag(&format!("--{}", flag));
    }

    let body: String = builder
        .into_lines()
        .into_iter()
        .map(|line| line + "\n")
        .collect();

    DockerOptions {
        content: format!("\n{}='\n{}\n'\n", format.variable, body),
        remote_path: format.remote_path.to_string(),
    }
}

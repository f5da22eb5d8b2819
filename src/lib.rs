pub mod auth;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod os_release;
pub mod pkgaction;
pub mod provision;
pub mod swarm;
pub mod wait;

pub use error::RsprovisionError;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::cancel::CancellationToken;
use crate::config::Profile;
use crate::driver::{GenericDriver, HostDriver};
use crate::executor::SshCommandChannel;
use crate::os_release::{OsRelease, detect_os_release};
use crate::provision::{Orchestrator, ProvisionerRegistry};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Builds the SSH-backed driver for the profile's host.
pub fn build_driver(
    profile: &Profile,
    cancel: &CancellationToken,
    dry_run: bool,
) -> Arc<dyn HostDriver> {
    let channel = SshCommandChannel::new(profile.ssh.clone(), dry_run, cancel.clone());
    let driver = GenericDriver::new(
        profile.machine.name.clone(),
        profile.machine.driver.clone(),
        profile.ssh.host.clone(),
        profile.ssh.port,
        Arc::new(channel),
    );
    if dry_run {
        Arc::new(driver.without_resolution())
    } else {
        Arc::new(driver)
    }
}

/// Returns the host's os-release, or the profile's `os_id` override.
pub fn detect_host(
    profile: &Profile,
    driver: &dyn HostDriver,
    cancel: &CancellationToken,
) -> Result<OsRelease, RsprovisionError> {
    match &profile.os_id {
        Some(id) => {
            info!("using os id {} from profile", id);
            Ok(OsRelease::from_id(id))
        }
        None => detect_os_release(driver.channel(), cancel),
    }
}

/// Detects the host, selects a strategy from `registry`, and runs the full
/// bootstrap sequence.
pub fn provision_host(
    profile: &Profile,
    registry: &ProvisionerRegistry,
    driver: Arc<dyn HostDriver>,
    cancel: &CancellationToken,
) -> Result<(), RsprovisionError> {
    let os_release = detect_host(profile, driver.as_ref(), cancel)?;
    info!("detected host os: {}", os_release.display_name());

    let mut provisioner = registry.select(driver, &os_release)?;
    let mut orchestrator =
        Orchestrator::new(cancel.clone()).with_wait_config(profile.wait_config());
    orchestrator.provision(provisioner.as_mut(), profile.provision_options())
}

fn load_validated_profile(file: &camino::Utf8Path) -> Result<Profile> {
    let profile = config::load_profile(file)
        .with_context(|| format!("failed to load profile from {}", file))?;
    profile.validate().context("profile validation failed")?;
    Ok(profile)
}

pub fn run_provision(opts: &cli::ProvisionArgs, cancel: CancellationToken) -> Result<()> {
    let profile = load_validated_profile(&opts.common.file)?;
    if opts.dry_run && profile.os_id.is_none() {
        anyhow::bail!("dry run requires os_id in the profile, since the host is not contacted");
    }

    let registry = ProvisionerRegistry::with_defaults();
    let driver = build_driver(&profile, &cancel, opts.dry_run);
    provision_host(&profile, &registry, driver, &cancel)?;
    Ok(())
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = load_validated_profile(&opts.common.file)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

pub fn run_detect(opts: &cli::DetectArgs, cancel: CancellationToken) -> Result<()> {
    let profile = config::load_profile(&opts.common.file)
        .with_context(|| format!("failed to load profile from {}", opts.common.file))?;
    let driver = build_driver(&profile, &cancel, false);
    let os_release = detect_os_release(driver.channel(), &cancel)?;
    info!("detected host os:\n{:#?}", os_release);
    Ok(())
}

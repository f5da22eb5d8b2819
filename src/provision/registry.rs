//! Name-to-factory registry used to pick a strategy for a detected host.
//!
//! The registry is an ordinary value owned by the caller. It is populated
//! once (usually via [`ProvisionerRegistry::with_defaults`]) and then only
//! read, so it can be shared across concurrent runs behind a plain
//! reference.

use std::sync::Arc;

use tracing::debug;

use super::{OsFamily, Provisioner};
use crate::driver::HostDriver;
use crate::error::RsprovisionError;
use crate::os_release::OsRelease;

/// Constructs a fresh strategy bound to a host driver.
pub type ProvisionerFactory = fn(Arc<dyn HostDriver>) -> Box<dyn Provisioner>;

/// A single name-to-factory binding.
#[derive(Clone)]
pub struct ProvisionerRegistration {
    pub name: String,
    pub factory: ProvisionerFactory,
}

impl std::fmt::Debug for ProvisionerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of strategy registrations.
///
/// Names compare case-insensitively. Registering a name that is already
/// bound replaces the factory in place: the last registration wins and the
/// entry keeps its original position in selection order.
#[derive(Debug, Clone, Default)]
pub struct ProvisionerRegistry {
    entries: Vec<ProvisionerRegistration>,
}

impl ProvisionerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in family, in
    /// [`OsFamily::ALL`] order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for family in OsFamily::ALL {
            registry.register(family.to_string(), family.factory());
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ProvisionerFactory) {
        let name = name.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.name.eq_ignore_ascii_case(&name))
        {
            debug!("replacing provisioner registration: {}", name);
            entry.factory = factory;
            return;
        }
        debug!("registering provisioner: {}", name);
        self.entries.push(ProvisionerRegistration { name, factory });
    }

    /// Returns the factory bound to `name`.
    pub fn lookup(&self, name: &str) -> Result<ProvisionerFactory, RsprovisionError> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.factory)
            .ok_or_else(|| RsprovisionError::NotFound {
                name: name.to_string(),
            })
    }

    /// Registered names, in selection order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the first registered strategy compatible with `os_release`.
    ///
    /// Each candidate is constructed, given the detected release, and asked
    /// whether it matches. The winning instance already carries the release.
    pub fn select(
        &self,
        driver: Arc<dyn HostDriver>,
        os_release: &OsRelease,
    ) -> Result<Box<dyn Provisioner>, RsprovisionError> {
        for entry in &self.entries {
            let mut provisioner = (entry.factory)(Arc::clone(&driver));
            provisioner.set_os_release(os_release.clone());
            if provisioner.compatible_with_host() {
                debug!("selected provisioner {} for os id {}", entry.name, os_release.id);
                return Ok(provisioner);
            }
        }
        Err(RsprovisionError::NoCompatibleProvisioner {
            os_id: os_release.id.clone(),
        })
    }
}

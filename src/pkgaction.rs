//! Abstract package and service actions.
//!
//! Strategies translate these into their family's package-manager and
//! init-system verbs. The lowercase string form of each variant is the
//! verb most families use directly.

use strum::{AsRefStr, Display, EnumString};

/// Package manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PackageAction {
    Install,
    Remove,
    Upgrade,
}

/// Init-system operation on a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
}

impl ServiceAction {
    /// Returns true for actions that change boot-time behavior rather than
    /// the running state.
    pub fn is_boot_config(&self) -> bool {
        matches!(self, Self::Enable | Self::Disable)
    }
}

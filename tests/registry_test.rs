//! Detection and strategy selection against a recorded host.

mod helpers;

use std::sync::Arc;

use rsprovision::RsprovisionError;
use rsprovision::cancel::CancellationToken;
use rsprovision::driver::HostDriver;
use rsprovision::engine::OptionsFormat;
use rsprovision::os_release::detect_os_release;
use rsprovision::pkgaction::{PackageAction, ServiceAction};
use rsprovision::provision::{
    OsFamily, Provisioner, ProvisionerCore, ProvisionerRegistry, UbuntuProvisioner,
};
use rsprovision::{detect_host, provision_host};

use crate::helpers::{
    CENTOS_OS_RELEASE, MockDriver, RecordingChannel, UBUNTU_OS_RELEASE, load_profile_from_yaml,
    profile_yaml,
};

#[test]
fn detected_centos_selects_centos_strategy() {
    let channel = RecordingChannel::with_os_release(CENTOS_OS_RELEASE);
    let driver = MockDriver::new("node1", &channel).shared();
    let release = detect_os_release(driver.channel(), &CancellationToken::new()).unwrap();
    assert_eq!(release.id, "centos");
    assert_eq!(release.id_like, vec!["rhel", "fedora"]);

    let selected = ProvisionerRegistry::with_defaults().select(driver, &release).unwrap();
    assert_eq!(selected.family(), OsFamily::Centos);
    assert!(selected.compatible_with_host());
}

#[test]
fn detected_ubuntu_selects_ubuntu_strategy() {
    let channel = RecordingChannel::with_os_release(UBUNTU_OS_RELEASE);
    let driver = MockDriver::new("node1", &channel).shared();
    let release = detect_os_release(driver.channel(), &CancellationToken::new()).unwrap();
    let selected = ProvisionerRegistry::with_defaults().select(driver, &release).unwrap();
    assert_eq!(selected.family(), OsFamily::Ubuntu);
    assert_eq!(selected.os_release().unwrap().version_id, "14.04");
}

#[test]
fn every_family_accepts_exactly_its_own_id() {
    let channel = RecordingChannel::new();
    let registry = ProvisionerRegistry::with_defaults();
    for family in OsFamily::ALL {
        let factory = registry.lookup(&family.to_string()).unwrap();
        for other in OsFamily::ALL {
            let mut p = factory(MockDriver::new("n", &channel).shared());
            p.set_os_release(rsprovision::os_release::OsRelease::from_id(other.id()));
            assert_eq!(p.compatible_with_host(), family == other, "{} vs {}", family, other);
        }
    }
}

#[test]
fn unknown_os_fails_with_no_compatible_provisioner() {
    let (_dir, profile) = load_profile_from_yaml(&profile_yaml("")).unwrap();
    let channel = RecordingChannel::with_os_release("ID=arch\nNAME=\"Arch Linux\"\n");
    let driver = MockDriver::new("node1", &channel).shared();

    let err = provision_host(
        &profile,
        &ProvisionerRegistry::with_defaults(),
        driver,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RsprovisionError::NoCompatibleProvisioner { ref os_id } if os_id == "arch"
    ));
    assert_eq!(channel.commands(), vec!["cat /etc/os-release"]);
}

#[test]
fn unreadable_os_release_is_detection_error() {
    let channel = RecordingChannel::new();
    channel.fail_on("cat /etc/os-release", "cat: /etc/os-release: No such file or directory");
    let err = detect_os_release(channel.as_ref(), &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, RsprovisionError::Detection(_)), "got: {:?}", err);
}

#[test]
fn profile_os_id_skips_detection() {
    let (_dir, profile) = load_profile_from_yaml(&profile_yaml("os_id: Ubuntu\n")).unwrap();
    let channel = RecordingChannel::new();
    let driver = MockDriver::new("node1", &channel).shared();
    let release = detect_host(&profile, driver.as_ref(), &CancellationToken::new()).unwrap();
    assert_eq!(release.id, "ubuntu");
    assert!(channel.commands().is_empty());
}

/// Strategy for a family the crate does not ship, registered by the caller.
struct AlpineProvisioner {
    core: ProvisionerCore,
}

impl AlpineProvisioner {
    fn boxed(driver: Arc<dyn HostDriver>) -> Box<dyn Provisioner> {
        Box::new(Self {
            core: ProvisionerCore::new(driver, vec!["curl".to_string(), "bash".to_string()]),
        })
    }
}

impl Provisioner for AlpineProvisioner {
    // The closed family set has no Alpine variant; this strategy reuses
    // Ubuntu's id only to exercise caller-side registration.
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
        self.ssh_command(&format!("sudo apk {} {}", action, name)).map(|_| ())
    }

    fn service(&self, name: &str, action: ServiceAction) -> Result<(), RsprovisionError> {
        self.ssh_command(&format!("sudo rc-service {} {}", name, action)).map(|_| ())
    }

    fn fix_privilege_config(&self) -> Result<(), RsprovisionError> {
        Ok(())
    }

    fn update_packages(&self) -> Result<(), RsprovisionError> {
        self.ssh_command("sudo apk update").map(|_| ())
    }

    fn configure_firewall(&self, _port: u16) -> Result<(), RsprovisionError> {
        Ok(())
    }

    fn options_format(&self) -> OptionsFormat {
        OptionsFormat {
            variable: "DOCKER_OPTS",
            remote_path: "/etc/conf.d/docker",
        }
    }
}

#[test]
fn caller_registration_replaces_builtin_strategy() {
    let (_dir, profile) = load_profile_from_yaml(&profile_yaml("")).unwrap();
    let channel = RecordingChannel::with_os_release(UBUNTU_OS_RELEASE);
    let driver = MockDriver::new("node1", &channel).shared();

    let mut registry = ProvisionerRegistry::with_defaults();
    registry.register("ubuntu", AlpineProvisioner::boxed);
    provision_host(&profile, &registry, driver, &CancellationToken::new()).unwrap();

    let install_curl = channel.position("sudo apk install curl").unwrap();
    let install_bash = channel.position("sudo apk install bash").unwrap();
    let engine = channel.position("get.docker.com").unwrap();
    assert!(install_curl < install_bash && install_bash < engine);
    assert_eq!(channel.count("apt-get"), 0);
    assert!(channel.position("/etc/conf.d/docker").is_some());
}

#[test]
fn lookup_missing_name_is_not_found() {
    let mut registry = ProvisionerRegistry::new();
    registry.register("Ubuntu", UbuntuProvisioner::boxed);
    assert!(registry.lookup("ubuntu").is_ok());
    assert!(matches!(
        registry.lookup("centos"),
        Err(RsprovisionError::NotFound { ref name }) if name == "centos"
    ));
}

//! Entry points driven by a profile on disk, in dry-run mode.

mod helpers;

use camino::Utf8Path;
use rsprovision::cancel::CancellationToken;
use rsprovision::cli::{CommonArgs, LogLevel, ProvisionArgs, ValidateArgs};
use rsprovision::{run_provision, run_validate};

use crate::helpers::{profile_yaml, write_certs, write_profile};

fn common(file: &Utf8Path) -> CommonArgs {
    CommonArgs {
        file: file.to_path_buf(),
        log_level: LogLevel::Error,
    }
}

#[test]
fn run_provision_dry_run_completes_without_host() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8Path::from_path(dir.path()).unwrap();
    write_certs(base);
    let path = write_profile(base, &profile_yaml("os_id: centos\n"));

    let opts = ProvisionArgs {
        common: common(&path),
        dry_run: true,
    };
    run_provision(&opts, CancellationToken::new()).expect("dry run should succeed");
}

#[test]
fn run_provision_dry_run_requires_os_id() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8Path::from_path(dir.path()).unwrap();
    write_certs(base);
    let path = write_profile(base, &profile_yaml(""));

    let opts = ProvisionArgs {
        common: common(&path),
        dry_run: true,
    };
    let err = run_provision(&opts, CancellationToken::new()).unwrap_err();
    assert!(err.to_string().contains("os_id"), "{:#}", err);
}

#[test]
fn run_provision_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8Path::from_path(dir.path()).unwrap();
    write_certs(base);
    let path = write_profile(base, &profile_yaml("os_id: ubuntu\n"));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let opts = ProvisionArgs {
        common: common(&path),
        dry_run: true,
    };
    let err = run_provision(&opts, cancel).unwrap_err();
    assert!(format!("{:#}", err).contains("provisioning cancelled"), "{:#}", err);
}

#[test]
fn run_validate_succeeds_on_valid_profile() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8Path::from_path(dir.path()).unwrap();
    write_certs(base);
    let path = write_profile(base, &profile_yaml(""));

    run_validate(&ValidateArgs {
        common: common(&path),
    })
    .expect("validation should succeed");
}

#[test]
fn run_validate_reports_missing_certs() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8Path::from_path(dir.path()).unwrap();
    let path = write_profile(base, &profile_yaml(""));

    let err = run_validate(&ValidateArgs {
        common: common(&path),
    })
    .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("profile validation failed"), "{}", message);
    assert!(message.contains("CA certificate"), "{}", message);
}

//! Integration tests for the `kiln` binary entry point.
//!
//! Covers exit codes for usage errors and commands that never reach the
//! network.

use std::fs;
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use kiln_plugins::Platform;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn help_succeeds() {
    let mut command = cargo_bin_cmd!("kiln");
    command.arg("--help");
    command.assert().success().stdout(contains("plugins"));
}

#[test]
fn missing_command_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("kiln");
    command.assert().code(2);
}

#[test]
fn install_without_arguments_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("kiln");
    command.args(["plugins", "install"]);
    command
        .assert()
        .code(2)
        .stderr(contains("expects <address> [<version>]"));
}

#[test]
fn install_with_three_arguments_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("kiln");
    command.args(["plugins", "install", "github.com/acme/comment", "v1.0.0", "extra"]);
    command.assert().code(2);
}

#[test]
fn unsupported_hosts_fail_before_any_download() {
    let root = TempDir::new().expect("temporary directory");
    let mut command = cargo_bin_cmd!("kiln");
    command
        .arg("--plugin-directory")
        .arg(root.path())
        .args(["plugins", "install", "gitlab.com/acme/comment"]);
    command
        .assert()
        .code(1)
        .stderr(contains("unsupported plugin source host"));
}

#[test]
fn installed_reports_an_empty_directory() {
    let root = TempDir::new().expect("temporary directory");
    let mut command = cargo_bin_cmd!("kiln");
    command
        .arg("--plugin-directory")
        .arg(root.path())
        .args(["plugins", "installed"]);
    command
        .assert()
        .success()
        .stdout(contains("No plugins installed."));
}

#[test]
fn installed_skips_a_binary_without_its_sidecar() {
    let root = TempDir::new().expect("temporary directory");
    let platform = Platform::current();
    let dir = root.path().join("github.com/acme/comment");
    fs::create_dir_all(&dir).expect("plugin directory");
    let name = format!(
        "kiln-plugin-comment_v1.0.0_x5.0_{}_{}{}",
        platform.os(),
        platform.arch(),
        platform.executable_suffix()
    );
    fs::write(dir.join(name), b"stray").expect("stray binary");

    let mut command = cargo_bin_cmd!("kiln");
    command
        .arg("--plugin-directory")
        .arg(root.path())
        .args(["plugins", "installed"])
        .timeout(Duration::from_secs(30));
    command
        .assert()
        .success()
        .stdout(contains("No plugins installed."))
        .stderr(contains("sidecar"));
}

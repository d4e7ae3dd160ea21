//! Drives the compiled plugin binary through the host-side bridge.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use kiln_plugins::{BridgeConfig, BridgeState, CapabilityKind, PluginBridge, PluginError};
use serde_json::json;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_kiln-plugin-comment"))
}

fn config() -> BridgeConfig {
    BridgeConfig::default()
        .with_handshake_timeout(Duration::from_secs(10))
        .with_shutdown_grace(Duration::from_secs(2))
}

#[test]
fn launch_call_and_shut_down() {
    let mut bridge = PluginBridge::new(binary(), config());

    let description = bridge.launch().expect("launch").clone();
    assert!(description.provides(CapabilityKind::Provisioner, "comment"));
    assert_eq!(bridge.state(), BridgeState::Ready);

    let prepared = bridge
        .call(
            CapabilityKind::Provisioner,
            "comment",
            "prepare",
            json!({ "comment": "hello" }),
        )
        .expect("prepare");
    assert_eq!(prepared, json!({ "warnings": [] }));

    let provisioned = bridge
        .call(
            CapabilityKind::Provisioner,
            "comment",
            "provision",
            json!({ "comment": "hello", "ui": true }),
        )
        .expect("provision");
    assert_eq!(provisioned, json!({ "output": "==> hello" }));
    assert_eq!(bridge.state(), BridgeState::Ready);

    bridge.shutdown().expect("shutdown");
    assert_eq!(bridge.state(), BridgeState::Terminated);
}

#[test]
fn plugin_errors_keep_the_bridge_ready() {
    let mut bridge = PluginBridge::new(binary(), config());
    bridge.launch().expect("launch");

    let error = bridge
        .call(
            CapabilityKind::Provisioner,
            "comment",
            "provision",
            json!({ "comment": "" }),
        )
        .expect_err("empty comment");
    assert!(matches!(error, PluginError::PluginCallFailed { .. }));
    assert_eq!(bridge.state(), BridgeState::Ready);

    let missing = bridge
        .call(CapabilityKind::Builder, "comment", "build", json!({}))
        .expect_err("no builder");
    assert!(matches!(missing, PluginError::UnknownComponent { .. }));

    bridge.shutdown().expect("shutdown");
}

#[test]
fn running_outside_a_host_fails() {
    let output = Command::new(binary())
        .env_remove("KILN_PLUGIN_MAGIC_COOKIE")
        .output()
        .expect("run plugin");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

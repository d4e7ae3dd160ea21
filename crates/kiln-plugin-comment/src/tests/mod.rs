//! Unit tests for the comment provisioner.

use rstest::rstest;
use serde_json::json;

use kiln_plugins::{CapabilityKind, ComponentHandler};

use crate::{
    CommentConfig, CommentError, CommentProvisioner, prepare, provision, render, server, wrap,
};

fn config(comment: &str, bubble_text: bool, ui: bool) -> CommentConfig {
    CommentConfig {
        comment: comment.to_owned(),
        bubble_text,
        ui,
    }
}

#[test]
fn server_registers_the_provisioner() {
    let server = server();
    let description = server.description();
    assert!(description.provides(CapabilityKind::Provisioner, "comment"));
    assert!(description.components(CapabilityKind::Builder).is_empty());
    assert_eq!(description.version(), env!("CARGO_PKG_VERSION"));
}

#[rstest]
#[case(config("hello", false, false), "hello")]
#[case(config("hello\nworld", false, true), "==> hello\n==> world")]
#[case(config("hi", true, false), " ____\n| hi |\n ----")]
fn renders_comments(#[case] config: CommentConfig, #[case] expected: &str) {
    assert_eq!(render(&config), expected);
}

#[test]
fn bubble_lines_share_one_width() {
    let rendered = render(&config("a short line\nand a somewhat longer one", true, false));
    let widths: Vec<usize> = rendered
        .lines()
        .skip(1)
        .take(2)
        .map(|line| line.chars().count())
        .collect();
    assert_eq!(widths, vec![29, 29]);
}

#[test]
fn wrapping_breaks_on_whitespace() {
    assert_eq!(
        wrap("one two three four", 9),
        vec!["one two", "three", "four"]
    );
    assert_eq!(wrap("unbreakable", 4), vec!["unbreakable"]);
}

#[test]
fn prepare_warns_about_ignored_settings() {
    let quiet = prepare(json!({ "comment": "hi" })).expect("prepare");
    assert_eq!(quiet, json!({ "warnings": [] }));

    let noisy = prepare(json!({ "comment": "hi", "bubble_text": true, "ui": true }))
        .expect("prepare");
    assert_eq!(noisy["warnings"].as_array().map(Vec::len), Some(1));
}

#[rstest]
#[case(json!({ "comment": "   " }))]
#[case(json!({}))]
#[case(json!({ "comment": "hi", "colour": "red" }))]
#[case(json!("hi"))]
fn invalid_payloads_are_rejected(#[case] payload: serde_json::Value) {
    let error = provision(payload).expect_err("invalid payload");
    assert!(matches!(
        error,
        CommentError::EmptyComment | CommentError::InvalidConfig(_)
    ));
}

#[test]
fn handler_dispatches_by_method() {
    let provisioner = CommentProvisioner;
    assert_eq!(
        provisioner.handle("provision", json!({ "comment": "done" })),
        Ok(json!({ "output": "done" }))
    );
    assert_eq!(
        provisioner.handle("destroy", json!({})),
        Err(String::from("provisioner 'comment' has no method 'destroy'"))
    );
}

//! Comment provisioner plugin.
//!
//! A reference plugin for `kiln-plugins`: it completes the handshake, serves
//! one provisioner named `comment`, and renders a build-log comment, plain or
//! framed in a speech bubble. Two methods are supported:
//!
//! - `prepare` validates the configuration and returns `{"warnings": [...]}`.
//! - `provision` returns `{"output": "<rendered comment>"}`.

#[cfg(test)]
mod tests;

use kiln_plugins::{CapabilityKind, ComponentHandler, HOST_API_VERSION, PluginServer};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Name under which the provisioner is registered.
pub const COMPONENT_NAME: &str = "comment";

/// Widest line rendered inside a bubble before wrapping.
const BUBBLE_WIDTH: usize = 60;

/// Provisioner configuration sent as the call payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentConfig {
    /// Text to print.
    pub comment: String,
    /// Frames the text in a speech bubble.
    #[serde(default)]
    pub bubble_text: bool,
    /// Prefixes every line with `==> `, as a build UI would.
    #[serde(default)]
    pub ui: bool,
}

/// Errors raised while handling a call.
#[derive(Debug, Error)]
pub enum CommentError {
    /// The payload is not a valid configuration.
    #[error("invalid comment configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    /// The comment has no visible text.
    #[error("comment must not be empty")]
    EmptyComment,
    /// The method is not one this provisioner implements.
    #[error("provisioner 'comment' has no method '{0}'")]
    UnknownMethod(String),
}

/// The `comment` provisioner.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommentProvisioner;

impl ComponentHandler for CommentProvisioner {
    fn handle(&self, method: &str, payload: Value) -> Result<Value, String> {
        let result = match method {
            "prepare" => prepare(payload),
            "provision" => provision(payload),
            other => Err(CommentError::UnknownMethod(other.to_owned())),
        };
        result.map_err(|error| error.to_string())
    }
}

/// Validates `payload`, returning warnings for settings that have no effect.
///
/// # Errors
///
/// Returns [`CommentError::InvalidConfig`] or [`CommentError::EmptyComment`].
pub fn prepare(payload: Value) -> Result<Value, CommentError> {
    let config = parse_config(payload)?;
    let warnings: Vec<&str> = if config.bubble_text && config.ui {
        vec!["'ui' has no effect when 'bubble_text' is set"]
    } else {
        Vec::new()
    };
    Ok(json!({ "warnings": warnings }))
}

/// Renders the comment described by `payload`.
///
/// # Errors
///
/// Returns [`CommentError::InvalidConfig`] or [`CommentError::EmptyComment`].
pub fn provision(payload: Value) -> Result<Value, CommentError> {
    let config = parse_config(payload)?;
    Ok(json!({ "output": render(&config) }))
}

fn parse_config(payload: Value) -> Result<CommentConfig, CommentError> {
    let config: CommentConfig = serde_json::from_value(payload)?;
    if config.comment.trim().is_empty() {
        return Err(CommentError::EmptyComment);
    }
    Ok(config)
}

/// Renders `config` as the text the provisioner prints.
#[must_use]
pub fn render(config: &CommentConfig) -> String {
    if config.bubble_text {
        return bubble(&config.comment);
    }
    let prefix = if config.ui { "==> " } else { "" };
    config
        .comment
        .lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bubble(text: &str) -> String {
    let lines = wrap(text, BUBBLE_WIDTH);
    let width = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);

    let mut rendered = Vec::with_capacity(lines.len() + 2);
    rendered.push(format!(" {}", "_".repeat(width + 2)));
    rendered.extend(
        lines
            .iter()
            .map(|line| format!("| {line:<width$} |")),
    );
    rendered.push(format!(" {}", "-".repeat(width + 2)));
    rendered.join("\n")
}

/// Splits `text` into lines of at most `width` characters, breaking on
/// whitespace. Words longer than `width` stay whole.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let needed = current.chars().count() + word.chars().count() + 1;
            if !current.is_empty() && needed > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Builds the plugin server with the `comment` provisioner registered.
#[must_use]
pub fn server() -> PluginServer {
    PluginServer::new(env!("CARGO_PKG_VERSION"), HOST_API_VERSION).register(
        CapabilityKind::Provisioner,
        COMPONENT_NAME,
        CommentProvisioner,
    )
}

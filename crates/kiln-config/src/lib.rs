//! Shared configuration for the Kiln binaries.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in
//! defaults, configuration files, `KILN_*` environment variables, and
//! command-line flags, in increasing order of precedence.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_LOG_FILTER, DEFAULT_SHUTDOWN_GRACE,
    default_handshake_timeout_ms, default_log_filter, default_log_filter_string,
    default_log_format, default_plugin_directory, default_shutdown_grace_ms,
};
pub use logging::{LogFormat, LogFormatParseError};

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the fields of [`Config`].
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--plugin-directory",
    "--log-filter",
    "--log-format",
    "--handshake-timeout-ms",
    "--shutdown-grace-ms",
];

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KILN")]
pub struct Config {
    /// Root directory plugins are installed into and discovered from.
    #[ortho_config(default = default_plugin_directory())]
    pub plugin_directory: Utf8PathBuf,
    /// `tracing` filter expression, for example `kiln_plugins=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Milliseconds a plugin has to print its handshake line.
    #[ortho_config(default = default_handshake_timeout_ms())]
    pub handshake_timeout_ms: u64,
    /// Milliseconds a plugin has to exit after a shutdown request.
    #[ortho_config(default = default_shutdown_grace_ms())]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_directory: default_plugin_directory(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Config {
    /// Plugin root directory.
    #[must_use]
    pub fn plugin_directory(&self) -> &Utf8Path {
        &self.plugin_directory
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default time a plugin has to print its handshake line.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a plugin has to exit after a shutdown request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Directory below the platform data directory that holds plugins.
const PLUGIN_SUBDIRECTORY: [&str; 2] = ["kiln", "plugins"];

/// Fallback below the home directory when no data directory is known.
const HOME_FALLBACK: [&str; 2] = [".kiln", "plugins"];

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    String::from(DEFAULT_LOG_FILTER)
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default handshake timeout in milliseconds.
#[must_use]
pub const fn default_handshake_timeout_ms() -> u64 {
    duration_ms(DEFAULT_HANDSHAKE_TIMEOUT)
}

/// Default shutdown grace period in milliseconds.
#[must_use]
pub const fn default_shutdown_grace_ms() -> u64 {
    duration_ms(DEFAULT_SHUTDOWN_GRACE)
}

const fn duration_ms(duration: Duration) -> u64 {
    duration.as_secs() * 1_000
}

/// Computes the default plugin directory: `<data dir>/kiln/plugins`, or
/// `~/.kiln/plugins` where the platform has no data directory.
#[must_use]
pub fn default_plugin_directory() -> Utf8PathBuf {
    plugin_directory_from(dirs::data_dir(), dirs::home_dir())
}

pub(crate) fn plugin_directory_from(
    data_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Utf8PathBuf {
    let base = data_dir
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .map(|dir| PLUGIN_SUBDIRECTORY.iter().fold(dir, |path, part| path.join(part)));
    base.unwrap_or_else(|| {
        let home = home_dir
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .unwrap_or_default();
        HOME_FALLBACK.iter().fold(home, |path, part| path.join(part))
    })
}

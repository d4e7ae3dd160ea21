//! Domain errors raised by plugin operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint and keep the error cloneable
//! into log records.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::checksum::Checksum;

/// Errors arising from plugin resolution, installation, and invocation.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The source address does not have the `host/namespace/name` shape.
    #[error("malformed plugin source address '{input}': {reason}")]
    MalformedAddress {
        /// The address exactly as supplied.
        input: String,
        /// Why the address was rejected.
        reason: String,
    },

    /// The source address names a host this installer cannot fetch from.
    #[error("unsupported plugin source host '{host}' in '{input}' (only {supported} is supported)")]
    UnsupportedHost {
        /// The address exactly as supplied.
        input: String,
        /// The rejected host segment.
        host: String,
        /// The host that is supported.
        supported: &'static str,
    },

    /// A version or version requirement could not be parsed.
    #[error("invalid version syntax '{input}': {message}")]
    InvalidVersionSyntax {
        /// The requirement exactly as supplied.
        input: String,
        /// Parser diagnostic.
        message: String,
    },

    /// No release satisfies the requirement on the running platform.
    #[error("no compatible release of {address} matches '{requirement}' for {platform}")]
    NoCompatibleRelease {
        /// Source address that was queried.
        address: String,
        /// Requirement that was applied.
        requirement: String,
        /// Platform the release had to match.
        platform: String,
    },

    /// File content does not match its expected digest.
    #[error("checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// File (or artifact name) that failed verification.
        path: PathBuf,
        /// Digest the release or sidecar promised.
        expected: Checksum,
        /// Digest computed from the content.
        actual: Checksum,
    },

    /// Reading a local file or directory failed.
    #[error("failed to read {path}: {source}")]
    ReadFailure {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Writing a local file or directory failed.
    #[error("failed to write {path}: {source}")]
    WriteFailure {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{plugin}' failed to start: {source}")]
    SpawnFailed {
        /// Plugin binary path.
        plugin: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin did not complete the startup handshake.
    #[error("plugin '{plugin}' handshake failed: {message}")]
    HandshakeFailure {
        /// Plugin binary path.
        plugin: String,
        /// Description of the failure.
        message: String,
    },

    /// The plugin announced a protocol this host cannot speak.
    #[error("plugin '{plugin}' is incompatible: {message}")]
    IncompatibleProtocol {
        /// Plugin binary path.
        plugin: String,
        /// Description of the incompatibility.
        message: String,
    },

    /// The plugin process died or its transport broke mid-conversation.
    #[error("plugin '{plugin}' crashed: {message}")]
    PluginCrashed {
        /// Plugin binary path.
        plugin: String,
        /// Description of the failure.
        message: String,
    },

    /// The plugin reported an error for a call.
    #[error("plugin '{plugin}' failed {component}.{method}: {message}")]
    PluginCallFailed {
        /// Plugin binary path.
        plugin: String,
        /// Component the call targeted.
        component: String,
        /// Method that was invoked.
        method: String,
        /// Error text reported by the plugin.
        message: String,
    },

    /// The call targets a component the plugin never declared.
    #[error("plugin '{plugin}' does not provide {kind} '{component}'")]
    UnknownComponent {
        /// Plugin binary path.
        plugin: String,
        /// Capability kind that was requested.
        kind: String,
        /// Component name that was requested.
        component: String,
    },

    /// The bridge is not in a state that accepts the operation.
    #[error("plugin '{plugin}' bridge is {state}")]
    BridgeUnavailable {
        /// Plugin binary path.
        plugin: String,
        /// Current bridge state.
        state: String,
    },

    /// The invocation was cancelled through a termination handle.
    #[error("plugin '{plugin}' was cancelled")]
    Cancelled {
        /// Plugin binary path.
        plugin: String,
    },

    /// A plugin process was started without the expected magic cookie.
    #[error(
        "this binary is a kiln plugin and must be launched by kiln (missing or wrong {variable})"
    )]
    MagicCookieMismatch {
        /// Environment variable carrying the cookie.
        variable: &'static str,
    },

    /// Fetching a remote document or artifact failed.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A release listing could not be interpreted.
    #[error("invalid release catalog for {address}: {message}")]
    InvalidReleaseCatalog {
        /// Source address the catalog belongs to.
        address: String,
        /// Description of the problem.
        message: String,
    },

    /// An RPC envelope could not be encoded or decoded.
    #[error("failed to encode or decode plugin message: {0}")]
    Codec(#[source] Arc<serde_json::Error>),
}

impl PluginError {
    /// Wraps an I/O error raised while reading `path`.
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailure {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wraps an I/O error raised while writing `path`.
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(Arc::new(error))
    }
}

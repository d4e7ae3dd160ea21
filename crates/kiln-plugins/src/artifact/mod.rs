//! Artifact filename grammar.
//!
//! Every installed binary and every release asset is named
//! `kiln-plugin-<name>_v<version>_x<api>_<os>_<arch>[.exe]`. The name is the
//! only record of what a file contains, so encoding and parsing must agree
//! exactly. Checksum sidecars append [`SIDECAR_SUFFIX`] to the binary name.

use std::fmt;

use semver::Version;

use crate::address::BINARY_PREFIX;
use crate::platform::Platform;
use crate::version::{ApiVersion, parse_version};

/// Suffix appended to a binary filename to form its checksum sidecar.
pub const SIDECAR_SUFFIX: &str = "_SHA256SUM";

/// Parsed form of an artifact filename.
///
/// # Example
///
/// ```
/// use kiln_plugins::ArtifactName;
///
/// let name = ArtifactName::parse("kiln-plugin-comment_v0.2.18_x5.0_windows_amd64.exe")
///     .expect("valid artifact name");
/// assert_eq!(name.plugin(), "comment");
/// assert_eq!(name.platform().os(), "windows");
/// assert_eq!(name.filename(), "kiln-plugin-comment_v0.2.18_x5.0_windows_amd64.exe");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    plugin: String,
    version: Version,
    api: ApiVersion,
    platform: Platform,
}

impl ArtifactName {
    /// Creates an artifact name from its parts. `plugin` is the short name
    /// without the binary prefix.
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        version: Version,
        api: ApiVersion,
        platform: Platform,
    ) -> Self {
        Self {
            plugin: plugin.into().to_ascii_lowercase(),
            version,
            api,
            platform,
        }
    }

    /// Parses a filename, returning `None` when it does not follow the
    /// grammar. Sidecar filenames never parse.
    #[must_use]
    pub fn parse(filename: &str) -> Option<Self> {
        if filename.ends_with(SIDECAR_SUFFIX) {
            return None;
        }
        let (stem, has_exe) = match filename.strip_suffix(".exe") {
            Some(stem) => (stem, true),
            None => (filename, false),
        };
        let body = stem.strip_prefix(BINARY_PREFIX)?;

        let mut fields = body.rsplitn(5, '_');
        let arch = fields.next()?;
        let os = fields.next()?;
        let api = fields.next()?;
        let version = fields.next()?;
        let plugin = fields.next()?;

        if [plugin, os, arch].iter().any(|part| !is_lower_token(part)) {
            return None;
        }
        if !version.starts_with('v') || !api.starts_with('x') {
            return None;
        }
        let platform = Platform::new(os, arch);
        // The suffix belongs to windows binaries and nothing else.
        if has_exe != (platform.executable_suffix() == ".exe") {
            return None;
        }

        Some(Self {
            plugin: plugin.to_owned(),
            version: parse_version(version).ok()?,
            api: api.parse().ok()?,
            platform,
        })
    }

    /// Returns the short plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the API compatibility tag.
    #[must_use]
    pub const fn api(&self) -> ApiVersion {
        self.api
    }

    /// Returns the target platform.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Returns the canonical filename.
    #[must_use]
    pub fn filename(&self) -> String {
        self.to_string()
    }

    /// Returns the filename of the checksum sidecar.
    #[must_use]
    pub fn sidecar_filename(&self) -> String {
        format!("{self}{SIDECAR_SUFFIX}")
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{BINARY_PREFIX}{}_v{}_{}_{}_{}{}",
            self.plugin,
            self.version,
            self.api,
            self.platform.os(),
            self.platform.arch(),
            self.platform.executable_suffix()
        )
    }
}

fn is_lower_token(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests;

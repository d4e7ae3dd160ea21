//! Published releases and release selection.
//!
//! [`select_release`] is a pure function: given the releases a source lists,
//! it picks the newest one satisfying the requirement for exactly the target
//! platform and a compatible plugin API. Versions published only for other
//! platforms are treated as unavailable.

use semver::Version;

use crate::address::SourceAddress;
use crate::artifact::ArtifactName;
use crate::checksum::Checksum;
use crate::error::PluginError;
use crate::platform::Platform;
use crate::version::{ApiVersion, VersionRequirement};

/// One downloadable artifact of a published plugin version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRelease {
    artifact: ArtifactName,
    size: u64,
    checksum: Checksum,
    download_url: Option<String>,
}

impl PluginRelease {
    /// Creates a release description.
    #[must_use]
    pub const fn new(artifact: ArtifactName, size: u64, checksum: Checksum) -> Self {
        Self {
            artifact,
            size,
            checksum,
            download_url: None,
        }
    }

    /// Records where the artifact bytes can be fetched from.
    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Returns the parsed artifact filename.
    #[must_use]
    pub const fn artifact(&self) -> &ArtifactName {
        &self.artifact
    }

    /// Returns the released version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        self.artifact.version()
    }

    /// Returns the platform the artifact was built for.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        self.artifact.platform()
    }

    /// Returns the API tag of the artifact.
    #[must_use]
    pub const fn api(&self) -> ApiVersion {
        self.artifact.api()
    }

    /// Returns the artifact filename.
    #[must_use]
    pub fn filename(&self) -> String {
        self.artifact.filename()
    }

    /// Returns the artifact size in bytes as advertised by the source.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the expected SHA-256 of the artifact.
    #[must_use]
    pub const fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Returns the download URL, if the source supplied one.
    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }
}

/// Picks the release to install.
///
/// # Errors
///
/// Returns [`PluginError::NoCompatibleRelease`] when no release of the
/// addressed plugin satisfies the requirement on `platform` with an API
/// compatible with `host_api`.
pub fn select_release<'a>(
    address: &SourceAddress,
    requirement: &VersionRequirement,
    releases: &'a [PluginRelease],
    platform: &Platform,
    host_api: ApiVersion,
) -> Result<&'a PluginRelease, PluginError> {
    let candidates: Vec<&PluginRelease> = releases
        .iter()
        .filter(|release| release.artifact().plugin() == address.name())
        .filter(|release| release.platform() == platform)
        .filter(|release| release.api().is_compatible_with(host_api))
        .filter(|release| requirement.matches(release.version()))
        .collect();

    let stable = candidates
        .iter()
        .copied()
        .filter(|release| release.version().pre.is_empty());
    // `latest` only falls back to a pre-release when nothing stable exists.
    let chosen = if requirement.is_latest() {
        newest(stable).or_else(|| newest(candidates.iter().copied()))
    } else {
        newest(candidates.iter().copied())
    };

    chosen.ok_or_else(|| PluginError::NoCompatibleRelease {
        address: address.to_string(),
        requirement: requirement.to_string(),
        platform: platform.to_string(),
    })
}

/// Highest version wins; among equal versions the newer API minor wins.
fn newest<'a>(releases: impl Iterator<Item = &'a PluginRelease>) -> Option<&'a PluginRelease> {
    releases.max_by(|a, b| {
        a.version()
            .cmp(b.version())
            .then_with(|| a.api().cmp(&b.api()))
    })
}

#[cfg(test)]
mod tests;

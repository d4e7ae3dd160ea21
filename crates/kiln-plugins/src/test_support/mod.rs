//! Fixtures shared by unit and integration tests.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for dependent crates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use semver::Version;
use tempfile::TempDir;

use crate::address::SourceAddress;
use crate::artifact::ArtifactName;
use crate::checksum::{Checksum, sidecar_path};
use crate::dirhash;
use crate::error::PluginError;
use crate::platform::Platform;
use crate::release::PluginRelease;
use crate::source::ReleaseSource;
use crate::version::{ApiVersion, HOST_API_VERSION};

/// A temporary plugin root that is removed on drop.
#[derive(Debug)]
pub struct PluginRoot {
    dir: TempDir,
}

impl PluginRoot {
    /// Creates an empty root.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[expect(clippy::expect_used, reason = "test fixture")]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temporary plugin root"),
        }
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a binary and a matching sidecar in the install layout and
    /// returns the binary path.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors.
    pub fn install_fake(&self, address: &SourceAddress, artifact: &ArtifactName, content: &[u8]) -> PathBuf {
        let path = self.binary_path(address, artifact);
        self.write(&path, content);
        self.write(
            &sidecar_path(&path),
            Checksum::of_bytes(content).to_string().as_bytes(),
        );
        path
    }

    /// Returns where `artifact` of `address` would be installed.
    #[must_use]
    pub fn binary_path(&self, address: &SourceAddress, artifact: &ArtifactName) -> PathBuf {
        self.path()
            .join(address.relative_dir())
            .join(artifact.filename())
    }

    /// Writes `content` to `path`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors.
    #[expect(clippy::expect_used, reason = "test fixture")]
    pub fn write(&self, path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture directory");
        }
        fs::write(path, content).expect("write fixture file");
    }

    /// Returns the directory hash of the root.
    ///
    /// # Panics
    ///
    /// Panics if the tree cannot be hashed.
    #[must_use]
    #[expect(clippy::expect_used, reason = "test fixture")]
    pub fn hash(&self) -> String {
        dirhash::hash_dir(self.path()).expect("hash plugin root")
    }

    /// Returns the sorted relative file list of the root.
    ///
    /// # Panics
    ///
    /// Panics if the tree cannot be listed.
    #[must_use]
    #[expect(clippy::expect_used, reason = "test fixture")]
    pub fn files(&self) -> Vec<String> {
        dirhash::dir_files(self.path()).expect("list plugin root")
    }
}

impl Default for PluginRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an artifact name with the host API tag.
///
/// # Panics
///
/// Panics if `version` is not a semantic version.
#[must_use]
#[expect(clippy::expect_used, reason = "test fixture")]
pub fn artifact(plugin: &str, version: &str, os: &str, arch: &str) -> ArtifactName {
    ArtifactName::new(
        plugin,
        Version::parse(version.trim_start_matches('v')).expect("fixture version"),
        HOST_API_VERSION,
        Platform::new(os, arch),
    )
}

/// An in-memory release source that serves fixed bytes and records fetches.
#[derive(Debug, Default)]
pub struct StaticReleases {
    entries: Vec<(PluginRelease, Vec<u8>)>,
    fetched: Mutex<Vec<String>>,
}

impl StaticReleases {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `content` as `artifact`, with the correct checksum.
    #[must_use]
    pub fn with(self, artifact: ArtifactName, content: &[u8]) -> Self {
        let checksum = Checksum::of_bytes(content);
        self.with_checksum(artifact, content, checksum)
    }

    /// Publishes `content` as `artifact` with an arbitrary advertised
    /// checksum.
    #[must_use]
    pub fn with_checksum(mut self, artifact: ArtifactName, content: &[u8], checksum: Checksum) -> Self {
        let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
        self.entries
            .push((PluginRelease::new(artifact, size, checksum), content.to_vec()));
        self
    }

    /// Publishes `content` for every platform in `platforms`.
    #[must_use]
    pub fn with_platforms(self, plugin: &str, version: &str, platforms: &[(&str, &str)], content: &[u8]) -> Self {
        platforms.iter().fold(self, |source, (os, arch)| {
            source.with(artifact(plugin, version, os, arch), content)
        })
    }

    /// Publishes an artifact with a non-host API tag.
    #[must_use]
    pub fn with_api(self, artifact: &ArtifactName, api: ApiVersion, content: &[u8]) -> Self {
        let retagged = ArtifactName::new(
            artifact.plugin(),
            artifact.version().clone(),
            api,
            artifact.platform().clone(),
        );
        self.with(retagged, content)
    }

    /// Returns the filenames fetched so far.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .map(|fetched| fetched.clone())
            .unwrap_or_default()
    }
}

impl ReleaseSource for StaticReleases {
    fn list_releases(&self, _address: &SourceAddress) -> Result<Vec<PluginRelease>, PluginError> {
        Ok(self.entries.iter().map(|(release, _)| release.clone()).collect())
    }

    fn fetch(&self, release: &PluginRelease) -> Result<Vec<u8>, PluginError> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(release.filename());
        }
        self.entries
            .iter()
            .find(|(candidate, _)| candidate.artifact() == release.artifact())
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| PluginError::Fetch {
                url: release.filename(),
                message: String::from("not published"),
            })
    }
}

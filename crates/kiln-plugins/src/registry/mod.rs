//! Registry of installed plugin binaries.
//!
//! The [`PluginRegistry`] is a snapshot produced by a discovery pass. Entries
//! are grouped by source address; each group is kept ordered by version
//! (newest first) and then platform, so lookups and listings are deterministic
//! whatever order the filesystem returned entries in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::Serialize;

use crate::address::SourceAddress;
use crate::artifact::ArtifactName;
use crate::checksum::Checksum;
use crate::platform::Platform;
use crate::version::{ApiVersion, HOST_API_VERSION, VersionRequirement};

/// A verified plugin binary on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPlugin {
    address: SourceAddress,
    #[serde(serialize_with = "serialize_display")]
    version: Version,
    api: ApiVersion,
    platform: Platform,
    path: PathBuf,
    #[serde(serialize_with = "serialize_display")]
    checksum: Checksum,
}

impl InstalledPlugin {
    /// Records a binary installed at `path`.
    #[must_use]
    pub fn new(
        address: SourceAddress,
        artifact: &ArtifactName,
        path: impl Into<PathBuf>,
        checksum: Checksum,
    ) -> Self {
        Self {
            address,
            version: artifact.version().clone(),
            api: artifact.api(),
            platform: artifact.platform().clone(),
            path: path.into(),
            checksum,
        }
    }

    /// Returns the source address.
    #[must_use]
    pub const fn address(&self) -> &SourceAddress {
        &self.address
    }

    /// Returns the installed version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the plugin API tag.
    #[must_use]
    pub const fn api(&self) -> ApiVersion {
        self.api
    }

    /// Returns the platform the binary was built for.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Returns the absolute path to the binary.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the digest recorded in the sidecar.
    #[must_use]
    pub const fn checksum(&self) -> Checksum {
        self.checksum
    }

    fn key(&self) -> (&Version, &Platform) {
        (&self.version, &self.platform)
    }
}

fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

/// Installed plugins grouped by source address.
///
/// # Example
///
/// ```
/// use kiln_plugins::{
///     ApiVersion, ArtifactName, Checksum, InstalledPlugin, Platform, PluginRegistry,
///     SourceAddress, VersionRequirement,
/// };
/// use semver::Version;
///
/// let address = SourceAddress::parse("github.com/acme/comment").expect("address");
/// let platform = Platform::new("linux", "amd64");
/// let artifact = ArtifactName::new("comment", Version::new(1, 0, 0), ApiVersion::new(5, 0), platform.clone());
/// let mut registry = PluginRegistry::new();
/// registry.insert(InstalledPlugin::new(
///     address.clone(),
///     &artifact,
///     "/plugins/bin",
///     Checksum::of_bytes(b"1"),
/// ));
///
/// let found = registry
///     .latest(&address, &VersionRequirement::Latest, &platform)
///     .expect("installed");
/// assert_eq!(found.version(), &Version::new(1, 0, 0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<SourceAddress, Vec<InstalledPlugin>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any entry for the same address, version and
    /// platform. Returns the replaced entry.
    pub fn insert(&mut self, plugin: InstalledPlugin) -> Option<InstalledPlugin> {
        let group = self.plugins.entry(plugin.address.clone()).or_default();
        // Newest version first, then platform name.
        let position = group.binary_search_by(|existing| {
            plugin
                .version
                .cmp(&existing.version)
                .then_with(|| existing.platform.cmp(&plugin.platform))
        });
        match position {
            Ok(index) => group
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, plugin)),
            Err(index) => {
                group.insert(index, plugin);
                None
            }
        }
    }

    /// Returns the newest entry for `address` that satisfies `requirement`,
    /// was built for `platform`, and speaks a compatible plugin API. With
    /// `latest`, stable versions are preferred over pre-releases.
    #[must_use]
    pub fn latest(
        &self,
        address: &SourceAddress,
        requirement: &VersionRequirement,
        platform: &Platform,
    ) -> Option<&InstalledPlugin> {
        let mut candidates = self.installed(address).iter().filter(|plugin| {
            &plugin.platform == platform
                && plugin.api.is_compatible_with(HOST_API_VERSION)
                && requirement.matches(&plugin.version)
        });
        if requirement.is_latest() {
            let all: Vec<&InstalledPlugin> = candidates.collect();
            all.iter()
                .copied()
                .find(|plugin| plugin.version.pre.is_empty())
                .or_else(|| all.first().copied())
        } else {
            candidates.next()
        }
    }

    /// Returns every entry for `address`, newest first.
    #[must_use]
    pub fn installed(&self, address: &SourceAddress) -> &[InstalledPlugin] {
        self.plugins.get(address).map_or(&[], Vec::as_slice)
    }

    /// Returns the addresses with at least one entry, in sorted order.
    pub fn addresses(&self) -> impl Iterator<Item = &SourceAddress> {
        self.plugins.keys()
    }

    /// Iterates over every entry, grouped by address.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledPlugin> {
        self.plugins.values().flatten()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.values().map(Vec::len).sum()
    }

    /// Returns `true` when nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub(crate) fn contains(&self, plugin: &InstalledPlugin) -> bool {
        self.installed(&plugin.address)
            .iter()
            .any(|existing| existing.key() == plugin.key())
    }
}

impl<'a> IntoIterator for &'a PluginRegistry {
    type Item = &'a InstalledPlugin;
    type IntoIter = std::iter::Flatten<
        std::collections::btree_map::Values<'a, SourceAddress, Vec<InstalledPlugin>>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.plugins.values().flatten()
    }
}

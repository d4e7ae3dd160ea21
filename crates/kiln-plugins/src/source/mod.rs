//! Where releases come from.
//!
//! The installer talks to a [`ReleaseSource`]: something that can list the
//! releases of an address and fetch the bytes of one of them.
//! [`GithubReleases`] implements it on top of the GitHub releases API. It
//! performs no HTTP itself and delegates transport to a [`Fetcher`], so the
//! library stays free of network dependencies and tests can substitute
//! canned documents.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::address::SourceAddress;
use crate::artifact::ArtifactName;
use crate::checksum::Checksum;
use crate::error::PluginError;
use crate::release::PluginRelease;
use crate::version::parse_version;

/// Tracing target for release listing.
const SOURCE_TARGET: &str = "kiln_plugins::source";

/// Default GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Lists and fetches published plugin releases.
pub trait ReleaseSource {
    /// Returns every artifact published for `address`, for all platforms.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Fetch`] or [`PluginError::InvalidReleaseCatalog`]
    /// when the listing cannot be obtained or understood.
    fn list_releases(&self, address: &SourceAddress) -> Result<Vec<PluginRelease>, PluginError>;

    /// Downloads the bytes of `release`. Callers verify the checksum.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Fetch`] when the download fails.
    fn fetch(&self, release: &PluginRelease) -> Result<Vec<u8>, PluginError>;
}

/// Retrieves the body of a URL.
pub trait Fetcher {
    /// Returns the response body for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Fetch`] when the request fails or the server
    /// answers with an error status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PluginError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PluginError> {
        (**self).fetch(url)
    }
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    #[serde(default)]
    size: u64,
    browser_download_url: String,
}

/// Release source backed by the GitHub releases of
/// `<namespace>/kiln-plugin-<name>`.
///
/// Each release must publish a `kiln-plugin-<name>_v<version>_SHA256SUMS`
/// asset with one `<hex digest>  <filename>` line per binary. Binaries without
/// a digest line are not offered.
#[derive(Debug, Clone)]
pub struct GithubReleases<F> {
    fetcher: F,
    api_base: String,
}

impl<F: Fetcher> GithubReleases<F> {
    /// Creates a source that queries the public GitHub API.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            api_base: GITHUB_API.to_owned(),
        }
    }

    /// Overrides the API endpoint, for GitHub Enterprise or tests.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    fn releases_url(&self, address: &SourceAddress) -> String {
        format!(
            "{}/repos/{}/{}/releases",
            self.api_base,
            address.namespace(),
            address.binary_name()
        )
    }

    fn releases_of(
        &self,
        address: &SourceAddress,
        release: &GithubRelease,
    ) -> Result<Vec<PluginRelease>, PluginError> {
        let version = match parse_version(&release.tag_name) {
            Ok(version) => version,
            Err(error) => {
                warn!(
                    target: SOURCE_TARGET,
                    address = %address,
                    tag = %release.tag_name,
                    %error,
                    "skipping release with a non-semver tag"
                );
                return Ok(Vec::new());
            }
        };
        let sums_name = format!("{}_v{version}_SHA256SUMS", address.binary_name());
        let Some(sums_asset) = release.assets.iter().find(|asset| asset.name == sums_name) else {
            warn!(
                target: SOURCE_TARGET,
                address = %address,
                %version,
                "skipping release without {sums_name}"
            );
            return Ok(Vec::new());
        };

        let sums = self.fetcher.fetch(&sums_asset.browser_download_url)?;
        let sums = String::from_utf8(sums).map_err(|_| PluginError::InvalidReleaseCatalog {
            address: address.to_string(),
            message: format!("{sums_name} is not UTF-8"),
        })?;
        let digests = parse_sums(address, &sums_name, &sums)?;

        Ok(release
            .assets
            .iter()
            .filter_map(|asset| {
                let artifact = ArtifactName::parse(&asset.name)?;
                if artifact.plugin() != address.name() || artifact.version() != &version {
                    return None;
                }
                let checksum = digests
                    .iter()
                    .find_map(|(digest, file)| (*file == asset.name).then_some(*digest))?;
                Some(
                    PluginRelease::new(artifact, asset.size, checksum)
                        .with_download_url(&asset.browser_download_url),
                )
            })
            .collect())
    }
}

impl<F: Fetcher> ReleaseSource for GithubReleases<F> {
    fn list_releases(&self, address: &SourceAddress) -> Result<Vec<PluginRelease>, PluginError> {
        let url = self.releases_url(address);
        debug!(target: SOURCE_TARGET, %url, "listing releases");
        let body = self.fetcher.fetch(&url)?;
        let listing: Vec<GithubRelease> =
            serde_json::from_slice(&body).map_err(|error| PluginError::InvalidReleaseCatalog {
                address: address.to_string(),
                message: error.to_string(),
            })?;

        let mut releases = Vec::new();
        for release in listing.iter().filter(|release| !release.draft) {
            releases.extend(self.releases_of(address, release)?);
        }
        Ok(releases)
    }

    fn fetch(&self, release: &PluginRelease) -> Result<Vec<u8>, PluginError> {
        let url = release
            .download_url()
            .ok_or_else(|| PluginError::Fetch {
                url: release.filename(),
                message: String::from("release has no download URL"),
            })?;
        debug!(target: SOURCE_TARGET, url, size = release.size(), "fetching artifact");
        self.fetcher.fetch(url)
    }
}

/// Parses `<hex>  <filename>` lines. Blank lines are ignored; Go-style binary
/// markers (`*filename`) are tolerated.
fn parse_sums<'a>(
    address: &SourceAddress,
    sums_name: &str,
    content: &'a str,
) -> Result<Vec<(Checksum, &'a str)>, PluginError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (digest, file) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| invalid_sums(address, sums_name, line))?;
            let digest: Checksum = digest
                .parse()
                .map_err(|_| invalid_sums(address, sums_name, line))?;
            let file = file.trim_start();
            Ok((digest, file.strip_prefix('*').unwrap_or(file)))
        })
        .collect()
}

fn invalid_sums(address: &SourceAddress, sums_name: &str, line: &str) -> PluginError {
    PluginError::InvalidReleaseCatalog {
        address: address.to_string(),
        message: format!("{sums_name}: malformed line '{line}'"),
    }
}

#[cfg(test)]
mod tests;

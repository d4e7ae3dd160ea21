//! Idempotent installation of verified plugin binaries.
//!
//! The installer owns one plugin root. A release is installed to
//! `<root>/<host>/<namespace>/<name>/<artifact filename>` with a
//! `_SHA256SUM` sidecar next to it. Every write goes through a temporary
//! file in the destination directory that is moved into place only once it
//! is complete, so readers never observe a partial binary. A binary that is
//! already present is verified instead of rewritten.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::address::SourceAddress;
use crate::checksum::{self, Checksum};
use crate::discovery::scan_layout;
use crate::error::PluginError;
use crate::platform::Platform;
use crate::registry::InstalledPlugin;
use crate::release::{PluginRelease, select_release};
use crate::source::ReleaseSource;
use crate::version::{HOST_API_VERSION, VersionRequirement};

/// Tracing target for installation.
const INSTALLER_TARGET: &str = "kiln_plugins::installer";

#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Installs, verifies and removes plugin binaries under one root directory.
#[derive(Debug, Clone)]
pub struct Installer {
    root: PathBuf,
}

impl Installer {
    /// Creates an installer rooted at `root`. Nothing is created until the
    /// first install.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the plugin root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns where `release` of `address` lives under this root.
    #[must_use]
    pub fn binary_path(&self, address: &SourceAddress, release: &PluginRelease) -> PathBuf {
        self.root
            .join(address.relative_dir())
            .join(release.filename())
    }

    /// Installs `bytes` as `release` of `address`.
    ///
    /// When the binary is already present and matches the release checksum,
    /// nothing is written except a missing or stale sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidReleaseCatalog`] when `release` is an
    /// artifact of another plugin, [`PluginError::ChecksumMismatch`] when the
    /// fetched bytes or an existing binary do not match the release, and
    /// [`PluginError::ReadFailure`] or [`PluginError::WriteFailure`] for
    /// filesystem errors.
    pub fn install(
        &self,
        address: &SourceAddress,
        release: &PluginRelease,
        bytes: &[u8],
    ) -> Result<InstalledPlugin, PluginError> {
        if release.artifact().plugin() != address.name() {
            return Err(PluginError::InvalidReleaseCatalog {
                address: address.to_string(),
                message: format!(
                    "release '{}' belongs to plugin '{}'",
                    release.filename(),
                    release.artifact().plugin()
                ),
            });
        }

        let path = self.binary_path(address, release);
        if let Some(existing) = self.reuse_existing(address, release, &path)? {
            return Ok(existing);
        }

        checksum::verify_bytes(Path::new(&release.filename()), bytes, release.checksum())?;

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|error| PluginError::write(dir, error))?;

        match write_new(dir, &path, bytes, true) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                // Another installer won the race; trust nothing and verify.
                debug!(
                    target: INSTALLER_TARGET,
                    path = %path.display(),
                    "binary appeared concurrently, verifying"
                );
                return self
                    .reuse_existing(address, release, &path)?
                    .ok_or_else(|| PluginError::write(&path, error));
            }
            Err(error) => return Err(PluginError::write(&path, error)),
        }

        write_sidecar(&path, release.checksum())?;
        info!(
            target: INSTALLER_TARGET,
            address = %address,
            version = %release.version(),
            platform = %release.platform(),
            path = %path.display(),
            "installed plugin"
        );
        Ok(InstalledPlugin::new(
            address.clone(),
            release.artifact(),
            path,
            release.checksum(),
        ))
    }

    /// Resolves `requirement` against `source`, then installs the chosen
    /// release for `platform`.
    ///
    /// Nothing on disk is touched before a release has been selected, and an
    /// already-installed release is verified without fetching it again.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NoCompatibleRelease`] when nothing matches,
    /// errors from the source when listing or fetching fails, and any error
    /// [`Installer::install`] returns.
    pub fn install_from_source<S>(
        &self,
        address: &SourceAddress,
        requirement: &VersionRequirement,
        source: &S,
        platform: &Platform,
    ) -> Result<InstalledPlugin, PluginError>
    where
        S: ReleaseSource + ?Sized,
    {
        let releases = source.list_releases(address)?;
        debug!(
            target: INSTALLER_TARGET,
            address = %address,
            releases = releases.len(),
            "listed releases"
        );
        let release = select_release(address, requirement, &releases, platform, HOST_API_VERSION)?;

        let path = self.binary_path(address, release);
        if let Some(existing) = self.reuse_existing(address, release, &path)? {
            info!(
                target: INSTALLER_TARGET,
                address = %address,
                version = %release.version(),
                "plugin already installed"
            );
            return Ok(existing);
        }

        let bytes = source.fetch(release)?;
        self.install(address, release, &bytes)
    }

    /// Removes installed versions of `address`. `None` removes every version;
    /// otherwise only versions matching the requirement are removed, for all
    /// platforms. Returns the removed binary paths.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ReadFailure`] when the root cannot be scanned
    /// and [`PluginError::WriteFailure`] when a file cannot be removed.
    pub fn uninstall(
        &self,
        address: &SourceAddress,
        requirement: Option<&VersionRequirement>,
    ) -> Result<Vec<PathBuf>, PluginError> {
        // Sidecars are not checked: half-written installs must stay removable.
        let located = scan_layout(&self.root)?;
        let mut removed = Vec::new();
        for entry in located
            .iter()
            .filter(|entry| &entry.address == address)
            .filter(|entry| requirement.is_none_or(|req| req.matches(entry.artifact.version())))
        {
            remove_if_present(&entry.path)?;
            remove_if_present(&checksum::sidecar_path(&entry.path))?;
            info!(
                target: INSTALLER_TARGET,
                address = %address,
                version = %entry.artifact.version(),
                platform = %entry.artifact.platform(),
                "removed plugin"
            );
            removed.push(entry.path.clone());
        }
        self.prune(address);
        Ok(removed)
    }

    /// Verifies a binary already at `path`. `Ok(None)` means nothing is
    /// there; a present binary either matches or is a hard error.
    fn reuse_existing(
        &self,
        address: &SourceAddress,
        release: &PluginRelease,
        path: &Path,
    ) -> Result<Option<InstalledPlugin>, PluginError> {
        match fs::symlink_metadata(path) {
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(PluginError::read(path, error)),
        }

        checksum::verify_file(path, release.checksum())?;

        let sidecar = checksum::sidecar_path(path);
        if checksum::read_sidecar(&sidecar)? != Some(release.checksum()) {
            warn!(
                target: INSTALLER_TARGET,
                path = %sidecar.display(),
                "repairing missing or stale checksum sidecar"
            );
            write_sidecar(path, release.checksum())?;
        }

        Ok(Some(InstalledPlugin::new(
            address.clone(),
            release.artifact(),
            path,
            release.checksum(),
        )))
    }

    /// Removes empty directories left behind under the root for `address`.
    fn prune(&self, address: &SourceAddress) {
        let mut dir = self.root.join(address.relative_dir());
        while dir.starts_with(&self.root) && dir != self.root {
            // `remove_dir` refuses non-empty directories, which ends the walk.
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            debug!(target: INSTALLER_TARGET, path = %dir.display(), "pruned empty directory");
            if !dir.pop() {
                break;
            }
        }
    }
}

/// Writes `bytes` to a temporary file in `dir` and moves it to `path`,
/// failing with [`io::ErrorKind::AlreadyExists`] if `path` exists.
fn write_new(dir: &Path, path: &Path, bytes: &[u8], executable: bool) -> io::Result<()> {
    let temp = staged(dir, bytes, executable)?;
    temp.persist_noclobber(path).map_err(|error| error.error)?;
    Ok(())
}

/// Writes the sidecar for `binary`, replacing any previous content.
fn write_sidecar(binary: &Path, digest: Checksum) -> Result<(), PluginError> {
    let sidecar = checksum::sidecar_path(binary);
    let dir = sidecar.parent().unwrap_or_else(|| Path::new("."));
    let temp = staged(dir, digest.to_string().as_bytes(), false)
        .map_err(|error| PluginError::write(&sidecar, error))?;
    temp.persist(&sidecar)
        .map_err(|error| PluginError::write(&sidecar, error.error))?;
    Ok(())
}

fn staged(dir: &Path, bytes: &[u8], executable: bool) -> io::Result<NamedTempFile> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    if executable {
        make_executable(temp.as_file())?;
    }
    Ok(temp)
}

#[cfg(unix)]
fn make_executable(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn make_executable(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), PluginError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(PluginError::write(path, error)),
    }
}

//! Discovery of installed plugin binaries.
//!
//! Discovery is a read-only scan of one or more plugin roots. A file counts as
//! an installed plugin only when its location and name follow the install
//! layout and its sidecar records the digest of its current content. Anything
//! else is skipped with a warning so that a single stray or tampered file
//! never hides the rest of the installation.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::thread;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::address::SourceAddress;
use crate::artifact::ArtifactName;
use crate::checksum::{self, Checksum};
use crate::error::PluginError;
use crate::registry::{InstalledPlugin, PluginRegistry};

/// Tracing target for discovery.
const DISCOVERY_TARGET: &str = "kiln_plugins::discovery";

/// Depth of a binary below its root: `<host>/<namespace>/<name>/<file>`.
const LAYOUT_DEPTH: usize = 4;

/// Scans every root concurrently and merges the results.
///
/// Missing roots contribute nothing. A root that cannot be scanned is logged
/// and skipped. When two roots hold the same address, version and platform,
/// the root listed later wins.
#[must_use]
pub fn discover<I, P>(roots: I) -> PluginRegistry
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let roots: Vec<PathBuf> = roots
        .into_iter()
        .map(|root| root.as_ref().to_path_buf())
        .collect();

    let scanned: Vec<Vec<InstalledPlugin>> = thread::scope(|scope| {
        let handles: Vec<_> = roots
            .iter()
            .map(|root| scope.spawn(move || discover_root(root)))
            .collect();
        handles
            .into_iter()
            .zip(&roots)
            .map(|(handle, root)| match handle.join() {
                Ok(Ok(found)) => found,
                Ok(Err(error)) => {
                    warn!(
                        target: DISCOVERY_TARGET,
                        root = %root.display(),
                        %error,
                        "skipping unreadable plugin root"
                    );
                    Vec::new()
                }
                Err(_) => {
                    warn!(
                        target: DISCOVERY_TARGET,
                        root = %root.display(),
                        "plugin root scan panicked"
                    );
                    Vec::new()
                }
            })
            .collect()
    });

    let mut registry = PluginRegistry::new();
    for plugin in scanned.into_iter().flatten() {
        if registry.contains(&plugin) {
            warn!(
                target: DISCOVERY_TARGET,
                address = %plugin.address(),
                version = %plugin.version(),
                platform = %plugin.platform(),
                path = %plugin.path().display(),
                "plugin installed in several roots, using the later root"
            );
        }
        registry.insert(plugin);
    }
    registry
}

/// Scans a single root.
///
/// # Errors
///
/// Returns [`PluginError::ReadFailure`] when the root exists but cannot be
/// read. Problems with individual entries are logged and skipped.
pub fn discover_root(root: &Path) -> Result<Vec<InstalledPlugin>, PluginError> {
    let found: Vec<InstalledPlugin> = scan_layout(root)?
        .into_iter()
        .filter_map(verify)
        .collect();
    debug!(
        target: DISCOVERY_TARGET,
        root = %root.display(),
        count = found.len(),
        "scanned plugin root"
    );
    Ok(found)
}

/// A file placed according to the install layout whose name parses as an
/// artifact. Its checksum has not been looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LayoutEntry {
    pub(crate) address: SourceAddress,
    pub(crate) artifact: ArtifactName,
    pub(crate) path: PathBuf,
}

/// Lists every file under `root` that sits where the install layout puts
/// binaries, without checking sidecars. A missing root yields nothing.
pub(crate) fn scan_layout(root: &Path) -> Result<Vec<LayoutEntry>, PluginError> {
    match std::fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(PluginError::read(
                root,
                io::Error::new(io::ErrorKind::InvalidInput, "plugin root is not a directory"),
            ));
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(PluginError::read(root, error)),
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(LAYOUT_DEPTH) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(target: DISCOVERY_TARGET, %error, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() != LAYOUT_DEPTH || !entry.file_type().is_file() {
            continue;
        }
        entries.extend(locate(root, entry.path()));
    }
    Ok(entries)
}

/// Matches a candidate file against the layout and the artifact grammar.
fn locate(root: &Path, path: &Path) -> Option<LayoutEntry> {
    let relative = path.strip_prefix(root).ok()?;
    let [host, namespace, name, file] = normal_components(relative)?;

    // Sidecars and unrelated files live alongside binaries; ignore them
    // quietly.
    let artifact = ArtifactName::parse(file)?;

    let address = match SourceAddress::from_parts(host, namespace, name) {
        Ok(address) => address,
        Err(error) => {
            debug!(target: DISCOVERY_TARGET, path = %path.display(), %error, "not a plugin directory");
            return None;
        }
    };
    if artifact.plugin() != address.name() {
        warn!(
            target: DISCOVERY_TARGET,
            path = %path.display(),
            "binary name does not match its directory"
        );
        return None;
    }
    Some(LayoutEntry {
        address,
        artifact,
        path: path.to_path_buf(),
    })
}

/// Accepts a located binary only when its sidecar records its current digest.
fn verify(entry: LayoutEntry) -> Option<InstalledPlugin> {
    let LayoutEntry {
        address,
        artifact,
        path,
    } = entry;
    let recorded = match checksum::read_sidecar(&checksum::sidecar_path(&path)) {
        Ok(Some(recorded)) => recorded,
        Ok(None) => {
            warn!(target: DISCOVERY_TARGET, path = %path.display(), "missing or unreadable checksum sidecar");
            return None;
        }
        Err(error) => {
            warn!(target: DISCOVERY_TARGET, path = %path.display(), %error, "cannot read checksum sidecar");
            return None;
        }
    };
    match Checksum::of_file(&path) {
        Ok(actual) if actual == recorded => {}
        Ok(actual) => {
            warn!(
                target: DISCOVERY_TARGET,
                path = %path.display(),
                expected = %recorded,
                %actual,
                "checksum mismatch, ignoring binary"
            );
            return None;
        }
        Err(error) => {
            warn!(target: DISCOVERY_TARGET, path = %path.display(), %error, "cannot hash binary");
            return None;
        }
    }

    Some(InstalledPlugin::new(address, &artifact, path, recorded))
}

fn normal_components(relative: &Path) -> Option<[&str; LAYOUT_DEPTH]> {
    let parts: Vec<&str> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    parts.try_into().ok()
}

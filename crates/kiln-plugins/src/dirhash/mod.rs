//! Order-independent directory hashing.
//!
//! [`hash_dir`] summarises a whole tree in one string, which makes
//! "nothing changed on disk" a single equality check. Each regular file
//! contributes a `"<sha256 hex>  <relative path>\n"` line; the lines are sorted
//! by path and hashed again, and the result is written as `h1:` followed by
//! standard base64. The format matches Go module directory hashes, so values
//! can be cross-checked with other tooling.

use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::PluginError;

/// Prefix identifying the hash format.
pub const HASH_PREFIX: &str = "h1:";

/// Lists every regular file below `root` as a `/`-separated relative path, in
/// sorted order. A missing root has no files.
///
/// # Errors
///
/// Returns [`PluginError::ReadFailure`] when the tree cannot be walked.
pub fn dir_files(root: &Path) -> Result<Vec<String>, PluginError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(root).to_path_buf();
            PluginError::read(path, io::Error::other(error))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

/// Hashes the tree under `root`.
///
/// # Errors
///
/// Returns [`PluginError::ReadFailure`] when a file cannot be listed or read.
pub fn hash_dir(root: &Path) -> Result<String, PluginError> {
    let mut summary = Sha256::new();
    for file in dir_files(root)? {
        if file.contains('\n') {
            return Err(PluginError::read(
                root.join(&file),
                io::Error::new(io::ErrorKind::InvalidData, "file name contains a newline"),
            ));
        }
        let digest = Checksum::of_file(&root.join(&file))?;
        summary.update(format!("{digest}  {file}\n").as_bytes());
    }
    Ok(format!("{HASH_PREFIX}{}", STANDARD.encode(summary.finalize())))
}

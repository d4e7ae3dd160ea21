//! SHA-256 checksums and sidecar files.
//!
//! A [`Checksum`] is the raw 32-byte digest. Its textual form is 64 lower-case
//! hex characters, which is also the entire content of a `_SHA256SUM` sidecar.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::artifact::SIDECAR_SUFFIX;
use crate::error::PluginError;

const DIGEST_LEN: usize = 32;
const READ_CHUNK: usize = 64 * 1024;

/// A SHA-256 digest.
///
/// # Example
///
/// ```
/// use kiln_plugins::Checksum;
///
/// let checksum = Checksum::of_bytes(b"1");
/// assert_eq!(
///     checksum.to_string(),
///     "6b86b273ff34fce19d6b804eff5a3f5747ada4eaa22f1d49c01e52ddb7875b4b"
/// );
/// assert_eq!(checksum.to_string().parse::<Checksum>().ok(), Some(checksum));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; DIGEST_LEN]);

impl Checksum {
    /// Hashes an in-memory buffer.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Hashes everything readable from `reader`.
    ///
    /// # Errors
    ///
    /// Propagates read errors from `reader`.
    pub fn of_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0_u8; READ_CHUNK];
        loop {
            let read = reader.read(&mut buffer)?;
            let Some(chunk) = buffer.get(..read) else {
                break;
            };
            if chunk.is_empty() {
                break;
            }
            hasher.update(chunk);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// Hashes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ReadFailure`] when the file cannot be opened or
    /// read.
    pub fn of_file(path: &Path) -> Result<Self, PluginError> {
        let file = File::open(path).map_err(|error| PluginError::read(path, error))?;
        Self::of_reader(file).map_err(|error| PluginError::read(path, error))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// Error returned when text is not a SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} hex characters, got '{input}'")]
pub struct ParseChecksumError {
    input: String,
    expected: usize,
}

impl FromStr for Checksum {
    type Err = ParseChecksumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let mut digest = [0_u8; DIGEST_LEN];
        hex::decode_to_slice(trimmed, &mut digest).map_err(|_| ParseChecksumError {
            input: trimmed.to_owned(),
            expected: DIGEST_LEN * 2,
        })?;
        Ok(Self(digest))
    }
}

/// Streams `path` through SHA-256 and compares it with `expected`.
///
/// # Errors
///
/// Returns [`PluginError::ReadFailure`] if the file cannot be read and
/// [`PluginError::ChecksumMismatch`] if the digest differs.
pub fn verify_file(path: &Path, expected: Checksum) -> Result<(), PluginError> {
    let actual = Checksum::of_file(path)?;
    compare(path, expected, actual)
}

/// Compares fetched bytes with `expected` before they reach the filesystem.
/// `label` names the bytes in the error (usually the artifact filename).
///
/// # Errors
///
/// Returns [`PluginError::ChecksumMismatch`] if the digest differs.
pub fn verify_bytes(label: &Path, bytes: &[u8], expected: Checksum) -> Result<(), PluginError> {
    compare(label, expected, Checksum::of_bytes(bytes))
}

fn compare(path: &Path, expected: Checksum, actual: Checksum) -> Result<(), PluginError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PluginError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}

/// Returns the sidecar path that belongs to `binary`.
#[must_use]
pub fn sidecar_path(binary: &Path) -> PathBuf {
    let mut name = binary.file_name().unwrap_or_default().to_os_string();
    name.push(SIDECAR_SUFFIX);
    binary.with_file_name(name)
}

/// Reads a sidecar file.
///
/// Returns `Ok(None)` when the sidecar does not exist or does not contain a
/// digest; both cases mean "no usable record".
///
/// # Errors
///
/// Returns [`PluginError::ReadFailure`] for I/O errors other than absence.
pub fn read_sidecar(path: &Path) -> Result<Option<Checksum>, PluginError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.parse().ok()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(PluginError::read(path, error)),
    }
}

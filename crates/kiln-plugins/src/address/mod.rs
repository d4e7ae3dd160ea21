//! Plugin source addresses.
//!
//! A [`SourceAddress`] names a plugin independently of its version, as
//! `host/namespace/name`. The host doubles as the release source, so only
//! hosts this crate knows how to fetch from are accepted. Parsing happens
//! before any filesystem or network activity.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// The single release host supported today.
pub const GITHUB_HOST: &str = "github.com";

/// Prefix every plugin binary and release repository carries.
pub const BINARY_PREFIX: &str = "kiln-plugin-";

/// Hierarchical plugin identity: `host/namespace/name`.
///
/// All segments are stored in lower case.
///
/// # Example
///
/// ```
/// use kiln_plugins::SourceAddress;
///
/// let address = SourceAddress::parse("github.com/Acme/Comment").expect("valid address");
/// assert_eq!(address.namespace(), "acme");
/// assert_eq!(address.name(), "comment");
/// assert_eq!(address.to_string(), "github.com/acme/comment");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceAddress {
    host: String,
    namespace: String,
    name: String,
}

impl SourceAddress {
    /// Parses and validates a raw source address.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MalformedAddress`] when the address does not have
    /// exactly three non-empty segments of permitted characters, and
    /// [`PluginError::UnsupportedHost`] when the host is not
    /// [`GITHUB_HOST`].
    pub fn parse(raw: &str) -> Result<Self, PluginError> {
        let trimmed = raw.trim();
        let segments: Vec<&str> = trimmed.split('/').collect();
        let [host, namespace, name] = segments.as_slice() else {
            return Err(malformed(
                raw,
                format!(
                    "expected 'host/namespace/name', found {} segment(s)",
                    segments.len()
                ),
            ));
        };

        let host = host.to_ascii_lowercase();
        if host != GITHUB_HOST {
            return Err(PluginError::UnsupportedHost {
                input: raw.to_owned(),
                host,
                supported: GITHUB_HOST,
            });
        }

        let namespace = validate_segment(raw, "namespace", namespace)?;
        let name = validate_segment(raw, "name", name)?;
        if let Some(stripped) = name.strip_prefix(BINARY_PREFIX) {
            return Err(malformed(
                raw,
                format!("drop the '{BINARY_PREFIX}' prefix and use '{stripped}' as the name"),
            ));
        }

        Ok(Self {
            host,
            namespace,
            name,
        })
    }

    /// Builds an address from already-validated parts.
    ///
    /// Used when the parts come from the on-disk layout, which only ever
    /// contains addresses that passed [`SourceAddress::parse`].
    pub(crate) fn from_parts(host: &str, namespace: &str, name: &str) -> Result<Self, PluginError> {
        Self::parse(&format!("{host}/{namespace}/{name}"))
    }

    /// Returns the host segment.
    #[must_use]
    pub const fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Returns the namespace (organisation or user) segment.
    #[must_use]
    pub const fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Returns the short plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the binary name, `kiln-plugin-<name>`.
    #[must_use]
    pub fn binary_name(&self) -> String {
        format!("{BINARY_PREFIX}{}", self.name)
    }

    /// Returns the directory holding this plugin's files, relative to a
    /// plugin root.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        [self.host(), self.namespace(), self.name()].iter().collect()
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.namespace, self.name)
    }
}

impl FromStr for SourceAddress {
    type Err = PluginError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for SourceAddress {
    type Error = PluginError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<SourceAddress> for String {
    fn from(address: SourceAddress) -> Self {
        address.to_string()
    }
}

fn validate_segment(raw: &str, label: &str, segment: &str) -> Result<String, PluginError> {
    if segment.is_empty() {
        return Err(malformed(raw, format!("{label} segment is empty")));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(malformed(
            raw,
            format!("{label} segment contains invalid character '{bad}'"),
        ));
    }
    if segment.starts_with('.') {
        return Err(malformed(raw, format!("{label} segment must not start with '.'")));
    }
    Ok(segment.to_ascii_lowercase())
}

fn malformed(raw: &str, reason: String) -> PluginError {
    PluginError::MalformedAddress {
        input: raw.to_owned(),
        reason,
    }
}

//! Version requirements and plugin API compatibility tags.
//!
//! Requirements accept three forms: an exact version (`v0.2.18`), a
//! comma-separated comparator expression (`>= 1.0, < 2.0`, including the
//! pessimistic `~> 1.2` operator), or the literal `latest`. Matching is a pure
//! predicate over [`semver::Version`].

use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// Keyword selecting the newest stable version.
pub const LATEST: &str = "latest";

/// Plugin API version spoken by this host.
pub const HOST_API_VERSION: ApiVersion = ApiVersion::new(5, 0);

/// Parses a plugin version, tolerating a leading `v`.
///
/// # Errors
///
/// Returns [`PluginError::InvalidVersionSyntax`] when the text is not a full
/// `major.minor.patch` semantic version.
pub fn parse_version(raw: &str) -> Result<Version, PluginError> {
    let trimmed = raw.trim();
    Version::parse(strip_v(trimmed)).map_err(|error| PluginError::InvalidVersionSyntax {
        input: raw.to_owned(),
        message: error.to_string(),
    })
}

/// Constraint over candidate plugin versions.
///
/// # Example
///
/// ```
/// use kiln_plugins::VersionRequirement;
/// use semver::Version;
///
/// let requirement = VersionRequirement::parse(">= 0.2.0, < 0.3.0").expect("valid");
/// assert!(requirement.matches(&Version::new(0, 2, 19)));
/// assert!(!requirement.matches(&Version::new(0, 3, 0)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionRequirement {
    /// Any version; stable releases are preferred during selection.
    #[default]
    Latest,
    /// Exactly one version.
    Exact(Version),
    /// A comparator expression.
    Range {
        /// The requirement as the user wrote it.
        raw: String,
        /// The lowered semver requirement.
        requirement: VersionReq,
    },
}

impl VersionRequirement {
    /// Parses a requirement string.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionSyntax`] for empty input or text
    /// that is neither a version, a comparator expression, nor `latest`.
    pub fn parse(raw: &str) -> Result<Self, PluginError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "version requirement is empty"));
        }
        if trimmed.eq_ignore_ascii_case(LATEST) {
            return Ok(Self::Latest);
        }
        if let Ok(version) = Version::parse(strip_v(trimmed)) {
            return Ok(Self::Exact(version));
        }

        let lowered = trimmed
            .split(',')
            .map(lower_comparator)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| invalid(raw, &message))?
            .join(", ");
        let requirement =
            VersionReq::parse(&lowered).map_err(|error| invalid(raw, &error.to_string()))?;
        Ok(Self::Range {
            raw: trimmed.to_owned(),
            requirement,
        })
    }

    /// Returns `true` when `version` satisfies the requirement.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Latest => true,
            Self::Exact(expected) => expected == version,
            Self::Range { requirement, .. } => requirement.matches(version),
        }
    }

    /// Returns `true` for the `latest` keyword.
    #[must_use]
    pub const fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(LATEST),
            Self::Exact(version) => write!(f, "v{version}"),
            Self::Range { raw, .. } => f.write_str(raw),
        }
    }
}

impl FromStr for VersionRequirement {
    type Err = PluginError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// Rewrites one comparator into the syntax `semver` understands.
fn lower_comparator(comparator: &str) -> Result<String, String> {
    let trimmed = comparator.trim();
    if trimmed.is_empty() {
        return Err(String::from("empty comparator"));
    }
    if let Some(rest) = trimmed.strip_prefix("~>") {
        return lower_pessimistic(rest.trim());
    }
    let split = trimmed
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^' | '!'))
        .unwrap_or(trimmed.len());
    let (operator, version) = trimmed.split_at(split);
    let version = strip_v(version.trim());
    if operator == "!=" || operator == "!" {
        return Err(format!("unsupported operator '{operator}'"));
    }
    // A bare version inside an expression means "this version", as it does
    // on its own.
    let operator = if operator.is_empty() { "=" } else { operator };
    Ok(format!("{operator}{version}"))
}

/// Lowers `~> X`, `~> X.Y`, and `~> X.Y.Z` into explicit bounds: the last
/// given component may increase, the ones before it may not.
fn lower_pessimistic(version: &str) -> Result<String, String> {
    let version = strip_v(version);
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let parts = core
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| format!("invalid pessimistic constraint '~> {version}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let pre_suffix = pre.map(|p| format!("-{p}")).unwrap_or_default();
    match parts.as_slice() {
        [major] => Ok(format!(">={major}.0.0{pre_suffix}")),
        [major, minor] => Ok(format!(
            ">={major}.{minor}.0{pre_suffix}, <{}.0.0",
            major.saturating_add(1)
        )),
        [major, minor, patch] => Ok(format!(
            ">={major}.{minor}.{patch}{pre_suffix}, <{major}.{}.0",
            minor.saturating_add(1)
        )),
        _ => Err(format!("invalid pessimistic constraint '~> {version}'")),
    }
}

fn strip_v(raw: &str) -> &str {
    raw.strip_prefix('v')
        .or_else(|| raw.strip_prefix('V'))
        .unwrap_or(raw)
}

fn invalid(raw: &str, message: &str) -> PluginError {
    PluginError::InvalidVersionSyntax {
        input: raw.to_owned(),
        message: message.to_owned(),
    }
}

/// Plugin API compatibility tag, written `x<major>.<minor>` in filenames.
///
/// A plugin built against API `x5.0` can be loaded by any host speaking
/// `x5.N`; a different major is never compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    major: u16,
    minor: u16,
}

impl ApiVersion {
    /// Creates an API version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns the major component.
    #[must_use]
    pub const fn major(self) -> u16 {
        self.major
    }

    /// Returns the minor component.
    #[must_use]
    pub const fn minor(self) -> u16 {
        self.minor
    }

    /// Returns `true` when a plugin built for `self` can be loaded by a host
    /// speaking `host`.
    #[must_use]
    pub const fn is_compatible_with(self, host: Self) -> bool {
        self.major == host.major && self.minor <= host.minor
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = PluginError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let body = raw.strip_prefix('x').unwrap_or(raw);
        let (major, minor) = body
            .split_once('.')
            .ok_or_else(|| invalid(raw, "expected 'x<major>.<minor>'"))?;
        let major = major
            .parse()
            .map_err(|_| invalid(raw, "API major is not a number"))?;
        let minor = minor
            .parse()
            .map_err(|_| invalid(raw, "API minor is not a number"))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = PluginError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.to_string()
    }
}

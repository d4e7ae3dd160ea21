//! Operating system and architecture pairs in release vocabulary.
//!
//! Release artifacts name platforms the way Go toolchains do (`darwin`,
//! `amd64`), so the Rust target constants are translated on the way in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An (operating system, architecture) pair.
///
/// # Example
///
/// ```
/// use kiln_plugins::Platform;
///
/// let platform = Platform::new("linux", "amd64");
/// assert_eq!(platform.to_string(), "linux_amd64");
/// assert_eq!(platform.executable_suffix(), "");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Creates a platform, normalising both parts to lower case.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into().to_ascii_lowercase(),
            arch: arch.into().to_ascii_lowercase(),
        }
    }

    /// Returns the platform this process is running on.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            release_os(std::env::consts::OS),
            release_arch(std::env::consts::ARCH),
        )
    }

    /// Returns the operating system name.
    #[must_use]
    pub const fn os(&self) -> &str {
        self.os.as_str()
    }

    /// Returns the architecture name.
    #[must_use]
    pub const fn arch(&self) -> &str {
        self.arch.as_str()
    }

    /// Returns the suffix executables carry on this platform.
    #[must_use]
    pub fn executable_suffix(&self) -> &'static str {
        if self.os == "windows" { ".exe" } else { "" }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

fn release_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        other => other,
    }
}

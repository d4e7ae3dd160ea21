//! Plugin lifecycle management for the Kiln build orchestrator.
//!
//! Kiln delegates builders, provisioners, post-processors, and data sources
//! to external plugin binaries. This crate owns everything between a user
//! naming a plugin and Kiln calling into it:
//!
//! - **Resolution.** A [`SourceAddress`] (`github.com/<namespace>/<name>`)
//!   and a [`VersionRequirement`] select one [`PluginRelease`] for the
//!   running [`Platform`] and host API ([`select_release`]).
//! - **Installation.** The [`Installer`] verifies the fetched bytes against
//!   the release's SHA-256 [`Checksum`] before anything touches disk, writes
//!   the binary and its `_SHA256SUM` sidecar without clobbering, and is a
//!   no-op when the plugin is already present.
//! - **Discovery.** [`discover`] walks one or more plugin roots, re-verifies
//!   every sidecar, and builds a [`PluginRegistry`].
//! - **Invocation.** A [`PluginBridge`] spawns an installed binary, validates
//!   its handshake line, connects over the announced socket, and forwards
//!   calls. Plugins themselves are written against [`PluginServer`].
//!
//! # Layout
//!
//! ```text
//! <root>/github.com/<namespace>/<name>/
//!     kiln-plugin-<name>_v<version>_x<api>_<os>_<arch>[.exe]
//!     kiln-plugin-<name>_v<version>_x<api>_<os>_<arch>[.exe]_SHA256SUM
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_plugins::{Installer, Platform, SourceAddress, VersionRequirement, discover};
//! # use kiln_plugins::ReleaseSource;
//! # fn source() -> Box<dyn ReleaseSource> { unimplemented!() }
//!
//! let address = SourceAddress::parse("github.com/hashicorp/comment")?;
//! let requirement = VersionRequirement::parse(">= 0.2.0")?;
//! let installer = Installer::new("/var/lib/kiln/plugins");
//! let installed =
//!     installer.install_from_source(&address, &requirement, &*source(), &Platform::current())?;
//!
//! let registry = discover([installer.root()]);
//! assert!(registry.latest(&address, &requirement, &Platform::current()).is_some());
//! # drop(installed);
//! # Ok::<(), kiln_plugins::PluginError>(())
//! ```

pub mod address;
pub mod artifact;
pub mod bridge;
pub mod checksum;
pub mod dirhash;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod installer;
pub mod platform;
pub mod protocol;
pub mod registry;
pub mod release;
pub mod server;
pub mod source;
pub mod transport;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(test)]
mod tests;

pub use self::address::SourceAddress;
pub use self::artifact::ArtifactName;
pub use self::bridge::{BridgeConfig, BridgeState, PluginBridge, TerminationHandle};
pub use self::checksum::Checksum;
pub use self::discovery::{discover, discover_root};
pub use self::error::PluginError;
pub use self::handshake::{Handshake, HandshakeContract};
pub use self::installer::Installer;
pub use self::platform::Platform;
pub use self::protocol::{CapabilityKind, PluginDescription};
pub use self::registry::{InstalledPlugin, PluginRegistry};
pub use self::release::{PluginRelease, select_release};
pub use self::server::{ComponentHandler, PluginServer, ServeError};
pub use self::source::{Fetcher, GithubReleases, ReleaseSource};
pub use self::version::{ApiVersion, HOST_API_VERSION, VersionRequirement};

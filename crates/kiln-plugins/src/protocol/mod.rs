//! RPC messages exchanged once the handshake has completed.
//!
//! Every message is one JSON object on one line. The host sends
//! [`RequestEnvelope`]s and the plugin answers each with a
//! [`ResponseEnvelope`] carrying the same `id`:
//!
//! ```text
//! {"id":1,"request":{"kind":"describe"}}
//! {"id":1,"outcome":{"status":"ok","value":{"version":"0.2.19", ...}}}
//! {"id":2,"request":{"kind":"call","capability":"provisioner","component":"comment","method":"prepare","payload":{}}}
//! {"id":2,"outcome":{"status":"error","message":"bad input"}}
//! ```

mod client;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::ApiVersion;

pub use self::client::{RpcClient, RpcError};

/// Capability kinds a plugin can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Creates machine images.
    Builder,
    /// Configures a running machine.
    Provisioner,
    /// Transforms build artifacts.
    PostProcessor,
    /// Supplies values to configuration.
    DataSource,
}

impl CapabilityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Builder,
        Self::Provisioner,
        Self::PostProcessor,
        Self::DataSource,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Builder => "builder",
            Self::Provisioner => "provisioner",
            Self::PostProcessor => "post_processor",
            Self::DataSource => "data_source",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalised = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalised)
            .ok_or_else(|| format!("unknown capability kind '{raw}'"))
    }
}

/// A request from host to plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Asks the plugin to describe itself.
    Describe,
    /// Invokes a method on a component.
    Call {
        /// Capability kind of the component.
        capability: CapabilityKind,
        /// Component name.
        component: String,
        /// Method name.
        method: String,
        /// Method argument.
        #[serde(default)]
        payload: Value,
    },
    /// Asks the plugin to exit.
    Shutdown,
}

/// The result of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The request succeeded.
    Ok {
        /// Result value.
        #[serde(default)]
        value: Value,
    },
    /// The plugin reported an error.
    Error {
        /// Error text.
        message: String,
    },
}

/// A request on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation identifier.
    pub id: u64,
    /// The request.
    pub request: Request,
}

/// A response on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Identifier of the request being answered.
    pub id: u64,
    /// The outcome.
    pub outcome: Outcome,
}

/// What a plugin reports about itself in answer to [`Request::Describe`].
///
/// # Example
///
/// ```
/// use kiln_plugins::{ApiVersion, CapabilityKind, PluginDescription};
///
/// let description = PluginDescription::new("0.2.19", ApiVersion::new(5, 0))
///     .with_component(CapabilityKind::Provisioner, "comment");
/// assert!(description.provides(CapabilityKind::Provisioner, "comment"));
/// assert!(!description.provides(CapabilityKind::Builder, "comment"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescription {
    version: String,
    api: ApiVersion,
    #[serde(default)]
    builders: Vec<String>,
    #[serde(default)]
    provisioners: Vec<String>,
    #[serde(default)]
    post_processors: Vec<String>,
    #[serde(default)]
    data_sources: Vec<String>,
}

impl PluginDescription {
    /// Creates a description with no components.
    #[must_use]
    pub fn new(version: impl Into<String>, api: ApiVersion) -> Self {
        Self {
            version: version.into(),
            api,
            builders: Vec::new(),
            provisioners: Vec::new(),
            post_processors: Vec::new(),
            data_sources: Vec::new(),
        }
    }

    /// Adds a component; duplicates are ignored.
    #[must_use]
    pub fn with_component(mut self, kind: CapabilityKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let list = self.list_mut(kind);
        if !list.contains(&name) {
            list.push(name);
            list.sort();
        }
        self
    }

    /// Returns the plugin's own version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the API tag the plugin was built against.
    #[must_use]
    pub const fn api(&self) -> ApiVersion {
        self.api
    }

    /// Returns the component names of one kind.
    #[must_use]
    pub fn components(&self, kind: CapabilityKind) -> &[String] {
        match kind {
            CapabilityKind::Builder => &self.builders,
            CapabilityKind::Provisioner => &self.provisioners,
            CapabilityKind::PostProcessor => &self.post_processors,
            CapabilityKind::DataSource => &self.data_sources,
        }
    }

    /// Returns `true` when the plugin declared `name` under `kind`.
    #[must_use]
    pub fn provides(&self, kind: CapabilityKind, name: &str) -> bool {
        self.components(kind).iter().any(|component| component == name)
    }

    fn list_mut(&mut self, kind: CapabilityKind) -> &mut Vec<String> {
        match kind {
            CapabilityKind::Builder => &mut self.builders,
            CapabilityKind::Provisioner => &mut self.provisioners,
            CapabilityKind::PostProcessor => &mut self.post_processors,
            CapabilityKind::DataSource => &mut self.data_sources,
        }
    }
}

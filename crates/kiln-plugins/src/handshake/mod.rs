//! The startup handshake between host and plugin.
//!
//! The host starts a plugin with a magic cookie and the list of app protocol
//! versions it speaks in the environment. The plugin answers with exactly one
//! line on stdout:
//!
//! ```text
//! <core version>|<app version>|<network>|<address>|<transport>
//! ```
//!
//! for example `1|5|tcp|127.0.0.1:50123|jsonl`. Parsing a line only checks
//! its shape; [`HandshakeContract::negotiate`] then decides whether the
//! announced protocol is one this host can speak.

use std::fmt;
use std::str::FromStr;

/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "KILN_PLUGIN_MAGIC_COOKIE";

/// Value of the magic cookie. A plugin refuses to run without it, which stops
/// users from executing plugin binaries directly.
pub const MAGIC_COOKIE_VALUE: &str =
    "6a1f0c5e9b2d47a8b3e1f9c07d4a2e6b8c5f3d1a9e7b0c2d4f6a8b1c3e5d7f90";

/// Environment variable listing the app protocol versions the host speaks.
pub const PROTOCOL_VERSIONS_KEY: &str = "KILN_PLUGIN_PROTOCOL_VERSIONS";

/// Version of the handshake framing itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the RPC contract spoken over the connection.
pub const APP_PROTOCOL_VERSION: u32 = 5;

/// Name of the newline-delimited JSON transport.
pub const JSONL_TRANSPORT: &str = "jsonl";

const FIELD_COUNT: usize = 5;

/// Socket family announced by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// A TCP socket address, `host:port`.
    Tcp,
    /// A unix domain socket path.
    Unix,
}

impl Network {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(format!("unsupported network '{other}'")),
        }
    }
}

/// Where the plugin listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Socket family.
    pub network: Network,
    /// Socket address or path.
    pub address: String,
}

/// A parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    core_version: u32,
    app_version: u32,
    network: String,
    address: String,
    transport: String,
}

impl Handshake {
    /// Builds the line a plugin announces for `endpoint`.
    #[must_use]
    pub fn announce(endpoint: &Endpoint) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version: APP_PROTOCOL_VERSION,
            network: endpoint.network.as_str().to_owned(),
            address: endpoint.address.clone(),
            transport: JSONL_TRANSPORT.to_owned(),
        }
    }

    /// Parses one handshake line. Surrounding whitespace, including the
    /// trailing newline, is ignored.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the line does not have five
    /// `|`-separated fields, the versions are not numbers, or a field is
    /// empty.
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        let fields: Vec<&str> = trimmed.split('|').collect();
        let [core, app, network, address, transport] = fields.as_slice() else {
            return Err(format!(
                "expected {FIELD_COUNT} '|'-separated fields, got {}: '{trimmed}'",
                fields.len()
            ));
        };
        if [network, address, transport].iter().any(|field| field.is_empty()) {
            return Err(format!("handshake has an empty field: '{trimmed}'"));
        }
        let core_version = core
            .parse()
            .map_err(|_| format!("core protocol version '{core}' is not a number"))?;
        let app_version = app
            .parse()
            .map_err(|_| format!("app protocol version '{app}' is not a number"))?;
        Ok(Self {
            core_version,
            app_version,
            network: (*network).to_owned(),
            address: (*address).to_owned(),
            transport: (*transport).to_owned(),
        })
    }

    /// Returns the announced core protocol version.
    #[must_use]
    pub const fn core_version(&self) -> u32 {
        self.core_version
    }

    /// Returns the announced app protocol version.
    #[must_use]
    pub const fn app_version(&self) -> u32 {
        self.app_version
    }

    /// Returns the announced network name.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Returns the announced address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the announced transport name.
    #[must_use]
    pub fn transport(&self) -> &str {
        &self.transport
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.address, self.transport
        )
    }
}

/// What a host requires of a plugin's handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeContract {
    /// Cookie variable name.
    pub cookie_key: &'static str,
    /// Cookie value.
    pub cookie_value: &'static str,
    /// Required core protocol version.
    pub core_version: u32,
    /// Accepted app protocol versions.
    pub app_versions: Vec<u32>,
    /// Accepted transport names.
    pub transports: Vec<&'static str>,
}

impl Default for HandshakeContract {
    fn default() -> Self {
        Self {
            cookie_key: MAGIC_COOKIE_KEY,
            cookie_value: MAGIC_COOKIE_VALUE,
            core_version: CORE_PROTOCOL_VERSION,
            app_versions: vec![APP_PROTOCOL_VERSION],
            transports: vec![JSONL_TRANSPORT],
        }
    }
}

impl HandshakeContract {
    /// Returns the variables the host adds to a plugin's environment.
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            (self.cookie_key.to_owned(), self.cookie_value.to_owned()),
            (PROTOCOL_VERSIONS_KEY.to_owned(), self.protocol_versions()),
        ]
    }

    /// Returns the accepted app versions as a comma-separated list.
    #[must_use]
    pub fn protocol_versions(&self) -> String {
        self.app_versions
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Checks that `handshake` announces something this host can speak and
    /// returns the endpoint to connect to.
    ///
    /// # Errors
    ///
    /// Returns a description of the incompatibility.
    pub fn negotiate(&self, handshake: &Handshake) -> Result<Endpoint, String> {
        if handshake.core_version != self.core_version {
            return Err(format!(
                "core protocol version {} is not supported (expected {})",
                handshake.core_version, self.core_version
            ));
        }
        if !self.app_versions.contains(&handshake.app_version) {
            return Err(format!(
                "app protocol version {} is not supported (expected one of {})",
                handshake.app_version,
                self.protocol_versions()
            ));
        }
        if !self.transports.contains(&handshake.transport.as_str()) {
            return Err(format!("unsupported transport '{}'", handshake.transport));
        }
        let network = handshake.network.parse()?;
        Ok(Endpoint {
            network,
            address: handshake.address.clone(),
        })
    }
}

/// Parses a comma-separated version list as found in
/// [`PROTOCOL_VERSIONS_KEY`]. Unparseable entries are dropped.
#[must_use]
pub fn parse_protocol_versions(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

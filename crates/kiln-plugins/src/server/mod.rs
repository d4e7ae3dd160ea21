//! The plugin side of the bridge.
//!
//! A plugin binary builds a [`PluginServer`], registers its components, and
//! calls [`PluginServer::serve`]. The server checks that it was launched by
//! a host, listens on a loopback port, announces it with the handshake line,
//! and answers requests on the first connection until the host asks it to
//! shut down or hangs up.
//!
//! ```rust,no_run
//! use kiln_plugins::{ApiVersion, CapabilityKind, PluginServer};
//! use serde_json::{Value, json};
//!
//! let server = PluginServer::new("0.1.0", ApiVersion::new(5, 0)).register(
//!     CapabilityKind::Provisioner,
//!     "echo",
//!     |_method: &str, payload: Value| Ok::<_, String>(json!({ "echo": payload })),
//! );
//! server.serve(&mut std::io::stdout())?;
//! # Ok::<(), kiln_plugins::ServeError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::net::{Ipv4Addr, TcpListener};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::handshake::{
    APP_PROTOCOL_VERSION, Endpoint, Handshake, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, Network,
    PROTOCOL_VERSIONS_KEY, parse_protocol_versions,
};
use crate::protocol::{CapabilityKind, Outcome, PluginDescription, Request, RequestEnvelope, ResponseEnvelope};
use crate::transport::{LineTransport, Transport, TransportError};
use crate::version::ApiVersion;

const SERVER_TARGET: &str = "kiln_plugins::server";

/// Errors that stop a plugin server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The process was not launched by a compatible host.
    #[error(transparent)]
    Rejected(#[from] PluginError),

    /// The listening socket could not be set up.
    #[error("failed to listen on loopback: {0}")]
    Listen(#[source] io::Error),

    /// The handshake line could not be written.
    #[error("failed to announce handshake: {0}")]
    Announce(#[source] io::Error),

    /// The connection to the host failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Handles the calls for one registered component.
///
/// Closures of the shape `Fn(&str, Value) -> Result<Value, String>` are
/// handlers.
pub trait ComponentHandler: Send + Sync {
    /// Runs `method` with `payload`. An `Err` is reported to the host as a
    /// plugin error.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the method failed.
    fn handle(&self, method: &str, payload: Value) -> Result<Value, String>;
}

impl<F> ComponentHandler for F
where
    F: Fn(&str, Value) -> Result<Value, String> + Send + Sync,
{
    fn handle(&self, method: &str, payload: Value) -> Result<Value, String> {
        self(method, payload)
    }
}

/// Serves a plugin's components to a host.
pub struct PluginServer {
    description: PluginDescription,
    handlers: BTreeMap<(CapabilityKind, String), Box<dyn ComponentHandler>>,
}

impl fmt::Debug for PluginServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginServer")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl PluginServer {
    /// Creates a server for a plugin at `version` built against `api`.
    #[must_use]
    pub fn new(version: impl Into<String>, api: ApiVersion) -> Self {
        Self {
            description: PluginDescription::new(version, api),
            handlers: BTreeMap::new(),
        }
    }

    /// Registers `handler` as the component `name` of the given kind.
    /// Registering the same name twice replaces the earlier handler.
    #[must_use]
    pub fn register(
        mut self,
        kind: CapabilityKind,
        name: impl Into<String>,
        handler: impl ComponentHandler + 'static,
    ) -> Self {
        let name = name.into();
        self.description = self.description.with_component(kind, name.clone());
        self.handlers.insert((kind, name), Box::new(handler));
        self
    }

    /// Returns the description sent in answer to `describe`.
    #[must_use]
    pub const fn description(&self) -> &PluginDescription {
        &self.description
    }

    /// Checks the launch environment, announces a loopback listener on
    /// `stdout`, and serves the first connection.
    ///
    /// # Errors
    ///
    /// - [`PluginError::MagicCookieMismatch`] if the magic cookie is missing
    ///   or wrong.
    /// - [`PluginError::IncompatibleProtocol`] if the host does not speak
    ///   this plugin's app protocol version.
    /// - [`ServeError::Listen`], [`ServeError::Announce`], or
    ///   [`ServeError::Transport`] for I/O failures.
    pub fn serve(&self, stdout: &mut impl Write) -> Result<(), ServeError> {
        self.check_environment(|key| std::env::var(key).ok())?;
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(ServeError::Listen)?;
        Self::announce(&listener, stdout)?;
        self.serve_on(&listener)
    }

    /// Verifies the magic cookie and protocol versions offered by the host.
    fn check_environment<F>(&self, lookup: F) -> Result<(), PluginError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup(MAGIC_COOKIE_KEY).as_deref() != Some(MAGIC_COOKIE_VALUE) {
            return Err(PluginError::MagicCookieMismatch {
                variable: MAGIC_COOKIE_KEY,
            });
        }
        // A host that does not advertise versions gets the benefit of the doubt.
        if let Some(raw) = lookup(PROTOCOL_VERSIONS_KEY) {
            if !parse_protocol_versions(&raw).contains(&APP_PROTOCOL_VERSION) {
                return Err(PluginError::IncompatibleProtocol {
                    plugin: self.description.version().to_owned(),
                    message: format!(
                        "host offers protocol versions '{raw}', plugin speaks {APP_PROTOCOL_VERSION}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Writes the handshake line for `listener` and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Listen`] if the bound address is unavailable
    /// and [`ServeError::Announce`] if writing fails.
    pub fn announce(
        listener: &TcpListener,
        stdout: &mut impl Write,
    ) -> Result<(), ServeError> {
        let address = listener.local_addr().map_err(ServeError::Listen)?;
        let handshake = Handshake::announce(&Endpoint {
            network: Network::Tcp,
            address: address.to_string(),
        });
        writeln!(stdout, "{handshake}")
            .and_then(|()| stdout.flush())
            .map_err(ServeError::Announce)?;
        debug!(target: SERVER_TARGET, %address, "announced handshake");
        Ok(())
    }

    /// Accepts one connection on `listener` and answers requests until the
    /// host sends `shutdown` or disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Listen`] if accepting fails and
    /// [`ServeError::Transport`] if the connection breaks mid-message.
    pub fn serve_on(&self, listener: &TcpListener) -> Result<(), ServeError> {
        let (stream, peer) = listener.accept().map_err(ServeError::Listen)?;
        info!(target: SERVER_TARGET, %peer, "host connected");
        let reader = stream.try_clone().map_err(ServeError::Listen)?;
        self.serve_transport(&mut LineTransport::new(reader, stream))
    }

    /// Answers requests on an established transport.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Transport`] if sending a response fails.
    pub fn serve_transport(&self, transport: &mut impl Transport) -> Result<(), ServeError> {
        loop {
            let message = match transport.receive() {
                Ok(message) => message,
                Err(TransportError::Closed) => {
                    info!(target: SERVER_TARGET, "host disconnected");
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            };
            let envelope: RequestEnvelope = match serde_json::from_slice(&message) {
                Ok(envelope) => envelope,
                Err(error) => {
                    warn!(target: SERVER_TARGET, %error, "ignoring undecodable request");
                    continue;
                }
            };

            let stop = matches!(envelope.request, Request::Shutdown);
            let outcome = self.dispatch(envelope.request);
            let response = ResponseEnvelope {
                id: envelope.id,
                outcome,
            };
            match serde_json::to_vec(&response) {
                Ok(payload) => transport.send(&payload)?,
                Err(error) => warn!(target: SERVER_TARGET, %error, "cannot encode response"),
            }
            if stop {
                info!(target: SERVER_TARGET, "shutdown requested");
                return Ok(());
            }
        }
    }

    fn dispatch(&self, request: Request) -> Outcome {
        match request {
            Request::Describe => match serde_json::to_value(&self.description) {
                Ok(value) => Outcome::Ok { value },
                Err(error) => Outcome::Error {
                    message: error.to_string(),
                },
            },
            Request::Call {
                capability,
                component,
                method,
                payload,
            } => {
                debug!(target: SERVER_TARGET, %capability, %component, %method, "handling call");
                let key = (capability, component);
                match self.handlers.get(&key) {
                    Some(handler) => match handler.handle(&method, payload) {
                        Ok(value) => Outcome::Ok { value },
                        Err(message) => Outcome::Error { message },
                    },
                    None => Outcome::Error {
                        message: format!("no {capability} named '{}' is registered", key.1),
                    },
                }
            }
            Request::Shutdown => Outcome::Ok { value: Value::Null },
        }
    }
}

#[cfg(test)]
mod tests;

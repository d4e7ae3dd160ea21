//! Running an installed plugin as a child process.
//!
//! A [`PluginBridge`] owns one plugin process for its whole life: it spawns
//! the binary, validates the handshake, connects to the announced endpoint,
//! asks the plugin to describe itself, and then forwards calls until it is
//! shut down. Any failure kills the child and leaves the bridge in
//! [`BridgeState::Failed`]; a killed or crashed plugin never lingers.
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_plugins::{BridgeConfig, CapabilityKind, PluginBridge};
//! use serde_json::json;
//!
//! let mut bridge = PluginBridge::new("/plugins/kiln-plugin-comment", BridgeConfig::default());
//! bridge.launch()?;
//! let value = bridge.call(CapabilityKind::Provisioner, "comment", "prepare", json!({}))?;
//! bridge.shutdown()?;
//! # Ok::<(), kiln_plugins::PluginError>(())
//! ```

mod process;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use self::process::{ChildSlot, FirstLine};
use crate::error::PluginError;
use crate::handshake::{Handshake, HandshakeContract};
use crate::protocol::{CapabilityKind, Outcome, PluginDescription, Request, RpcClient, RpcError};
use crate::registry::InstalledPlugin;
use crate::transport::{self, Transport};
use crate::version::HOST_API_VERSION;

pub use self::state::BridgeState;

/// Log target for bridge operations.
pub(crate) const BRIDGE_TARGET: &str = "kiln_plugins::bridge";

/// Default time allowed for the handshake line to appear.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a plugin gets to exit after a shutdown request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Host variables passed through to plugins by default.
pub const DEFAULT_ENV_ALLOWLIST: [&str; 7] = [
    "PATH",
    "HOME",
    "TMPDIR",
    "TMP",
    "TEMP",
    "SYSTEMROOT",
    "USERPROFILE",
];

/// Launch settings for a plugin process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    handshake_timeout: Duration,
    shutdown_grace: Duration,
    env_allowlist: Vec<String>,
    args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.map(String::from).to_vec(),
            args: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Sets the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Replaces the environment allowlist.
    #[must_use]
    pub fn with_env_allowlist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_allowlist = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets extra command-line arguments for the plugin.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns the shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Returns the environment allowlist.
    #[must_use]
    pub fn env_allowlist(&self) -> &[String] {
        &self.env_allowlist
    }
}

/// Cancels a bridge from another thread.
///
/// Cancelling kills the plugin process and closes its connection. A call
/// blocked on the plugin then returns [`PluginError::Cancelled`].
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    slot: Arc<ChildSlot>,
}

impl TerminationHandle {
    /// Kills the plugin.
    pub fn terminate(&self) {
        self.slot.cancel();
    }
}

/// A running (or not yet running) plugin process.
pub struct PluginBridge {
    path: PathBuf,
    label: String,
    config: BridgeConfig,
    contract: HandshakeContract,
    state: BridgeState,
    slot: Arc<ChildSlot>,
    rpc: Option<RpcClient<Box<dyn Transport>>>,
    handshake: Option<Handshake>,
    description: Option<PluginDescription>,
}

impl PluginBridge {
    /// Creates a bridge for the binary at `path`. Nothing is spawned until
    /// [`PluginBridge::launch`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: BridgeConfig) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            path,
            config,
            contract: HandshakeContract::default(),
            state: BridgeState::NotStarted,
            slot: Arc::new(ChildSlot::default()),
            rpc: None,
            handshake: None,
            description: None,
        }
    }

    /// Creates a bridge for an installed plugin.
    #[must_use]
    pub fn for_installed(plugin: &InstalledPlugin, config: BridgeConfig) -> Self {
        Self::new(plugin.path(), config)
    }

    /// Replaces the handshake contract.
    #[must_use]
    pub fn with_contract(mut self, contract: HandshakeContract) -> Self {
        self.contract = contract;
        self
    }

    /// Returns the plugin binary path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// Returns the process id while the plugin runs.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.slot.pid()
    }

    /// Returns the handshake the plugin announced.
    #[must_use]
    pub const fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Returns what the plugin provides, once it is ready.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&PluginDescription> {
        self.description.as_ref()
    }

    /// Returns a handle that can cancel this bridge from another thread.
    #[must_use]
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Starts the plugin and brings the bridge to [`BridgeState::Ready`].
    ///
    /// # Errors
    ///
    /// - [`PluginError::BridgeUnavailable`] unless the bridge is
    ///   [`BridgeState::NotStarted`].
    /// - [`PluginError::SpawnFailed`] if the binary cannot be executed.
    /// - [`PluginError::HandshakeFailure`] if no valid handshake line arrives
    ///   in time, the plugin exits early, or the connection or describe
    ///   exchange fails.
    /// - [`PluginError::IncompatibleProtocol`] if the plugin announces a
    ///   protocol, network, transport, or API this host cannot use.
    /// - [`PluginError::Cancelled`] if a termination handle fired.
    pub fn launch(&mut self) -> Result<&PluginDescription, PluginError> {
        if self.state != BridgeState::NotStarted {
            return Err(self.unavailable());
        }

        self.state = BridgeState::Launching;
        let environment = process::build_environment(
            &self.config.env_allowlist,
            |key| std::env::var_os(key),
            &self.contract,
        );
        let (child, stdout) =
            match process::spawn(&self.path, &self.config.args, environment, &self.label) {
                Ok(spawned) => spawned,
                Err(error) => {
                    self.state = BridgeState::Failed;
                    return Err(error);
                }
            };
        self.slot.store(child);

        self.state = BridgeState::Handshaking;
        let line = match process::first_line(&stdout, self.config.handshake_timeout) {
            FirstLine::Line(line) => line,
            FirstLine::TimedOut => {
                let timeout_ms = u64::try_from(self.config.handshake_timeout.as_millis())
                    .unwrap_or(u64::MAX);
                return Err(self.fail_handshake(format!(
                    "no handshake within {timeout_ms} ms"
                )));
            }
            FirstLine::Closed => {
                let message = self.exit_description("plugin closed stdout before the handshake");
                return Err(self.fail_handshake(message));
            }
            FirstLine::Failed(error) => {
                return Err(self.fail_handshake(format!("reading handshake failed: {error}")));
            }
        };
        debug!(target: BRIDGE_TARGET, plugin = %self.label, line = %line.trim(), "received handshake");

        let handshake = Handshake::parse(&line).map_err(|message| self.fail_handshake(message))?;
        let endpoint = self
            .contract
            .negotiate(&handshake)
            .map_err(|message| self.fail_incompatible(message))?;
        self.handshake = Some(handshake);

        let (connection, closer) = transport::connect(&endpoint, self.config.handshake_timeout)
            .map_err(|error| {
                self.fail_handshake(format!(
                    "cannot connect to {} {}: {error}",
                    endpoint.network, endpoint.address
                ))
            })?;
        self.slot.store_connection(closer);
        let mut rpc = RpcClient::new(connection);

        let description = match rpc.request(Request::Describe) {
            Ok(Outcome::Ok { value }) => serde_json::from_value::<PluginDescription>(value)
                .map_err(|error| self.fail_handshake(format!("invalid description: {error}")))?,
            Ok(Outcome::Error { message }) => {
                return Err(self.fail_handshake(format!("describe failed: {message}")));
            }
            Err(error) => {
                return Err(self.fail_handshake(format!("describe failed: {error}")));
            }
        };
        if !description.api().is_compatible_with(HOST_API_VERSION) {
            return Err(self.fail_incompatible(format!(
                "plugin API {} cannot be loaded by host API {HOST_API_VERSION}",
                description.api()
            )));
        }

        info!(
            target: BRIDGE_TARGET,
            plugin = %self.label,
            version = description.version(),
            pid = ?self.slot.pid(),
            "plugin ready"
        );
        self.rpc = Some(rpc);
        self.state = BridgeState::Ready;
        Ok(self.description.insert(description))
    }

    /// Invokes `method` on a declared component and returns its result.
    ///
    /// # Errors
    ///
    /// - [`PluginError::BridgeUnavailable`] unless the bridge is ready.
    /// - [`PluginError::UnknownComponent`] if the plugin never declared the
    ///   component; the bridge stays ready.
    /// - [`PluginError::PluginCallFailed`] if the plugin reports an error;
    ///   the bridge stays ready.
    /// - [`PluginError::PluginCrashed`] if the connection breaks or the
    ///   process dies; the bridge fails.
    /// - [`PluginError::Cancelled`] if a termination handle fired.
    pub fn call(
        &mut self,
        kind: CapabilityKind,
        component: &str,
        method: &str,
        payload: Value,
    ) -> Result<Value, PluginError> {
        if self.slot.is_cancelled() && !self.state.is_final() {
            self.fail();
            return Err(self.cancelled());
        }
        if self.state != BridgeState::Ready {
            return Err(self.unavailable());
        }
        if !self
            .description
            .as_ref()
            .is_some_and(|description| description.provides(kind, component))
        {
            return Err(PluginError::UnknownComponent {
                plugin: self.label.clone(),
                kind: kind.to_string(),
                component: component.to_owned(),
            });
        }
        let Some(rpc) = self.rpc.as_mut() else {
            return Err(self.unavailable());
        };

        self.state = BridgeState::InUse;
        debug!(target: BRIDGE_TARGET, plugin = %self.label, %kind, component, method, "calling plugin");
        let request = Request::Call {
            capability: kind,
            component: component.to_owned(),
            method: method.to_owned(),
            payload,
        };
        match rpc.request(request) {
            Ok(Outcome::Ok { value }) => {
                self.state = BridgeState::Ready;
                Ok(value)
            }
            Ok(Outcome::Error { message }) => {
                self.state = BridgeState::Ready;
                Err(PluginError::PluginCallFailed {
                    plugin: self.label.clone(),
                    component: component.to_owned(),
                    method: method.to_owned(),
                    message,
                })
            }
            Err(error) => Err(self.fail_call(&error)),
        }
    }

    /// Asks the plugin to exit, waits the grace period, then kills it.
    ///
    /// Shutting down a bridge that never started simply marks it terminated.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::BridgeUnavailable`] if the bridge has already
    /// terminated or failed, or a call is in flight.
    pub fn shutdown(&mut self) -> Result<(), PluginError> {
        match self.state {
            BridgeState::NotStarted => {
                self.state = BridgeState::Terminated;
                return Ok(());
            }
            BridgeState::Ready => {}
            _ => return Err(self.unavailable()),
        }

        self.state = BridgeState::ShuttingDown;
        if let Some(mut rpc) = self.rpc.take() {
            if let Err(error) = rpc.request(Request::Shutdown) {
                debug!(target: BRIDGE_TARGET, plugin = %self.label, %error, "shutdown request failed");
            }
        }
        self.slot.terminate(self.config.shutdown_grace, &self.label);
        self.state = BridgeState::Terminated;
        info!(target: BRIDGE_TARGET, plugin = %self.label, "plugin terminated");
        Ok(())
    }

    fn fail(&mut self) {
        self.rpc = None;
        self.slot.kill();
        self.state = BridgeState::Failed;
    }

    fn fail_handshake(&mut self, message: String) -> PluginError {
        let cancelled = self.slot.is_cancelled();
        self.fail();
        if cancelled {
            return self.cancelled();
        }
        warn!(target: BRIDGE_TARGET, plugin = %self.label, %message, "handshake failed");
        PluginError::HandshakeFailure {
            plugin: self.label.clone(),
            message,
        }
    }

    fn fail_incompatible(&mut self, message: String) -> PluginError {
        self.fail();
        warn!(target: BRIDGE_TARGET, plugin = %self.label, %message, "incompatible plugin");
        PluginError::IncompatibleProtocol {
            plugin: self.label.clone(),
            message,
        }
    }

    fn fail_call(&mut self, error: &RpcError) -> PluginError {
        let cancelled = self.slot.is_cancelled();
        let message = self.exit_description(&error.to_string());
        self.fail();
        if cancelled {
            return self.cancelled();
        }
        warn!(target: BRIDGE_TARGET, plugin = %self.label, %message, "plugin crashed");
        PluginError::PluginCrashed {
            plugin: self.label.clone(),
            message,
        }
    }

    fn exit_description(&self, context: &str) -> String {
        match self.slot.exit_status() {
            Some(status) => format!("{context} ({status})"),
            None => context.to_owned(),
        }
    }

    fn cancelled(&self) -> PluginError {
        PluginError::Cancelled {
            plugin: self.label.clone(),
        }
    }

    fn unavailable(&self) -> PluginError {
        PluginError::BridgeUnavailable {
            plugin: self.label.clone(),
            state: self.state.to_string(),
        }
    }
}

impl Drop for PluginBridge {
    fn drop(&mut self) {
        if self.slot.pid().is_some() {
            debug!(target: BRIDGE_TARGET, plugin = %self.label, "killing plugin on drop");
            self.slot.kill();
        }
    }
}

impl std::fmt::Debug for PluginBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBridge")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("pid", &self.slot.pid())
            .finish_non_exhaustive()
    }
}

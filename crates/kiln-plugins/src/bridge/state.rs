//! Lifecycle states of a plugin bridge.

use std::fmt;

/// Where a [`super::PluginBridge`] is in its lifecycle.
///
/// ```text
/// NotStarted -> Launching -> Handshaking -> Ready <-> InUse
///                                             |
///                                        ShuttingDown -> Terminated
/// ```
///
/// `Failed` is reachable from every state before `Terminated` and, like
/// `Terminated`, is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// No process has been started.
    NotStarted,
    /// The process is being spawned.
    Launching,
    /// Waiting for the handshake line and the plugin description.
    Handshaking,
    /// Connected and idle.
    Ready,
    /// A call is in flight.
    InUse,
    /// A shutdown request has been sent.
    ShuttingDown,
    /// The process has exited after a shutdown.
    Terminated,
    /// Something went wrong; the process has been killed.
    Failed,
}

impl BridgeState {
    /// Returns `true` for states no operation can leave.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Returns the state name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Launching => "launching",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::InUse => "in use",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Request/response correlation over a [`Transport`].

use thiserror::Error;
use tracing::{debug, warn};

use super::{Outcome, Request, RequestEnvelope, ResponseEnvelope};
use crate::transport::{Transport, TransportError};

/// Log target for RPC traffic.
const RPC_TARGET: &str = "kiln_plugins::rpc";

/// Responses with a stale id are skipped at most this many times per request.
const MAX_STALE_RESPONSES: usize = 16;

/// Failures below the level of a plugin-reported error.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error("invalid message: {0}")]
    Codec(#[from] serde_json::Error),

    /// The plugin kept answering other requests.
    #[error("no response for request {id}")]
    NoResponse {
        /// Identifier of the unanswered request.
        id: u64,
    },
}

/// Sends requests and waits for the matching response.
pub struct RpcClient<T> {
    transport: T,
    next_id: u64,
}

impl<T: Transport> RpcClient<T> {
    /// Wraps a connected transport.
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 1,
        }
    }

    /// Returns the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Sends `request` and returns the plugin's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] when the exchange itself fails. A plugin-reported
    /// failure is an `Ok(Outcome::Error { .. })`.
    pub fn request(&mut self, request: Request) -> Result<Outcome, RpcError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let payload = serde_json::to_vec(&RequestEnvelope { id, request })?;
        debug!(target: RPC_TARGET, id, bytes = payload.len(), "sending request");
        self.transport.send(&payload)?;

        for _ in 0..MAX_STALE_RESPONSES {
            let message = self.transport.receive()?;
            let response: ResponseEnvelope = serde_json::from_slice(&message)?;
            if response.id == id {
                return Ok(response.outcome);
            }
            warn!(
                target: RPC_TARGET,
                expected = id,
                received = response.id,
                "skipping response with non-matching id"
            );
        }
        Err(RpcError::NoResponse { id })
    }
}

//! Error types for the session-client layer.

use std::io;

use protocol::{ProtocolError, PubKey};
use thiserror::Error;

/// Errors produced by the session-client layer.
///
/// Cancellation is deliberately absent: an interrupted forwarder reports
/// [`crate::forward::ForwardOutcome::Cancelled`] instead of an error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control endpoint could not be reached.
    #[error("failed to connect to session host at {target}: {source}")]
    Connection {
        /// Endpoint rendered as `net://addr`.
        target: String,
        /// Underlying dial failure.
        #[source]
        source: io::Error,
    },

    /// The configured control network kind is not recognized.
    #[error("unsupported control network {0:?} (expected \"unix\" or \"tcp\")")]
    UnsupportedNetwork(String),

    /// The host rejected or misunderstood a session request.
    #[error("session host rejected {kind} session: {reason}")]
    Negotiation {
        /// Requested session kind.
        kind: &'static str,
        /// Rejection reason from the host, or the local failure description.
        reason: String,
    },

    /// The host accepted the request but could not reach the ultimate
    /// remote identity of a two-hop session.
    #[error("session host could not route to {remote} port {port}: {reason}")]
    Routing {
        /// Identity of the unreachable remote host.
        remote: PubKey,
        /// Requested mesh port on the remote host.
        port: u16,
        /// Routing failure reason reported by the host.
        reason: String,
    },

    /// The host did not answer a session request within the deadline.
    #[error("timed out negotiating {kind} session")]
    NegotiationTimeout {
        /// Requested session kind.
        kind: &'static str,
    },

    /// A whitelist administration call failed.
    #[error("whitelist {op} failed: {reason}")]
    AdminRpc {
        /// The RPC that failed.
        op: &'static str,
        /// Failure description: host error, malformed response, timeout,
        /// or connection loss.
        reason: String,
    },

    /// The proxy front-end could not bind its listen address.
    #[error("failed to bind SOCKS5 listener on {addr}: {source}")]
    Bind {
        /// The requested listen address.
        addr: String,
        /// Underlying bind failure.
        #[source]
        source: io::Error,
    },

    /// Protocol-level failure outside negotiation and admin calls.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

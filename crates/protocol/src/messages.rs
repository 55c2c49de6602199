//! Wire messages exchanged between session clients and session hosts.
//!
//! A control connection starts with exactly one [`SessionRequest`] frame from
//! the client, answered by one [`SessionResponse`] frame from the host. What
//! happens next depends on the accepted variant: pty sessions turn the
//! connection into a raw byte channel, the whitelist session keeps exchanging
//! [`WhitelistRequest`]/[`WhitelistResponse`] frames.

use serde::{Deserialize, Serialize};

use crate::keys::PubKey;

/// Opening request sent as the first frame on a control connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionRequest {
    /// Execute `cmd` with `args` in a new pty on the host this connection
    /// terminates at, with I/O proxied over the connection.
    Pty {
        /// Command to execute. Passed through verbatim, no local escaping.
        cmd: String,
        /// Command arguments, also passed through verbatim.
        args: Vec<String>,
    },
    /// Ask the host to dial `remote` over the mesh and splice this
    /// connection with a pty session there.
    ProxyPty {
        /// Identity of the ultimate remote host.
        remote: PubKey,
        /// Mesh port the remote host serves pty sessions on.
        port: u16,
        /// Command to execute on the remote host.
        cmd: String,
        /// Command arguments.
        args: Vec<String>,
    },
    /// Open the whitelist administration surface.
    Whitelist,
}

/// The host's answer to a [`SessionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionResponse {
    /// Session accepted; the connection now carries the session.
    Accepted,
    /// The host rejected or did not understand the request.
    Denied {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// `ProxyPty` only: the host could not reach the remote identity.
    Unroutable {
        /// Human-readable routing failure reason.
        reason: String,
    },
}

/// Whitelist administration calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WhitelistRequest {
    /// Add a key to the host's whitelist.
    Add(PubKey),
    /// Remove a key from the host's whitelist.
    Remove(PubKey),
    /// List all whitelisted keys.
    List,
    /// Check whether a key is whitelisted.
    Contains(PubKey),
}

/// Whitelist administration responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WhitelistResponse {
    /// The mutation was applied.
    Done,
    /// Response to `List`.
    Keys(Vec<PubKey>),
    /// Response to `Contains`.
    Contains(bool),
    /// The host failed to process the request.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

/// First frame on a freshly dialed transport stream, naming its destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialRequest {
    /// Destination identity.
    pub dst: PubKey,
    /// Destination mesh port.
    pub port: u16,
}

/// The relay's answer to a [`DialRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DialResponse {
    /// Stream established; the connection now carries the session.
    Accepted,
    /// The destination identity could not be reached.
    Unreachable {
        /// Human-readable failure reason.
        reason: String,
    },
}

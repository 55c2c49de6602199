//! # meshterm protocol
//!
//! Wire-level types shared by every meshterm front-end:
//!
//! - **Identity keys**: Ed25519 [`PubKey`]/[`SecKey`] pairs addressing nodes
//!   on the mesh, rendered as hex at every boundary.
//! - **Session negotiation**: the one-request/one-response exchange that
//!   turns a control connection into a pty channel or an admin surface.
//! - **Whitelist RPC**: the request/response vocabulary of the host's
//!   whitelist administration session.
//! - **Framing**: newline-delimited JSON with a hard length cap.
//!
//! This crate deliberately knows nothing about the transport carrying the
//! frames; it only defines what travels over an established stream.

pub mod error;
pub mod framing;
pub mod keys;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{read_frame, write_frame, MAX_FRAME_LEN};
pub use keys::{Keypair, PubKey, SecKey};
pub use messages::{
    DialRequest, DialResponse, SessionRequest, SessionResponse, WhitelistRequest,
    WhitelistResponse,
};

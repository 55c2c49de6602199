//! # meshterm client
//!
//! Client-side session layer over an identity-addressed multiplexed
//! transport. Two front-ends build on this crate:
//!
//! - **`meshterm`**: interactive CLI that opens a local or remote-proxied
//!   pty session on a session host and administers its whitelist.
//! - **`meshterm-socks`**: SOCKS5 proxy whose outbound dials ride the
//!   transport.
//!
//! ## Architecture
//!
//! ```text
//!  prepare_conn ──► negotiate ──► PtySession ─┐
//!      (conn)       (session)                 │  RawModeGuard (term)
//!                                             ▼
//!                                      forward (forward)
//!                                             ▲
//!                          CancellationToken ─┴─► ProxyServer (proxy)
//!                                                      │
//!                                              Dialer (transport)
//! ```
//!
//! Ownership moves one way: the control connection belongs to whichever
//! client negotiates over it, then the negotiated channel belongs to the
//! forwarder. One cancellation token fans out to every long-running loop.
//!
//! ## Modules
//!
//! - [`config`]: configuration loading, defaults, env overrides
//! - [`conn`]: control-connection establishment
//! - [`session`]: session negotiation and pty sessions
//! - [`whitelist`]: whitelist administration RPC
//! - [`term`]: scoped raw-terminal acquisition
//! - [`forward`]: terminal ↔ channel byte pump
//! - [`socks`]: SOCKS5 CONNECT boundary
//! - [`proxy`]: SOCKS5 front-end lifecycle
//! - [`transport`]: the multiplexed-transport seam

pub mod config;
pub mod conn;
pub mod error;
pub mod forward;
pub mod proxy;
pub mod session;
pub mod socks;
pub mod term;
pub mod transport;
pub mod whitelist;

pub use config::Config;
pub use conn::{prepare_conn, ControlConn};
pub use error::{ClientError, Result};
pub use forward::{forward, forward_with, ForwardOutcome};
pub use proxy::{ProxyServer, ProxyState};
pub use session::{negotiate, PtySession, SessionDescriptor};
pub use term::RawModeGuard;
pub use transport::{Dialer, MeshClient, Transport, TransportDialer};
pub use whitelist::WhitelistClient;

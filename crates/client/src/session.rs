//! Session negotiation over an established control connection.
//!
//! Exactly one request frame goes out, exactly one response frame comes
//! back, always under a deadline: a dead or wedged host must never hang
//! the CLI. On acceptance the control connection *becomes* the session:
//! for pty variants a raw byte channel handed to the forwarder, for the
//! whitelist variant an RPC surface (see [`crate::whitelist`]).

use std::time::Duration;

use protocol::{read_frame, write_frame, SessionRequest, SessionResponse};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::error::{ClientError, Result};

/// Default deadline for the negotiation exchange.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// The typed request describing which session variant to open.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDescriptor {
    /// A pty on the host the control connection terminates at.
    LocalPty {
        /// Command to execute, passed through verbatim.
        cmd: String,
        /// Arguments, passed through verbatim.
        args: Vec<String>,
    },
    /// A pty on a further remote host, spliced by the local host.
    RemotePty {
        /// Identity of the ultimate remote host.
        remote: protocol::PubKey,
        /// Mesh port the remote host serves pty sessions on.
        port: u16,
        /// Command to execute on the remote host.
        cmd: String,
        /// Arguments.
        args: Vec<String>,
    },
    /// The whitelist administration surface.
    WhitelistAdmin,
}

impl SessionDescriptor {
    /// Human-readable session kind, used in error and log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionDescriptor::LocalPty { .. } => "local pty",
            SessionDescriptor::RemotePty { .. } => "remote pty",
            SessionDescriptor::WhitelistAdmin => "whitelist admin",
        }
    }

    fn request(&self) -> SessionRequest {
        match self {
            SessionDescriptor::LocalPty { cmd, args } => SessionRequest::Pty {
                cmd: cmd.clone(),
                args: args.clone(),
            },
            SessionDescriptor::RemotePty {
                remote,
                port,
                cmd,
                args,
            } => SessionRequest::ProxyPty {
                remote: *remote,
                port: *port,
                cmd: cmd.clone(),
                args: args.clone(),
            },
            SessionDescriptor::WhitelistAdmin => SessionRequest::Whitelist,
        }
    }
}

/// Negotiates `desc` over `stream` within `timeout`.
///
/// Returns the stream (buffered) once the host accepts; any buffered
/// bytes past the response frame are preserved for the session. Rejection
/// maps to [`ClientError::Negotiation`], a routing failure of a remote
/// pty to [`ClientError::Routing`], and a missed deadline to
/// [`ClientError::NegotiationTimeout`].
pub async fn negotiate<S>(
    stream: S,
    desc: &SessionDescriptor,
    timeout: Duration,
) -> Result<BufReader<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut chan = BufReader::new(stream);

    let exchange = async {
        write_frame(&mut chan, &desc.request()).await?;
        read_frame::<_, SessionResponse>(&mut chan).await
    };

    let response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ClientError::NegotiationTimeout { kind: desc.kind() })?
        .map_err(|e| ClientError::Negotiation {
            kind: desc.kind(),
            reason: e.to_string(),
        })?;

    match response {
        SessionResponse::Accepted => {
            tracing::debug!(kind = desc.kind(), "session accepted");
            Ok(chan)
        }
        SessionResponse::Denied { reason } => Err(ClientError::Negotiation {
            kind: desc.kind(),
            reason,
        }),
        SessionResponse::Unroutable { reason } => match desc {
            SessionDescriptor::RemotePty { remote, port, .. } => Err(ClientError::Routing {
                remote: *remote,
                port: *port,
                reason,
            }),
            // Hosts only send Unroutable for two-hop sessions; treat
            // anything else as a malformed rejection.
            _ => Err(ClientError::Negotiation {
                kind: desc.kind(),
                reason,
            }),
        },
    }
}

/// An interactive pty session negotiated over a control connection.
#[derive(Debug)]
pub struct PtySession<S> {
    chan: BufReader<S>,
    kind: &'static str,
}

impl<S> PtySession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Negotiates a pty on the host the connection terminates at.
    pub async fn start(stream: S, cmd: String, args: Vec<String>) -> Result<Self> {
        let desc = SessionDescriptor::LocalPty { cmd, args };
        let chan = negotiate(stream, &desc, NEGOTIATION_TIMEOUT).await?;
        Ok(Self {
            chan,
            kind: desc.kind(),
        })
    }

    /// Negotiates a pty on `remote`, proxied through the local host.
    pub async fn start_remote(
        stream: S,
        remote: protocol::PubKey,
        port: u16,
        cmd: String,
        args: Vec<String>,
    ) -> Result<Self> {
        let desc = SessionDescriptor::RemotePty {
            remote,
            port,
            cmd,
            args,
        };
        let chan = negotiate(stream, &desc, NEGOTIATION_TIMEOUT).await?;
        Ok(Self {
            chan,
            kind: desc.kind(),
        })
    }

    /// Session kind, for log messages.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Hands the duplex session channel off to the forwarder.
    pub fn into_channel(self) -> BufReader<S> {
        self.chan
    }
}

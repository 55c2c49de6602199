//! The multiplexed-transport seam.
//!
//! The transport proper (encryption, session multiplexing, relay
//! routing) is an external component. This module pins down the contract the
//! rest of the crate consumes ([`Transport`], [`Dialer`]) and carries a
//! thin concrete client, [`MeshClient`], so the binaries run against a
//! discovery service without pulling the full transport in: identities
//! register over HTTP and dials resolve an identity to its advertised
//! address, open a stream, and name the destination in a header frame.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use protocol::{read_frame, write_frame, DialRequest, DialResponse, Keypair, PubKey};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::socks::TargetAddr;

/// Interval between discovery keepalive registrations.
const REGISTER_INTERVAL: Duration = Duration::from_secs(30);

/// The session surface of the multiplexed transport client.
pub trait Transport: Send + Sync + 'static {
    /// A bidirectional stream to a remote identity.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Runs the transport's background session loop until `cancel` fires.
    fn serve(&self, cancel: CancellationToken) -> impl Future<Output = ()> + Send;

    /// Resolves once the transport has completed its first successful
    /// registration and can dial.
    fn ready(&self) -> impl Future<Output = ()> + Send;

    /// Opens a new logical session to `identity` on `port`.
    fn dial(
        &self,
        identity: PubKey,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Tears down all sessions.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Outbound dialer consumed by the SOCKS5 front-end.
pub trait Dialer: Send + Sync + 'static {
    /// The stream produced by a successful dial.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Dials the CONNECT target.
    fn dial(&self, target: TargetAddr) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Discovery record for one identity.
#[derive(Debug, Serialize, Deserialize)]
struct DiscoveryEntry {
    /// Reachable address advertised by the identity, if any.
    #[serde(default)]
    addr: Option<String>,
}

/// A thin mesh transport client backed by an HTTP discovery service.
pub struct MeshClient {
    keys: Keypair,
    disc_url: Url,
    http: reqwest::Client,
    ready_tx: watch::Sender<bool>,
}

impl MeshClient {
    /// Creates a client for the discovery service at `disc_url`.
    pub fn new(keys: Keypair, disc_url: Url) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            keys,
            disc_url,
            http: reqwest::Client::new(),
            ready_tx,
        }
    }

    /// This client's public identity.
    pub fn public_key(&self) -> PubKey {
        self.keys.public
    }

    fn entry_url(&self, identity: PubKey) -> String {
        format!(
            "{}/api/entries/{}",
            self.disc_url.as_str().trim_end_matches('/'),
            identity
        )
    }

    async fn register_once(&self) -> reqwest::Result<()> {
        self.http
            .put(self.entry_url(self.keys.public))
            .json(&DiscoveryEntry { addr: None })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn resolve(&self, identity: PubKey) -> io::Result<String> {
        let entry: DiscoveryEntry = self
            .http
            .get(self.entry_url(identity))
            .send()
            .await
            .map_err(io::Error::other)?
            .error_for_status()
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?
            .json()
            .await
            .map_err(io::Error::other)?;

        entry.addr.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("identity {} has no reachable address", identity.fingerprint()),
            )
        })
    }
}

impl Transport for MeshClient {
    type Stream = BufReader<TcpStream>;

    async fn serve(&self, cancel: CancellationToken) {
        loop {
            match self.register_once().await {
                Ok(()) => {
                    if !*self.ready_tx.borrow() {
                        tracing::info!(
                            public_key = %self.keys.public,
                            "Registered with mesh discovery"
                        );
                    }
                    self.ready_tx.send_replace(true);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discovery registration failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(REGISTER_INTERVAL) => {}
            }
        }
    }

    async fn ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives as long as self, so this only returns on a
        // true value.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn dial(&self, identity: PubKey, port: u16) -> io::Result<Self::Stream> {
        let addr = self.resolve(identity).await?;
        let mut stream = TcpStream::connect(&addr).await?;

        write_frame(&mut stream, &DialRequest {
            dst: identity,
            port,
        })
        .await
        .map_err(io::Error::other)?;

        let mut stream = BufReader::new(stream);
        let response: DialResponse = read_frame(&mut stream).await.map_err(io::Error::other)?;
        match response {
            DialResponse::Accepted => Ok(stream),
            DialResponse::Unreachable { reason } => Err(io::Error::new(
                io::ErrorKind::HostUnreachable,
                format!("{} port {}: {}", identity.fingerprint(), port, reason),
            )),
        }
    }

    async fn close(&self) {
        // Best-effort deregistration; the entry expires server-side anyway.
        let _ = self
            .http
            .delete(self.entry_url(self.keys.public))
            .send()
            .await;
        tracing::info!("Disconnected from mesh discovery");
    }
}

/// Adapts a [`Transport`] into the proxy's [`Dialer`].
///
/// Mesh destinations are identities, not IP addresses, so only
/// domain-type CONNECT targets whose name parses as public-key hex are
/// dialable; everything else is refused with
/// [`io::ErrorKind::Unsupported`], which the proxy maps to an
/// address-type reply.
pub struct TransportDialer<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> TransportDialer<T> {
    /// Wraps `transport` for use by the proxy.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

impl<T: Transport> Dialer for TransportDialer<T> {
    type Stream = T::Stream;

    fn dial(&self, target: TargetAddr) -> impl Future<Output = io::Result<Self::Stream>> + Send {
        let transport = Arc::clone(&self.transport);
        async move {
            match target {
                TargetAddr::Domain(name, port) => {
                    let identity: PubKey = name.parse().map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::Unsupported,
                            format!("target {name:?} is not a mesh identity"),
                        )
                    })?;
                    transport.dial(identity, port).await
                }
                TargetAddr::Ip(addr) => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("mesh targets are identities, not IP addresses: {addr}"),
                )),
            }
        }
    }
}

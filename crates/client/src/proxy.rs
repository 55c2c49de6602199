//! SOCKS5 front-end lifecycle.
//!
//! The proxy owns a local listener whose every CONNECT is satisfied by a
//! [`Dialer`] sourced from the established transport. Lifecycle:
//! `Created → Listening → ShuttingDown → Stopped`, observable through a
//! watch channel. A bind failure is fatal and non-retryable; shutdown is
//! triggered either by the shared cancellation token or an explicit
//! [`ProxyServer::shutdown`] call from any task.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::socks;
use crate::transport::Dialer;

/// Lifecycle states of the proxy front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Constructed, accept loop not yet running.
    Created,
    /// Accept loop running.
    Listening,
    /// Winding down after cancellation or an explicit stop.
    ShuttingDown,
    /// Listener closed, accept loop exited.
    Stopped,
}

/// How long [`ProxyServer::shutdown`] waits for the accept loop to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A SOCKS5 front-end bound to a local address.
pub struct ProxyServer<D: Dialer> {
    dialer: Arc<D>,
    cancel: CancellationToken,
    state_tx: watch::Sender<ProxyState>,
}

impl<D: Dialer> ProxyServer<D> {
    /// Creates a proxy whose outbound dials go through `dialer` and whose
    /// accept loop stops when `cancel` fires.
    pub fn new(dialer: D, cancel: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(ProxyState::Created);
        Self {
            dialer: Arc::new(dialer),
            cancel,
            state_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        *self.state_tx.borrow()
    }

    /// A receiver observing lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ProxyState> {
        self.state_tx.subscribe()
    }

    /// Binds `addr` and accepts SOCKS5 clients until the listener closes.
    ///
    /// Blocks the calling task for the proxy's whole lifetime. A bind
    /// failure returns [`ClientError::Bind`] without retry; per-connection
    /// failures are logged and do not stop the loop.
    pub async fn listen_and_serve(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ClientError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ClientError::Io)?;

        self.state_tx.send_replace(ProxyState::Listening);
        tracing::info!(listen_addr = %local_addr, "SOCKS5 proxy listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dialer = Arc::clone(&self.dialer);
                        let cancel = self.cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, dialer, cancel).await {
                                tracing::debug!(
                                    peer = %peer,
                                    error = %e,
                                    "proxy connection closed with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept proxy connection");
                    }
                }
            }
        }

        self.state_tx.send_replace(ProxyState::ShuttingDown);
        drop(listener);
        self.state_tx.send_replace(ProxyState::Stopped);
        tracing::info!("SOCKS5 proxy stopped");
        Ok(())
    }

    /// Triggers shutdown and waits, bounded by a grace period, for the
    /// accept loop to exit.
    ///
    /// Safe to call from a different task than the one running
    /// [`listen_and_serve`], and safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let mut rx = self.state_tx.subscribe();
        // Created means the accept loop never started; there is nothing
        // to wait out in that case.
        let stopped = rx.wait_for(|s| matches!(s, ProxyState::Stopped | ProxyState::Created));
        if tokio::time::timeout(SHUTDOWN_GRACE, stopped).await.is_err() {
            tracing::warn!("proxy accept loop did not stop within the grace period");
        }
    }
}

/// Serves one SOCKS5 client: handshake, dial through the transport,
/// relay until either side closes or the proxy shuts down.
async fn handle_client<D: Dialer>(
    mut stream: TcpStream,
    dialer: Arc<D>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let target = socks::read_connect_request(&mut stream)
        .await
        .map_err(io::Error::other)?;

    tracing::debug!(target = %target, "CONNECT request");

    let mut upstream = match dialer.dial(target.clone()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            let code = match e.kind() {
                io::ErrorKind::Unsupported => socks::reply::ADDRESS_TYPE_NOT_SUPPORTED,
                io::ErrorKind::NotFound | io::ErrorKind::HostUnreachable => {
                    socks::reply::HOST_UNREACHABLE
                }
                _ => socks::reply::GENERAL_FAILURE,
            };
            let _ = socks::write_reply(&mut stream, code).await;
            return Err(e);
        }
    };

    socks::write_reply(&mut stream, socks::reply::SUCCEEDED).await?;

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(target = %target, "relay cancelled by shutdown");
        }
        res = tokio::io::copy_bidirectional(&mut stream, &mut upstream) => {
            res?;
        }
    }

    Ok(())
}

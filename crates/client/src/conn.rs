//! Control-connection establishment.
//!
//! The connection preparer turns a `{network, address}` pair into a live
//! stream to the session host. Empty fields fall back to the well-known
//! defaults, so an all-default configuration reaches the local host socket.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

use crate::config::{CliConfig, DEFAULT_CLI_ADDR, DEFAULT_CLI_NET};
use crate::error::{ClientError, Result};

/// A control connection to a session host.
///
/// Owned exclusively by whichever client is negotiating over it; dropping
/// it closes the underlying stream exactly once.
#[derive(Debug)]
pub enum ControlConn {
    /// Connection over a TCP endpoint.
    Tcp(TcpStream),
    /// Connection over a Unix domain socket.
    Unix(UnixStream),
}

/// Dials the control endpoint described by `cfg`.
///
/// Empty network/address fields are replaced with [`DEFAULT_CLI_NET`] and
/// [`DEFAULT_CLI_ADDR`]. The target is logged before dialing.
pub async fn prepare_conn(cfg: &CliConfig) -> Result<ControlConn> {
    let network = if cfg.network.is_empty() {
        DEFAULT_CLI_NET
    } else {
        cfg.network.as_str()
    };
    let address = if cfg.address.is_empty() {
        DEFAULT_CLI_ADDR
    } else {
        cfg.address.as_str()
    };
    let target = format!("{}://{}", network, address);

    tracing::info!(address = %target, "Requesting session host connection");

    match network {
        "tcp" => TcpStream::connect(address)
            .await
            .map(ControlConn::Tcp)
            .map_err(|source| ClientError::Connection { target, source }),
        "unix" => UnixStream::connect(address)
            .await
            .map(ControlConn::Unix)
            .map_err(|source| ClientError::Connection { target, source }),
        other => Err(ClientError::UnsupportedNetwork(other.to_string())),
    }
}

impl AsyncRead for ControlConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ControlConn::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            ControlConn::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ControlConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ControlConn::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            ControlConn::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ControlConn::Tcp(s) => Pin::new(s).poll_flush(cx),
            ControlConn::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ControlConn::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            ControlConn::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, UnixListener};

    #[tokio::test]
    async fn test_prepare_conn_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cfg = CliConfig {
            network: "tcp".to_string(),
            address: addr.to_string(),
        };

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let mut conn = prepare_conn(&cfg).await.unwrap();
        let (mut server, _) = accept.await.unwrap();

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_prepare_conn_unix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let cfg = CliConfig {
            network: "unix".to_string(),
            address: path.to_string_lossy().into_owned(),
        };

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let conn = prepare_conn(&cfg).await;
        assert!(conn.is_ok());
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_conn_refused() {
        let cfg = CliConfig {
            network: "tcp".to_string(),
            // Reserved port that nothing listens on.
            address: "127.0.0.1:1".to_string(),
        };

        let err = prepare_conn(&cfg).await.unwrap_err();
        match err {
            ClientError::Connection { target, .. } => {
                assert_eq!(target, "tcp://127.0.0.1:1");
            }
            other => panic!("expected Connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_conn_unknown_network() {
        let cfg = CliConfig {
            network: "udp".to_string(),
            address: "127.0.0.1:9".to_string(),
        };

        let err = prepare_conn(&cfg).await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedNetwork(ref n) if n == "udp"));
    }

    #[tokio::test]
    async fn test_empty_fields_use_defaults() {
        // With empty fields the preparer targets the default unix socket,
        // which does not exist in the test environment.
        let cfg = CliConfig {
            network: String::new(),
            address: String::new(),
        };

        let err = prepare_conn(&cfg).await.unwrap_err();
        match err {
            ClientError::Connection { target, .. } => {
                assert_eq!(target, format!("{}://{}", DEFAULT_CLI_NET, DEFAULT_CLI_ADDR));
            }
            other => panic!("expected Connection error, got {other:?}"),
        }
    }
}

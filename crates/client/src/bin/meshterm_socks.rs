//! meshterm-socks: SOCKS5 proxy front-end tunneling through the mesh.
//!
//! Every CONNECT accepted on the local listen port is satisfied by a new
//! session over the mesh transport to the requested identity. Runs until
//! interrupted, then shuts the listener and the transport down gracefully.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use url::Url;

use client::config::{DEFAULT_DISC_URL, DEFAULT_SOCKS_PORT};
use client::proxy::ProxyServer;
use client::transport::{MeshClient, Transport, TransportDialer};
use protocol::{Keypair, SecKey};

/// Environment variable carrying the secret key.
const SK_ENV: &str = "MESHTERM_SK";

/// SOCKS5 proxy over the mesh transport.
#[derive(Parser, Debug)]
#[command(name = "meshterm-socks")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Local SOCKS5 listen port
    #[arg(short, long, default_value_t = DEFAULT_SOCKS_PORT)]
    port: u16,

    /// Discovery service URL (well-known default when empty)
    #[arg(short = 'D', long = "disc", default_value = "", value_name = "URL")]
    disc: String,

    /// Secret key hex; a fresh keypair is generated when unset
    #[arg(short, long, value_name = "HEX")]
    sk: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Flag wins over environment; with neither, a fresh keypair.
    let sk_hex = cli
        .sk
        .or_else(|| std::env::var(SK_ENV).ok().filter(|v| !v.is_empty()));
    let keys = match sk_hex {
        Some(hex) => Keypair::from_secret(
            SecKey::from_hex(hex.trim()).context("invalid secret key")?,
        ),
        None => {
            let keys = Keypair::generate();
            tracing::info!("No secret key supplied, generated a fresh keypair");
            keys
        }
    };

    let disc = if cli.disc.is_empty() {
        DEFAULT_DISC_URL
    } else {
        cli.disc.as_str()
    };
    let disc_url = Url::parse(disc).context("invalid discovery url")?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let transport = Arc::new(MeshClient::new(keys, disc_url.clone()));
    {
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        tokio::spawn(async move { transport.serve(cancel).await });
    }

    tracing::info!(
        public_key = %transport.public_key(),
        disc = %disc_url,
        "Connecting to mesh network..."
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::warn!("Interrupted before the transport became ready");
            transport.close().await;
            return Ok(());
        }
        _ = transport.ready() => {
            tracing::info!("Mesh network ready");
        }
    }

    let proxy = ProxyServer::new(
        TransportDialer::new(Arc::clone(&transport)),
        cancel.clone(),
    );
    let listen_addr = format!("127.0.0.1:{}", cli.port);

    // Blocks until the listener closes; the signal listener cancels the
    // token, which stops the accept loop. Bind failures are fatal.
    let result = proxy.listen_and_serve(&listen_addr).await;

    transport.close().await;
    result?;

    tracing::info!("SOCKS5 proxy server gracefully stopped");
    Ok(())
}

/// Spawns a task that cancels `cancel` on SIGTERM or SIGINT.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Received shutdown signal, stopping SOCKS5 proxy");
        cancel.cancel();
    });
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["meshterm-socks"]).unwrap();
        assert_eq!(cli.port, DEFAULT_SOCKS_PORT);
        assert!(cli.disc.is_empty());
        assert!(cli.sk.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_port_flag() {
        let cli = Cli::try_parse_from(["meshterm-socks", "--port", "9050"]).unwrap();
        assert_eq!(cli.port, 9050);

        let cli = Cli::try_parse_from(["meshterm-socks", "-p", "9051"]).unwrap();
        assert_eq!(cli.port, 9051);
    }

    #[test]
    fn test_disc_flag() {
        let cli =
            Cli::try_parse_from(["meshterm-socks", "-D", "http://disc.example.com"]).unwrap();
        assert_eq!(cli.disc, "http://disc.example.com");
    }

    #[test]
    fn test_sk_flag() {
        let sk = "aa".repeat(32);
        let cli = Cli::try_parse_from(["meshterm-socks", "--sk", sk.as_str()]).unwrap();
        assert_eq!(cli.sk.as_deref(), Some(sk.as_str()));
    }

    #[test]
    fn test_invalid_port_fails() {
        let result = Cli::try_parse_from(["meshterm-socks", "--port", "not-a-port"]);
        assert!(result.is_err());
    }
}

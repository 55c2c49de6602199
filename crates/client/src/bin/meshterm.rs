//! meshterm: interactive CLI for pty sessions and whitelist administration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use client::config::Config;
use client::conn::prepare_conn;
use client::forward::{forward, ForwardOutcome};
use client::session::PtySession;
use client::term::RawModeGuard;
use client::whitelist::WhitelistClient;
use protocol::PubKey;

/// Interactive client for meshterm session hosts.
#[derive(Parser, Debug)]
#[command(name = "meshterm")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Control network kind ("unix" or "tcp")
    #[arg(long, global = true, value_name = "NET")]
    net: Option<String>,

    /// Control endpoint address (socket path or host:port)
    #[arg(long, global = true, value_name = "ADDR")]
    addr: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Start a pty on the session host
    Shell {
        /// Command to execute (defaults to $SHELL, then /bin/sh)
        cmd: Option<String>,

        /// Arguments passed through to the command verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start a pty on a remote host, proxied via the session host
    Remote {
        /// Public key of the remote host
        remote: PubKey,

        /// Mesh port the remote host serves pty sessions on
        port: u16,

        /// Command to execute (defaults to $SHELL, then /bin/sh)
        cmd: Option<String>,

        /// Arguments passed through to the command verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Manage the session host's whitelist
    #[command(subcommand)]
    Whitelist(WhitelistCommands),
}

/// Subcommands for whitelist management.
#[derive(Subcommand, Debug, Clone)]
enum WhitelistCommands {
    /// List all whitelisted keys
    List,

    /// Add a key to the whitelist
    Add {
        /// Public key to add
        key: PubKey,
    },

    /// Remove a key from the whitelist
    Remove {
        /// Public key to remove
        key: PubKey,
    },

    /// Check whether a key is whitelisted
    Get {
        /// Public key to look up
        key: PubKey,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration, then let environment and flags override it.
    let mut config = if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };
    config.apply_env_overrides();
    if let Some(net) = cli.net {
        config.cli.network = net;
    }
    if let Some(addr) = cli.addr {
        config.cli.address = addr;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    match cli.command {
        Commands::Shell { cmd, args } => {
            let conn = prepare_conn(&config.cli).await?;
            let session =
                PtySession::start(conn, cmd.unwrap_or_else(default_shell), args).await?;
            run_forwarder(session, cancel).await
        }
        Commands::Remote {
            remote,
            port,
            cmd,
            args,
        } => {
            let conn = prepare_conn(&config.cli).await?;
            let session = PtySession::start_remote(
                conn,
                remote,
                port,
                cmd.unwrap_or_else(default_shell),
                args,
            )
            .await?;
            run_forwarder(session, cancel).await
        }
        Commands::Whitelist(cmd) => {
            let conn = prepare_conn(&config.cli).await?;
            let mut wl = WhitelistClient::negotiate(conn).await?;

            match cmd {
                WhitelistCommands::List => {
                    let keys = wl.list().await?;
                    if keys.is_empty() {
                        println!("Whitelist is empty.");
                    } else {
                        for key in keys {
                            println!("{}", key);
                        }
                    }
                }
                WhitelistCommands::Add { key } => {
                    wl.add(key).await?;
                    println!("Added {}", key);
                }
                WhitelistCommands::Remove { key } => {
                    wl.remove(key).await?;
                    println!("Removed {}", key);
                }
                WhitelistCommands::Get { key } => {
                    println!("{}", wl.contains(key).await?);
                }
            }
            Ok(())
        }
    }
}

/// Runs the forwarder for a negotiated pty session, holding raw mode for
/// exactly the forwarding interval.
async fn run_forwarder<S>(session: PtySession<S>, cancel: CancellationToken) -> anyhow::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let kind = session.kind();

    // Raw mode is entered only after a successful negotiation and must be
    // restored on every exit path; the guard's Drop covers early returns.
    let guard = RawModeGuard::enter()?;
    let outcome = forward(session.into_channel(), cancel).await;
    guard.restore();

    match outcome? {
        ForwardOutcome::Closed => {
            tracing::info!(kind, "session closed");
        }
        ForwardOutcome::Cancelled => {
            tracing::info!(kind, "session cancelled");
        }
    }
    Ok(())
}

/// Returns the default command for a pty session.
fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Spawns a task that cancels `cancel` on SIGTERM or SIGINT.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Received shutdown signal");
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
    use protocol::Keypair;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_shell_command_defaults() {
        let cli = Cli::try_parse_from(["meshterm", "shell"]).unwrap();
        match cli.command {
            Commands::Shell { cmd, args } => {
                assert!(cmd.is_none());
                assert!(args.is_empty());
            }
            _ => panic!("Expected Shell command"),
        }
    }

    #[test]
    fn test_shell_command_with_args() {
        let cli = Cli::try_parse_from(["meshterm", "shell", "echo", "hi", "-n"]).unwrap();
        match cli.command {
            Commands::Shell { cmd, args } => {
                assert_eq!(cmd.as_deref(), Some("echo"));
                assert_eq!(args, vec!["hi", "-n"]);
            }
            _ => panic!("Expected Shell command"),
        }
    }

    #[test]
    fn test_remote_command() {
        let kp = Keypair::generate();
        let pk = kp.public.to_string();
        let cli = Cli::try_parse_from(["meshterm", "remote", &pk, "22", "ls"]).unwrap();
        match cli.command {
            Commands::Remote {
                remote,
                port,
                cmd,
                args,
            } => {
                assert_eq!(remote, kp.public);
                assert_eq!(port, 22);
                assert_eq!(cmd.as_deref(), Some("ls"));
                assert!(args.is_empty());
            }
            _ => panic!("Expected Remote command"),
        }
    }

    #[test]
    fn test_remote_rejects_bad_key() {
        let result = Cli::try_parse_from(["meshterm", "remote", "not-a-key", "22"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_whitelist_add() {
        let kp = Keypair::generate();
        let pk = kp.public.to_string();
        let cli = Cli::try_parse_from(["meshterm", "whitelist", "add", &pk]).unwrap();
        match cli.command {
            Commands::Whitelist(WhitelistCommands::Add { key }) => {
                assert_eq!(key, kp.public);
            }
            _ => panic!("Expected Whitelist Add command"),
        }
    }

    #[test]
    fn test_whitelist_list() {
        let cli = Cli::try_parse_from(["meshterm", "whitelist", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Whitelist(WhitelistCommands::List)
        ));
    }

    #[test]
    fn test_whitelist_without_subcommand_fails() {
        let result = Cli::try_parse_from(["meshterm", "whitelist"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_net_addr_flags() {
        let cli = Cli::try_parse_from([
            "meshterm",
            "--net",
            "tcp",
            "--addr",
            "localhost:7032",
            "shell",
        ])
        .unwrap();
        assert_eq!(cli.net.as_deref(), Some("tcp"));
        assert_eq!(cli.addr.as_deref(), Some("localhost:7032"));
    }

    #[test]
    fn test_global_flags_after_command() {
        let cli = Cli::try_parse_from(["meshterm", "shell", "--net", "tcp"]).unwrap();
        assert_eq!(cli.net.as_deref(), Some("tcp"));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        let result = Cli::try_parse_from(["meshterm"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_shell_not_empty() {
        assert!(!default_shell().is_empty());
    }
}

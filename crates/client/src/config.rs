//! Configuration for the meshterm front-ends.
//!
//! TOML-based configuration with per-section defaults. The default
//! configuration path is `~/.config/meshterm/config.toml`; a missing file
//! yields the defaults. Environment variables override file values.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default control network kind for the interactive CLI.
pub const DEFAULT_CLI_NET: &str = "unix";

/// Default control endpoint address for the interactive CLI.
pub const DEFAULT_CLI_ADDR: &str = "/tmp/meshterm.sock";

/// Default discovery service URL.
pub const DEFAULT_DISC_URL: &str = "https://disc.meshterm.net";

/// Default local SOCKS5 listen port.
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cli.network must be \"unix\" or \"tcp\", got {0:?}")]
    InvalidNetwork(String),

    #[error("transport.disc_url must be an http(s) URL, got {0:?}")]
    InvalidDiscUrl(String),
}

/// Main configuration structure for the meshterm front-ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Control-connection settings for the interactive CLI.
    pub cli: CliConfig,

    /// Transport settings shared by both front-ends.
    pub transport: TransportConfig,
}

/// Control-connection settings.
///
/// Empty values are legal here; the connection preparer injects the
/// defaults at dial time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    /// Control network kind: `"unix"` or `"tcp"`.
    pub network: String,

    /// Control endpoint address: a socket path or `host:port`.
    pub address: String,
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Discovery service URL.
    pub disc_url: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_CLI_NET.to_string(),
            address: DEFAULT_CLI_ADDR.to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            disc_url: DEFAULT_DISC_URL.to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meshterm")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - MESHTERM_CLI_NET: control network kind
    /// - MESHTERM_CLI_ADDR: control endpoint address
    /// - MESHTERM_DISC: discovery service URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(net) = std::env::var("MESHTERM_CLI_NET") {
            if !net.is_empty() {
                tracing::info!("Overriding cli.network from environment: {}", net);
                self.cli.network = net;
            }
        }

        if let Ok(addr) = std::env::var("MESHTERM_CLI_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding cli.address from environment: {}", addr);
                self.cli.address = addr;
            }
        }

        if let Ok(disc) = std::env::var("MESHTERM_DISC") {
            if !disc.is_empty() {
                tracing::info!("Overriding transport.disc_url from environment: {}", disc);
                self.transport.disc_url = disc;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Empty strings pass validation; they fall back to the defaults at
    /// use time.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let net = self.cli.network.as_str();
        if !net.is_empty() && net != "unix" && net != "tcp" {
            return Err(ConfigError::InvalidNetwork(net.to_string()));
        }

        let disc = self.transport.disc_url.as_str();
        if !disc.is_empty() {
            let parsed = url::Url::parse(disc)
                .map_err(|_| ConfigError::InvalidDiscUrl(disc.to_string()))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidDiscUrl(disc.to_string()));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cli.network, DEFAULT_CLI_NET);
        assert_eq!(config.cli.address, DEFAULT_CLI_ADDR);
        assert_eq!(config.transport.disc_url, DEFAULT_DISC_URL);
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[cli]
network = "tcp"
address = "localhost:7032"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.cli.network, "tcp");
        assert_eq!(config.cli.address, "localhost:7032");
        assert_eq!(config.transport.disc_url, DEFAULT_DISC_URL);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[cli\nnetwork = \"tcp\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[transport]\ndisc_url = \"http://localhost:9090\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.transport.disc_url, "http://localhost:9090");
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "invalid [ toml").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_empty_values() {
        let mut config = Config::default();
        config.cli.network = String::new();
        config.cli.address = String::new();
        config.transport.disc_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_network() {
        let mut config = Config::default();
        config.cli.network = "udp".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidNetwork("udp".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_disc_url() {
        let mut config = Config::default();
        config.transport.disc_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.transport.disc_url = "ftp://disc.example.com".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDiscUrl(
                "ftp://disc.example.com".to_string()
            ))
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("meshterm"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_address() {
        std::env::set_var("MESHTERM_CLI_ADDR", "/run/meshterm.sock");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.cli.address, "/run/meshterm.sock");

        std::env::remove_var("MESHTERM_CLI_ADDR");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("MESHTERM_CLI_NET", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.cli.network, DEFAULT_CLI_NET);

        std::env::remove_var("MESHTERM_CLI_NET");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("MESHTERM_DISC");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.transport.disc_url, DEFAULT_DISC_URL);
    }
}

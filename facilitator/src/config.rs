//! Configuration module for the x402 facilitator server.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use stellar_x402_types::network::Network;

/// CLI arguments for the x402 facilitator server.
#[derive(Parser, Debug)]
#[command(name = "stellar-x402-facilitator")]
#[command(about = "x402 Facilitator HTTP server for Stellar-family ledgers")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables, then to
/// hardcoded defaults, so an empty `{}` config file is a valid testnet config.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_network")]
    network: Network,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            network: config_defaults::default_network(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;
    use std::str::FromStr;
    use stellar_x402_types::network::Network;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_NETWORK: Network = Network::StellarTestnet;

    /// Returns the default port value with fallback: `$PORT` env var -> 8080.
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: `$HOST` env var -> "0.0.0.0".
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    /// Returns the default network with fallback: `$NETWORK` env var -> testnet.
    ///
    /// Defaulting to testnet rather than the public network means a facilitator
    /// started with no configuration at all cannot accidentally settle real payments.
    pub fn default_network() -> Network {
        env::var("NETWORK")
            .ok()
            .and_then(|s| Network::from_str(&s).ok())
            .unwrap_or(DEFAULT_NETWORK)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Get the port value.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the host value as an `IpAddr`.
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Get the configured network.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Load configuration from CLI arguments and an optional JSON file.
    ///
    /// The config file path is determined by `--config <path>` (default
    /// `./config.json`); values not present in the file fall back to environment
    /// variables and then to hardcoded defaults. A missing config file at the default
    /// path is not an error — the facilitator starts with all defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if !cli_args.config.exists() {
            return Ok(Config::default());
        }
        let path = cli_args
            .config
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_testnet() {
        assert_eq!(Config::default().network(), Network::StellarTestnet);
    }

    #[test]
    fn defaults_bind_all_interfaces() {
        assert_eq!(Config::default().host(), IpAddr::from([0, 0, 0, 0]));
    }
}

//! Supported Stellar-family networks.
//!
//! This module provides the [`Network`] enum identifying which Stellar-family ledger a
//! payment targets, plus a static registry mapping each network to the network passphrase,
//! Horizon (transaction-history) endpoint, and Soroban RPC endpoint it needs.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A Stellar-family network tag, as carried on the wire in `Challenge.network` and
/// `Payload.network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Stellar public (main) network.
    Stellar,
    /// Stellar test network.
    StellarTestnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stellar" => Ok(Network::Stellar),
            "stellar-testnet" => Ok(Network::StellarTestnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Error returned when a network tag does not match any known network.
#[derive(Debug, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

/// Static information about a network needed to reach its ledger.
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    /// The network passphrase used to derive transaction signature hashes.
    pub passphrase: &'static str,
    /// Base URL of the Horizon-compatible transaction-history endpoint.
    pub horizon_url: &'static str,
    /// Base URL of the Soroban-compatible smart-contract RPC endpoint.
    pub soroban_rpc_url: &'static str,
    /// Whether fee-bump sponsorship is offered for this network.
    pub fee_sponsorship: bool,
}

/// Registry mapping [`Network`] to its [`NetworkInfo`].
pub static NETWORKS: Lazy<HashMap<Network, NetworkInfo>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        Network::Stellar,
        NetworkInfo {
            passphrase: "Public Global Stellar Network ; September 2015",
            horizon_url: "https://horizon.stellar.org",
            soroban_rpc_url: "https://mainnet.sorobanrpc.com",
            fee_sponsorship: true,
        },
    );
    m.insert(
        Network::StellarTestnet,
        NetworkInfo {
            passphrase: "Test SDF Network ; September 2015",
            horizon_url: "https://horizon-testnet.stellar.org",
            soroban_rpc_url: "https://soroban-testnet.stellar.org",
            fee_sponsorship: true,
        },
    );
    m
});

impl Network {
    /// Looks up the static [`NetworkInfo`] for this network.
    pub fn info(&self) -> &'static NetworkInfo {
        NETWORKS.get(self).expect("every Network variant is registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for network in [Network::Stellar, Network::StellarTestnet] {
            let s = network.to_string();
            assert_eq!(Network::from_str(&s).unwrap(), network);
        }
    }

    #[test]
    fn every_network_has_info() {
        assert!(Network::Stellar.info().passphrase.contains("Public"));
        assert!(Network::StellarTestnet.info().passphrase.contains("Test"));
    }
}

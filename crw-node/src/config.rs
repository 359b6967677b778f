//! This binary's own configuration: which network to follow, where to
//! persist state, which peers to dial, and how verbosely to log.
//!
//! Loaded from a TOML file the way `crw-state::Config` and
//! `crw-network::Config` are meant to be assembled by a caller, not by
//! those crates themselves -- neither owns a notion of "the config file".

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crw_chain::parameters::Network;

use crate::error::ConfigError;

/// The full on-disk configuration for one node process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: Network,

    /// The address this node accepts inbound connections on; defaults to
    /// the network's standard port on all interfaces.
    pub listen_addr: Option<String>,

    /// Addresses dialed on startup, before any peer gossip has arrived.
    pub initial_peers: Vec<String>,

    /// Root directory block and UTXO data is stored under.
    pub cache_dir: Option<PathBuf>,

    /// The `tracing` filter directive, e.g. `info` or `crw_consensus=debug`.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Network::Mainnet,
            listen_addr: None,
            initial_peers: Vec::new(),
            cache_dir: None,
            log_filter: "info".to_owned(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file; a missing file is not an error
    /// callers are forced to handle here, since `main` falls back to
    /// [`Config::default`] when none is given.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Assembles the store's config from this node's settings.
    pub fn state_config(&self) -> crw_state::Config {
        let mut config = crw_state::Config::default();
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        config
    }

    /// Assembles the peer-session layer's config from this node's settings.
    pub fn network_config(&self) -> Result<crw_network::Config, ConfigError> {
        let mut config = crw_network::Config { network: self.network, ..crw_network::Config::default() };
        config.listen_addr = SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), self.network.default_port());

        if let Some(listen_addr) = &self.listen_addr {
            config.listen_addr = listen_addr
                .parse()
                .map_err(|_| ConfigError::InvalidListenAddr(listen_addr.clone()))?;
        }

        let mut initial_peers = Vec::with_capacity(self.initial_peers.len());
        for addr in &self.initial_peers {
            initial_peers.push(addr.parse().map_err(|_| ConfigError::InvalidPeerAddr(addr.clone()))?);
        }
        config.initial_peers = initial_peers;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_follows_mainnet() {
        assert_eq!(Config::default().network, Network::Mainnet);
    }

    #[test]
    fn network_config_rejects_an_unparseable_peer_address() {
        let config = Config { initial_peers: vec!["not-an-address".to_owned()], ..Config::default() };
        assert!(config.network_config().is_err());
    }

    #[test]
    fn network_config_defaults_the_listen_port_to_the_network() {
        let config = Config::default();
        let network_config = config.network_config().unwrap();
        assert_eq!(network_config.listen_addr.port(), Network::Mainnet.default_port());
    }
}

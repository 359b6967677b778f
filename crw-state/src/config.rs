use std::path::PathBuf;

use crw_chain::parameters::Network;

/// Configures [`crate::SledStore`] and the chain engine's reorg bookkeeping.
#[derive(Clone, Debug)]
pub struct Config {
    /// The root directory sled databases are created under, one
    /// subdirectory per network.
    pub cache_dir: PathBuf,

    /// Reorgs deeper than this are rejected rather than applied; undo data
    /// for blocks older than `tip_height - maximum_reorg_block_count` is
    /// dropped as each new block is committed.
    pub maximum_reorg_block_count: u32,

    /// Upper bound on the number of out-of-order blocks the chain engine
    /// will hold in its orphan buffer, keyed by missing-parent hash.
    pub max_orphan_blocks: usize,
}

impl Config {
    /// The sled database path for `network`, e.g. `<cache_dir>/state/mainnet`.
    pub fn db_path(&self, network: Network) -> PathBuf {
        self.cache_dir.join("state").join(network.to_string().to_lowercase())
    }

    pub fn sled_config(&self, network: Network) -> sled::Config {
        sled::Config::default().path(self.db_path(network))
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crw-node");

        Config {
            cache_dir,
            maximum_reorg_block_count: 100,
            max_orphan_blocks: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_is_per_network() {
        let config = Config { cache_dir: PathBuf::from("/tmp/crw-test"), ..Config::default() };
        assert_ne!(config.db_path(Network::Mainnet), config.db_path(Network::Testnet));
    }
}

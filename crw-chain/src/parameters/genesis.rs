//! Genesis consensus parameters for each network.

use crate::{block, parameters::Network};

/// The previous block hash for the genesis block.
///
/// Every network uses the conventional all-zero value for the parent of the
/// genesis block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// Returns the hash for the genesis block in `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    match network {
        Network::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        Network::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        Network::Regtest => "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
    }
    .parse()
    .expect("hard-coded hash parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hash_differs_per_network() {
        assert_ne!(
            genesis_hash(Network::Mainnet),
            genesis_hash(Network::Testnet)
        );
    }
}

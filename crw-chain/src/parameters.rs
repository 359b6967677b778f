//! Network and consensus-rule parameters.

mod genesis;
mod network;
mod network_upgrade;

pub use genesis::{genesis_hash, GENESIS_PREVIOUS_BLOCK_HASH};
pub use network::{Magic, Network};
pub use network_upgrade::{NetworkUpgrade, POW_AVERAGING_WINDOW};

//! Errors this binary's own wiring can produce, on top of the ones its
//! dependency crates already define.

use displaydoc::Display;
use thiserror::Error;

use crw_chain::parameters::Network;

/// The top-level error a node's startup or peer-service wiring can fail
/// with.
#[derive(Error, Display, Debug)]
pub enum NodeError {
    /// {0:?} has no synthesizable genesis block
    GenesisUnavailable(Network),
    #[error(transparent)]
    Verification(#[from] crw_consensus::VerificationError),
    #[error(transparent)]
    State(#[from] crw_state::StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] crw_state::BoxError),
}

/// An error loading this node's configuration file.
#[derive(Error, Display, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    /// listen address {0} could not be parsed
    InvalidListenAddr(String),
    /// peer address {0} could not be parsed
    InvalidPeerAddr(String),
}

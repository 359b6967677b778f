use std::net::SocketAddr;

use crw_chain::parameters::Network;

use crate::constants;

/// Configures how this node listens for and dials peers.
#[derive(Clone, Debug)]
pub struct Config {
    pub network: Network,

    /// The address this node accepts inbound connections on.
    pub listen_addr: SocketAddr,

    /// Addresses dialed on startup, before any peer gossip has arrived.
    pub initial_peers: Vec<SocketAddr>,

    /// Upper bound on a session's unsolicited-`inv` queue before it is
    /// considered to be flooding and disconnected.
    pub max_inv_queue: usize,

    /// How many `getdata(block)` requests may be outstanding across all
    /// sessions at once.
    pub max_in_flight_block_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        let network = Network::Mainnet;
        Config {
            listen_addr: SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), network.default_port()),
            initial_peers: Vec::new(),
            max_inv_queue: constants::MAX_INV_QUEUE,
            max_in_flight_block_requests: constants::MAX_IN_FLIGHT_BLOCK_REQUESTS,
            network,
        }
    }
}

//! Metadata about a peer address, as exchanged in `version` messages and
//! (eventually) `addr` gossip.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use crate::protocol::external::PeerServices;

/// Everything we know about one peer's network address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MetaAddr {
    pub addr: SocketAddr,
    pub services: PeerServices,
    pub last_seen: DateTime<Utc>,
}

impl MetaAddr {
    pub fn new(addr: SocketAddr, services: PeerServices) -> Self {
        MetaAddr { addr, services, last_seen: Utc::now() }
    }
}

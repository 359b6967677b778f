//! Newtype wrappers for primitive values carried on the wire.

use std::io;

use crw_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The protocol version spoken by a peer, negotiated during the handshake.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProtocolVersion(pub u32);

impl BitcoinSerialize for ProtocolVersion {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for ProtocolVersion {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::bitcoin_deserialize(reader)?))
    }
}

/// A nonce carried in `version`, `ping`, and `pong` messages.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl BitcoinSerialize for Nonce {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for Nonce {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::bitcoin_deserialize(reader)?))
    }
}

bitflags::bitflags! {
    /// Services advertised by a peer in its `version` message.
    #[derive(Default)]
    pub struct PeerServices: u64 {
        /// The peer can serve full blocks, not just headers.
        const NODE_NETWORK = 1 << 0;
        /// The peer can be queried for arbitrary blocks, not just recent ones.
        const NODE_NETWORK_LIMITED = 1 << 10;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.bits().bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let bits = u64::bitcoin_deserialize(reader)?;
        // Unknown bits are dropped rather than rejected; peers regularly
        // advertise service bits we don't know about yet.
        Ok(PeerServices::from_bits_truncate(bits))
    }
}

//! The 12-byte, NUL-padded ASCII command name carried in a message header.

use std::io;

use crw_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A message command, as it appears in the 12-byte command field of a
/// message header.
///
/// Stored as an enum rather than the raw bytes so the codec can match on it
/// directly; [`Self::bytes`] recovers the wire encoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    Inv,
    GetData,
    GetHeaders,
    Headers,
    Block,
    Tx,
    Mempool,
    NotFound,
    Reject,
}

impl Command {
    /// The 12-byte, NUL-padded wire encoding of this command.
    pub fn bytes(&self) -> &'static [u8; 12] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::Pong => b"pong\0\0\0\0\0\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::GetHeaders => b"getheaders\0\0",
            Command::Headers => b"headers\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
            Command::Mempool => b"mempool\0\0\0\0\0",
            Command::NotFound => b"notfound\0\0\0\0",
            Command::Reject => b"reject\0\0\0\0\0\0",
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(self.bytes())
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let bytes = <[u8; 12]>::bitcoin_deserialize(reader)?;
        for candidate in [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::Inv,
            Command::GetData,
            Command::GetHeaders,
            Command::Headers,
            Command::Block,
            Command::Tx,
            Command::Mempool,
            Command::NotFound,
            Command::Reject,
        ] {
            if candidate.bytes() == &bytes {
                return Ok(candidate);
            }
        }
        Err(SerializationError::parse("unrecognized command"))
    }
}

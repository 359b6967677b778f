use std::{fmt, io};

use serde::{Deserialize, Serialize};

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};

use super::Transaction;

/// A transaction id: the double-SHA256 hash of a transaction's non-witness
/// serialization (BIP141 `txid`, not `wtxid`).
///
/// Displayed big-endian, following the u256 convention used by
/// Bitcoin-derived chains; stored and transmitted little-endian.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(&reversed))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed))
            .finish()
    }
}

impl BitcoinSerialize for Hash {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl BitcoinDeserialize for Hash {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash(bytes))
        }
    }
}

impl<'a> From<&'a Transaction> for Hash {
    fn from(tx: &'a Transaction) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        tx.bitcoin_serialize_legacy(&mut hash_writer)
            .expect("Sha256dWriter is infallible");
        Hash(hash_writer.finish())
    }
}

impl Transaction {
    /// The witness transaction id (BIP141 `wtxid`): the hash of the full,
    /// witness-inclusive encoding. Equal to `txid()` when the transaction
    /// carries no witness data.
    pub fn wtxid(&self) -> Hash {
        if !self.has_witness() {
            return self.hash();
        }
        let mut hash_writer = sha256d::Writer::default();
        self.bitcoin_serialize(&mut hash_writer)
            .expect("Sha256dWriter is infallible");
        Hash(hash_writer.finish())
    }
}

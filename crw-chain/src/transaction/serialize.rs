//! (De)serialization for `Transaction`, including BIP144 witness framing.
//!
//! The consensus txid always hashes the non-witness ("legacy") encoding.
//! The full wire encoding additionally writes a `0x00 0x01` marker/flag
//! after the version when any input carries a witness, followed by each
//! input's witness stack after the outputs.

use std::{io, sync::Arc};

use crate::{
    cached::Cached,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transparent::{self, serialize::{read_witness, write_witness}},
};

use super::{LockTime, Transaction};

/// The maximum size of a transaction (including witness) in bytes.
pub const MAX_TX_SIZE: u64 = 1_000_000;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

impl Transaction {
    /// Serializes this transaction in its non-witness ("legacy") form, the
    /// encoding the txid is computed over.
    pub fn bitcoin_serialize_legacy<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        self.locktime.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinSerialize for Transaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        let witness = self.has_witness();
        self.version.bitcoin_serialize(&mut writer)?;
        if witness {
            writer.write_all(&[SEGWIT_MARKER, SEGWIT_FLAG])?;
        }
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        if witness {
            for input in self.inputs.iter() {
                write_witness(input, &mut writer)?;
            }
        }
        self.locktime.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

/// Deserializes a transaction, calculating and caching its txid.
impl BitcoinDeserialize for Transaction {
    fn bitcoin_deserialize<R: io::Read>(src: R) -> Result<Self, SerializationError> {
        // Sanity limit of 1 MB (a whole block) on the size of a transaction,
        // to protect against DOS attacks.
        let mut src = src.take(MAX_TX_SIZE);

        let version = i32::bitcoin_deserialize(&mut src)?;

        // Peek at the next byte to detect the SegWit marker. A legitimate
        // non-witness transaction always has at least one input, so a
        // leading zero byte (an empty input count) is unambiguous.
        let mut lookahead = [0u8; 1];
        src.read_exact(&mut lookahead)?;
        let is_segwit = lookahead[0] == SEGWIT_MARKER;

        let mut inputs = if is_segwit {
            let mut flag = [0u8; 1];
            src.read_exact(&mut flag)?;
            if flag[0] != SEGWIT_FLAG {
                return Err(SerializationError::parse("unknown segwit flag"));
            }
            <Vec<transparent::Input>>::bitcoin_deserialize(&mut src)?
        } else {
            // The byte we already consumed is the first byte of the
            // input-count CompactInt; push it back by re-parsing the count
            // from a chained reader.
            let rest = io::Cursor::new(lookahead).chain(&mut src);
            <Vec<transparent::Input>>::bitcoin_deserialize(rest)?
        };

        let outputs = <Vec<transparent::Output>>::bitcoin_deserialize(&mut src)?;

        if is_segwit {
            for input in inputs.iter_mut() {
                let stack = read_witness(&mut src)?;
                if let transparent::Input::PrevOut { witness, .. } = input {
                    *witness = stack;
                }
            }
        }

        let locktime = LockTime::bitcoin_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: Cached::new(),
        };
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}

impl<T> BitcoinDeserialize for Arc<T>
where
    T: BitcoinDeserialize,
{
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Arc::new(T::bitcoin_deserialize(reader)?))
    }
}

impl<T> BitcoinSerialize for Arc<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        T::bitcoin_serialize(self, writer)
    }
}

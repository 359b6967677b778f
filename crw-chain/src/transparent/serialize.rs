//! Wire (de)serialization for transparent inputs.
//!
//! `Input` has no explicit variant tag on the wire: a coinbase input is
//! distinguished by its conventional all-zero, all-ones outpoint. Witness
//! data is deliberately not written here -- it's framed at the transaction
//! level, after all inputs and outputs, per BIP144.

use std::io;

use crate::{
    block,
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

use super::{CoinbaseData, Input, OutPoint, Script};

/// The outpoint every coinbase input uses: an all-zero previous txid and an
/// index of `0xffff_ffff`.
fn coinbase_outpoint() -> OutPoint {
    OutPoint {
        hash: transaction::Hash(block::Hash([0u8; 32]).0),
        index: u32::MAX,
    }
}

impl BitcoinSerialize for OutPoint {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.hash.bitcoin_serialize(&mut writer)?;
        self.index.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
                ..
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)?;
            }
            Input::Coinbase { data, sequence, .. } => {
                coinbase_outpoint().bitcoin_serialize(&mut writer)?;
                CompactInt::from(data.0.len()).bitcoin_serialize(&mut writer)?;
                writer.write_all(&data.0)?;
                sequence.bitcoin_serialize(&mut writer)?;
            }
        }
        Ok(())
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        let coinbase = coinbase_outpoint();

        if outpoint.hash == coinbase.hash && outpoint.index == coinbase.index {
            let script = Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase {
                height: None,
                data: CoinbaseData(script.0),
                sequence,
            })
        } else {
            let unlock_script = Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
                witness: Vec::new(),
            })
        }
    }
}

/// Writes one input's witness stack: an item count followed by each item as
/// a length-prefixed byte string. Coinbase inputs always have an empty stack
/// once a witness commitment is present (the commitment itself lives in a
/// special output, handled at the block level).
pub(crate) fn write_witness<W: io::Write>(input: &Input, mut writer: W) -> Result<(), io::Error> {
    let stack: &[Vec<u8>] = match input {
        Input::PrevOut { witness, .. } => witness,
        Input::Coinbase { .. } => &[],
    };
    stack.to_vec().bitcoin_serialize(&mut writer)
}

pub(crate) fn read_witness<R: io::Read>(
    mut reader: R,
) -> Result<Vec<Vec<u8>>, SerializationError> {
    Vec::<Vec<u8>>::bitcoin_deserialize(&mut reader)
}

//! Transparent (Bitcoin-inherited) transaction input/output types.
#![allow(clippy::unit_arg)]

mod address;
mod script;
pub(crate) mod serialize;

pub use address::Address;
pub use script::Script;

use crate::{
    cached::Cached, compactint::CompactInt, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};
use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::{
    amount::{Amount, NonNegative},
    block, transaction,
};

/// Arbitrary data inserted by miners into a coinbase transaction.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, BtcDeserialize, BtcSerialize)]
pub struct CoinbaseData(
    /// Invariant: this vec must be less than 100 bytes. We enforce this by
    /// only constructing `CoinbaseData` via parsing, never directly.
    pub(super) Vec<u8>,
);

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CoinbaseData {
    /// Builds coinbase data from raw bytes, checked against the same
    /// 100-byte limit parsing enforces.
    pub fn new(data: Vec<u8>) -> Result<Self, SerializationError> {
        if data.len() >= 100 {
            return Err(SerializationError::parse(
                "coinbase data must be less than 100 bytes",
            ));
        }
        Ok(CoinbaseData(data))
    }

    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .unwrap_or_else(|_| hex::encode(&self.0));
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash, BtcSerialize, BtcDeserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the output, also used to encode
        /// BIP68 relative-locktime constraints.
        sequence: u32,
        /// The segregated witness stack for this input (BIP141/144).
        /// Empty when the input is spending a pre-SegWit output.
        /// Not part of the transaction's txid serialization.
        witness: Vec<Vec<u8>>,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// The BIP-34 block height of this block, cached once computed
        /// from the coinbase data. `None` before BIP-34 activation.
        height: Option<Cached<block::Height>>,
        /// Arbitrary data inserted by the miner; contains the encoded
        /// block height after BIP-34 activation.
        data: CoinbaseData,
        /// The sequence number for the output.
        sequence: u32,
    },
}

impl Input {
    /// Builds a coinbase input, optionally pre-caching its BIP-34 height so
    /// callers that already know it (e.g. a block assembler) don't pay for a
    /// redundant parse of `data`.
    pub fn new_coinbase(height: Option<block::Height>, data: CoinbaseData, sequence: u32) -> Input {
        Input::Coinbase {
            height: height.map(Cached::from),
            data,
            sequence,
        }
    }

    /// Returns `true` if this input carries witness data.
    pub fn has_witness(&self) -> bool {
        matches!(self, Input::PrevOut { witness, .. } if !witness.is_empty())
    }

    /// Serialized length of this input, excluding any witness data.
    pub fn len(&self) -> usize {
        match *self {
            Input::PrevOut {
                ref unlock_script, ..
            } => OutPoint::len() + unlock_script.serialized_size() + 4,
            Input::Coinbase { ref data, .. } => {
                OutPoint::len() + data.serialized_size() + 4
            }
        }
    }

    /// Serialized length of this input's witness stack (zero if empty).
    pub fn witness_len(&self) -> usize {
        match self {
            Input::PrevOut { witness, .. } => {
                CompactInt::size(witness.len())
                    + witness
                        .iter()
                        .map(|item| CompactInt::size(item.len()) + item.len())
                        .sum::<usize>()
            }
            Input::Coinbase { .. } => 0,
        }
    }
}

/// A transparent output from a transaction.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety: spending part of one requires creating a new output
/// for the change.
#[derive(
    Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, BtcDeserialize, BtcSerialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    /// Transaction value, in satoshis.
    pub value: Amount<NonNegative>,

    /// The lock script defines the conditions under which this output can be spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}

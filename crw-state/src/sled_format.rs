//! Key/value encoding for the `sled` trees `SledStore` opens.
//!
//! Heights are stored as big-endian `u32` keys so `sled::Tree` iteration
//! order (which is byte-lexicographic) matches height order; everything
//! else round-trips through the wire encoding already defined on
//! `crw_chain`'s types.

use std::convert::TryInto;

use crw_chain::{block, transaction, transparent, BitcoinDeserialize, BitcoinSerialize};

use crate::{BoxError, Utxo};

/// Encodes `self` as a sled key or value.
pub trait SledSerialize {
    fn sled_bytes(&self) -> Vec<u8>;
}

/// Decodes a sled key or value back into `Self`.
pub trait SledDeserialize: Sized {
    fn from_sled_bytes(bytes: &[u8]) -> Result<Self, BoxError>;
}

/// Decodes directly from a `sled::IVec`, for call sites that already have one.
pub trait FromSled: Sized {
    fn from_ivec(ivec: sled::IVec) -> Result<Self, BoxError>;
}

impl<T: SledDeserialize> FromSled for T {
    fn from_ivec(ivec: sled::IVec) -> Result<Self, BoxError> {
        T::from_sled_bytes(&ivec)
    }
}

impl SledSerialize for block::Height {
    fn sled_bytes(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

impl SledDeserialize for block::Height {
    fn from_sled_bytes(bytes: &[u8]) -> Result<Self, BoxError> {
        let array: [u8; 4] = bytes.try_into()?;
        Ok(block::Height(u32::from_be_bytes(array)))
    }
}

macro_rules! impl_sled_via_bitcoin_serialize {
    ($ty:ty) => {
        impl SledSerialize for $ty {
            fn sled_bytes(&self) -> Vec<u8> {
                let mut bytes = Vec::new();
                self.bitcoin_serialize(&mut bytes).expect("serializing to a Vec cannot fail");
                bytes
            }
        }

        impl SledDeserialize for $ty {
            fn from_sled_bytes(bytes: &[u8]) -> Result<Self, BoxError> {
                Ok(<$ty>::bitcoin_deserialize(bytes)?)
            }
        }
    };
}

impl_sled_via_bitcoin_serialize!(block::Hash);
impl_sled_via_bitcoin_serialize!(block::Header);
impl_sled_via_bitcoin_serialize!(block::Block);
impl_sled_via_bitcoin_serialize!(transaction::Transaction);
impl_sled_via_bitcoin_serialize!(transparent::OutPoint);
impl_sled_via_bitcoin_serialize!(transparent::Output);

impl SledSerialize for Utxo {
    fn sled_bytes(&self) -> Vec<u8> {
        let mut bytes = self.output.sled_bytes();
        bytes.extend_from_slice(&self.height.0.to_be_bytes());
        bytes.push(self.is_coinbase as u8);
        bytes
    }
}

impl SledDeserialize for Utxo {
    fn from_sled_bytes(bytes: &[u8]) -> Result<Self, BoxError> {
        let (output_bytes, rest) = bytes.split_at(bytes.len() - 5);
        let output = transparent::Output::from_sled_bytes(output_bytes)?;
        let height = block::Height(u32::from_be_bytes(rest[..4].try_into()?));
        let is_coinbase = rest[4] != 0;
        Ok(Utxo::new(output, height, is_coinbase))
    }
}

/// Insert helpers over `sled::Tree` that hide the serialization step.
pub trait SledTreeExt {
    fn zs_insert<K: SledSerialize, V: SledSerialize>(&self, key: K, value: V) -> Result<(), BoxError>;
    fn zs_get<K: SledSerialize, V: FromSled>(&self, key: &K) -> Result<Option<V>, BoxError>;
    fn zs_remove<K: SledSerialize>(&self, key: &K) -> Result<(), BoxError>;
}

impl SledTreeExt for sled::Tree {
    fn zs_insert<K: SledSerialize, V: SledSerialize>(&self, key: K, value: V) -> Result<(), BoxError> {
        self.insert(key.sled_bytes(), value.sled_bytes())?;
        Ok(())
    }

    fn zs_get<K: SledSerialize, V: FromSled>(&self, key: &K) -> Result<Option<V>, BoxError> {
        match self.get(key.sled_bytes())? {
            Some(ivec) => Ok(Some(V::from_ivec(ivec)?)),
            None => Ok(None),
        }
    }

    fn zs_remove<K: SledSerialize>(&self, key: &K) -> Result<(), BoxError> {
        self.remove(key.sled_bytes())?;
        Ok(())
    }
}

//! The transaction Merkle tree binding a block header to its transactions.

use std::{fmt, io};

use serde::{Deserialize, Serialize};

use crate::{
    serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

/// The root of a block's transaction Merkle tree.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed))
            .finish()
    }
}

impl BitcoinSerialize for Root {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

/// Hashes a pair of nodes together per the Bitcoin Merkle tree construction:
/// `sha256d(left || right)`.
fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(left);
    data.extend_from_slice(right);
    sha256d::hash(&data)
}

/// Computes the Merkle root of a list of transaction hashes.
///
/// Follows Bitcoin's convention: an empty level is padded by duplicating its
/// last element when it has an odd number of nodes. The classic
/// CVE-2012-2459 duplicate-transaction ambiguity this creates is guarded
/// against separately, by rejecting blocks containing duplicate transaction
/// ids before computing the root.
fn merkle_root(hashes: &[transaction::Hash]) -> Root {
    if hashes.is_empty() {
        return Root([0u8; 32]);
    }

    let mut level: Vec<[u8; 32]> = hashes.iter().map(|h| h.0).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("level is non-empty");
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    Root(level[0])
}

impl std::iter::FromIterator<transaction::Hash> for Root {
    fn from_iter<T: IntoIterator<Item = transaction::Hash>>(iter: T) -> Self {
        let hashes: Vec<transaction::Hash> = iter.into_iter().collect();
        merkle_root(&hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_is_its_own_root() {
        let hash = transaction::Hash([7u8; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_count_duplicates_last() {
        let a = transaction::Hash([1u8; 32]);
        let b = transaction::Hash([2u8; 32]);
        let c = transaction::Hash([3u8; 32]);

        let root: Root = vec![a, b, c].into_iter().collect();
        let expected_root: Root = vec![a, b, c, c].into_iter().collect();
        assert_eq!(root.0, expected_root.0);
    }
}

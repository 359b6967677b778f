//! Proof-of-work difficulty encodings.
//!
//! A block header carries its target threshold in the compact `nBits`
//! format: one exponent byte and three mantissa bytes. [`CompactDifficulty`]
//! is that wire encoding; [`ExpandedDifficulty`] is the full 256-bit target
//! it decodes to, used to check a header's proof of work and to run the
//! difficulty retarget calculation.

use std::{cmp::Ordering, fmt, io};

use primitive_types::U256;

use crate::{
    parameters::Network,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// The nBits-encoded difficulty threshold carried in a block header.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CompactDifficulty(pub u32);

/// A fully expanded 256-bit proof-of-work target threshold.
///
/// A block's hash, interpreted as a 256-bit little-endian integer, must be
/// less than or equal to this value for the block to satisfy its proof of
/// work.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct ExpandedDifficulty(pub U256);

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpandedDifficulty")
            .field(&format!("{:064x}", self.0))
            .finish()
    }
}

impl PartialOrd for ExpandedDifficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExpandedDifficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl ExpandedDifficulty {
    /// Interprets a block hash as a 256-bit little-endian integer, the form
    /// it's compared against a difficulty threshold in.
    pub fn from_hash(hash: crate::block::Hash) -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from_little_endian(&hash.0))
    }

    /// The loosest target a header's proof of work is ever allowed to claim
    /// on `network`: mainnet's is the historical genesis difficulty, and the
    /// test networks use a target so loose that a single CPU can mine it.
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        match network {
            Network::Mainnet => CompactDifficulty(0x1d00ffff)
                .to_expanded()
                .expect("mainnet PoW limit is a valid compact difficulty"),
            Network::Testnet => CompactDifficulty(0x1d00ffff)
                .to_expanded()
                .expect("testnet PoW limit is a valid compact difficulty"),
            Network::Regtest => CompactDifficulty(0x207fffff)
                .to_expanded()
                .expect("regtest PoW limit is a valid compact difficulty"),
        }
    }
}

impl CompactDifficulty {
    /// Decodes the compact nBits encoding into a full 256-bit target.
    ///
    /// Returns `None` if the encoded target would overflow 256 bits or is
    /// otherwise out of the representable range, matching Bitcoin Core's
    /// own rejection of malformed `nBits` values.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let bits = self.0;
        let exponent = (bits >> 24) as u32;
        let mantissa = bits & 0x007f_ffff;
        let is_negative = bits & 0x0080_0000 != 0;

        if is_negative || mantissa == 0 {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa) >> (8 * (3 - exponent))
        } else {
            if exponent > 32 {
                return None;
            }
            U256::from(mantissa) << (8 * (exponent - 3))
        };

        Some(ExpandedDifficulty(target))
    }

    /// Returns the compact encoding with the most significant bit of its
    /// mantissa representing `target`'s highest set bit, truncating any
    /// precision beyond three mantissa bytes.
    pub fn from_expanded(target: ExpandedDifficulty) -> CompactDifficulty {
        let mut bytes = [0u8; 32];
        target.0.to_big_endian(&mut bytes);
        let first_nonzero = bytes.iter().position(|&b| b != 0);

        let (size, mantissa_bytes) = match first_nonzero {
            None => (0usize, [0u8; 3]),
            Some(idx) => {
                let size = 32 - idx;
                let mut mantissa = [0u8; 3];
                for (i, m) in mantissa.iter_mut().enumerate() {
                    *m = *bytes.get(idx + i).unwrap_or(&0);
                }
                // If the high bit of the mantissa is set, Bitcoin's encoding
                // shifts right by one byte and bumps the exponent, so the
                // sign bit in the compact form never gets set by accident.
                if mantissa[0] & 0x80 != 0 {
                    let mut shifted = [0u8; 3];
                    shifted[1] = mantissa[0];
                    shifted[2] = mantissa[1];
                    (size + 1, shifted)
                } else {
                    (size, mantissa)
                }
            }
        };

        let mantissa = u32::from_be_bytes([0, mantissa_bytes[0], mantissa_bytes[1], mantissa_bytes[2]]);
        CompactDifficulty(((size as u32) << 24) | mantissa)
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_genesis_difficulty() {
        // Bitcoin mainnet genesis difficulty bits.
        let compact = CompactDifficulty(0x1d00ffff);
        let expanded = compact.to_expanded().unwrap();
        assert_eq!(expanded.0, U256::from(0x00ffffu64) << (8 * (0x1d - 3)));
    }

    #[test]
    fn rejects_negative_encoding() {
        let compact = CompactDifficulty(0x01800000);
        assert!(compact.to_expanded().is_none());
    }

    #[test]
    fn roundtrips_through_expanded_form() {
        let compact = CompactDifficulty(0x1b0404cb);
        let expanded = compact.to_expanded().unwrap();
        let recompacted = CompactDifficulty::from_expanded(expanded);
        assert_eq!(compact, recompacted);
    }
}

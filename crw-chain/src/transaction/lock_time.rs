use std::io;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    block,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// A transaction's lock time: either a block height or a Unix timestamp
/// below which the transaction may not be mined, per standard Bitcoin
/// locktime semantics. A value of `0` means "no lock time".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    Height(block::Height),
    Time(DateTime<Utc>),
}

impl LockTime {
    /// Locktime values below this are interpreted as block heights.
    pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

    pub fn new_height(height: block::Height) -> Self {
        LockTime::Height(height)
    }

    /// Returns `true` if this locktime has already unlocked the transaction
    /// at `tip_height`/`tip_time`.
    pub fn is_satisfied_by(&self, tip_height: block::Height, tip_time: DateTime<Utc>) -> bool {
        match self {
            LockTime::Height(h) => tip_height.0 >= h.0,
            LockTime::Time(t) => tip_time >= *t,
        }
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        let raw = match self {
            LockTime::Height(h) => h.0,
            LockTime::Time(t) => t.timestamp() as u32,
        };
        raw.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < Self::LOCKTIME_THRESHOLD {
            Ok(LockTime::Height(block::Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_roundtrip() {
        let mut buf = Vec::new();
        let lt = LockTime::Height(block::Height(500));
        lt.bitcoin_serialize(&mut buf).unwrap();
        let lt2 = LockTime::bitcoin_deserialize(&buf[..]).unwrap();
        assert_eq!(lt, lt2);
    }

    #[test]
    fn time_roundtrip() {
        let mut buf = Vec::new();
        let lt = LockTime::Time(Utc.timestamp(600_000_000, 0));
        lt.bitcoin_serialize(&mut buf).unwrap();
        let lt2 = LockTime::bitcoin_deserialize(&buf[..]).unwrap();
        assert_eq!(lt, lt2);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// The height of a block, i.e. the number of blocks in its chain below it.
///
/// The genesis block is at `Height(0)`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Height(pub u32);

impl Height {
    /// The minimum possible height.
    pub const MIN: Height = Height(0);

    /// The maximum possible height, constrained by the `i32` coinbase height
    /// encoding used by BIP34-era scripts.
    pub const MAX: Height = Height(i32::MAX as u32);

    /// Returns the height one block below `self`, or `None` at the genesis block.
    pub fn previous(self) -> Option<Height> {
        self.0.checked_sub(1).map(Height)
    }

    /// Returns the height one block above `self`, or `None` on overflow.
    pub fn next(self) -> Option<Height> {
        self.0.checked_add(1).map(Height)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Height> for u32 {
    fn from(height: Height) -> u32 {
        height.0
    }
}

impl From<u32> for Height {
    fn from(h: u32) -> Height {
        Height(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Height(1) < Height(2));
        assert_eq!(Height(5).previous(), Some(Height(4)));
        assert_eq!(Height::MIN.previous(), None);
    }
}

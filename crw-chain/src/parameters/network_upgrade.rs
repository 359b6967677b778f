//! Soft-fork activation heights.

use NetworkUpgrade::*;

use crate::block;
use crate::parameters::{Network, Network::*};

use std::collections::BTreeMap;
use std::ops::Bound::*;

use chrono::Duration;

/// A consensus rule change activated at a fixed block height.
///
/// Declaration order is activation order: later variants supersede earlier
/// ones, so `is_active` only needs to compare against whichever upgrade is
/// current at a height, not look that specific variant up in the table.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum NetworkUpgrade {
    /// The protocol at the genesis block, before any soft forks.
    Genesis,
    /// [`BIP 34`](https://github.com/bitcoin/bips/blob/master/bip-0034.mediawiki):
    /// coinbase transactions must encode the block height.
    BIP34,
    /// [`BIP 66`](https://github.com/bitcoin/bips/blob/master/bip-0066.mediawiki):
    /// strict DER encoding for ECDSA signatures.
    BIP66,
    /// [`BIP 65`](https://github.com/bitcoin/bips/blob/master/bip-0065.mediawiki):
    /// `OP_CHECKLOCKTIMEVERIFY`.
    BIP65,
    /// [`BIP 68`](https://github.com/bitcoin/bips/blob/master/bip-0068.mediawiki) /
    /// [`BIP 112`](https://github.com/bitcoin/bips/blob/master/bip-0112.mediawiki):
    /// relative locktime and `OP_CHECKSEQUENCEVERIFY`.
    CSV,
    /// [`BIP 141`](https://github.com/bitcoin/bips/blob/master/bip-0141.mediawiki) /
    /// [`BIP 143`](https://github.com/bitcoin/bips/blob/master/bip-0143.mediawiki) /
    /// [`BIP 144`](https://github.com/bitcoin/bips/blob/master/bip-0144.mediawiki):
    /// segregated witness.
    SegWit,
}

/// Mainnet soft-fork activation heights.
///
/// This is a bijective map, but it's a const array rather than a `BTreeMap`
/// so it can be `const`; uniqueness is checked in the unit tests.
pub(crate) const MAINNET_ACTIVATION_HEIGHTS: &[(block::Height, NetworkUpgrade)] = &[
    (block::Height(0), Genesis),
    (block::Height(227931), BIP34),
    (block::Height(363725), BIP66),
    (block::Height(388381), BIP65),
    (block::Height(419328), CSV),
    (block::Height(481824), SegWit),
];

/// Testnet soft-fork activation heights.
pub(crate) const TESTNET_ACTIVATION_HEIGHTS: &[(block::Height, NetworkUpgrade)] = &[
    (block::Height(0), Genesis),
    (block::Height(21111), BIP34),
    (block::Height(330776), BIP66),
    (block::Height(581885), BIP65),
    (block::Height(770112), CSV),
    (block::Height(834624), SegWit),
];

/// Regtest activates every rule from genesis, so engines exercising the full
/// validation path don't need to mine through a multi-year activation history.
pub(crate) const REGTEST_ACTIVATION_HEIGHTS: &[(block::Height, NetworkUpgrade)] =
    &[(block::Height(0), SegWit)];

/// The target spacing between blocks, in seconds.
const POW_TARGET_SPACING: i64 = 10 * 60;

/// The number of blocks in a difficulty retarget window.
pub const POW_AVERAGING_WINDOW: usize = 2016;

impl NetworkUpgrade {
    /// Returns the activation-height map for `network`.
    pub(crate) fn activation_list(network: Network) -> BTreeMap<block::Height, NetworkUpgrade> {
        match network {
            Mainnet => MAINNET_ACTIVATION_HEIGHTS,
            Testnet => TESTNET_ACTIVATION_HEIGHTS,
            Regtest => REGTEST_ACTIVATION_HEIGHTS,
        }
        .iter()
        .cloned()
        .collect()
    }

    /// Returns the active rule set for `network` at `height`.
    pub fn current(network: Network, height: block::Height) -> NetworkUpgrade {
        NetworkUpgrade::activation_list(network)
            .range(..=height)
            .map(|(_, nu)| *nu)
            .next_back()
            .expect("every height has a current network upgrade")
    }

    /// Returns the next scheduled rule change after `height`, if any.
    pub fn next(network: Network, height: block::Height) -> Option<NetworkUpgrade> {
        NetworkUpgrade::activation_list(network)
            .range((Excluded(height), Unbounded))
            .map(|(_, nu)| *nu)
            .next()
    }

    /// Returns the height at which this rule set activates on `network`.
    pub fn activation_height(&self, network: Network) -> Option<block::Height> {
        NetworkUpgrade::activation_list(network)
            .iter()
            .find(|(_, nu)| nu == self)
            .map(|(height, _)| *height)
    }

    /// Returns whether `self` is active for `network` at `height`: true once
    /// the current upgrade at that height is `self` or a later one.
    pub fn is_active(&self, network: Network, height: block::Height) -> bool {
        *self <= NetworkUpgrade::current(network, height)
    }

    pub fn target_spacing(&self) -> Duration {
        Duration::seconds(POW_TARGET_SPACING)
    }

    pub fn target_spacing_for_height(network: Network, height: block::Height) -> Duration {
        NetworkUpgrade::current(network, height).target_spacing()
    }

    pub fn averaging_window_timespan(&self) -> Duration {
        self.target_spacing() * (POW_AVERAGING_WINDOW as i32)
    }

    pub fn averaging_window_timespan_for_height(
        network: Network,
        height: block::Height,
    ) -> Duration {
        NetworkUpgrade::current(network, height).averaging_window_timespan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn activation_heights_are_unique_and_sorted() {
        for heights in [MAINNET_ACTIVATION_HEIGHTS, TESTNET_ACTIVATION_HEIGHTS] {
            let mut seen = HashSet::new();
            let mut last = None;
            for (height, _) in heights {
                assert!(seen.insert(height.0), "duplicate activation height");
                if let Some(last) = last {
                    assert!(last < height.0);
                }
                last = Some(height.0);
            }
        }
    }

    #[test]
    fn current_and_next_agree_at_boundaries() {
        assert_eq!(
            NetworkUpgrade::current(Network::Mainnet, block::Height(227931)),
            NetworkUpgrade::BIP34
        );
        assert_eq!(
            NetworkUpgrade::current(Network::Mainnet, block::Height(227930)),
            NetworkUpgrade::Genesis
        );
        assert_eq!(
            NetworkUpgrade::next(Network::Mainnet, block::Height(0)),
            Some(NetworkUpgrade::BIP34)
        );
    }

    #[test]
    fn segwit_is_active_from_regtest_genesis() {
        assert!(NetworkUpgrade::SegWit.is_active(Network::Regtest, block::Height(0)));
    }
}

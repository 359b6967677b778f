//! Constructs the block a fresh store is bootstrapped with.
//!
//! Real Bitcoin-derived networks fix their genesis block to a specific,
//! historically-mined set of header bytes -- but producing those bytes
//! requires actually solving the proof-of-work puzzle, which is exactly the
//! mining responsibility this extract's spec calls a Non-goal. So this
//! module only synthesizes a genesis block for [`Network::Regtest`], whose
//! difficulty limit is wide enough that essentially any nonce satisfies it
//! (the same trick `crw_consensus::engine`'s own test harness relies on).

use std::convert::TryFrom;
use std::sync::Arc;

use crw_chain::{
    amount::{Amount, NonNegative},
    block::{self, merkle, Block, Header},
    parameters::{Network, GENESIS_PREVIOUS_BLOCK_HASH},
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Output, Script},
    work::difficulty::CompactDifficulty,
};

use crate::error::NodeError;

/// The block subsidy of CRW's own synthetic genesis coinbase, in satoshis.
const GENESIS_SUBSIDY: i64 = 50 * crw_chain::amount::COIN;

/// The nBits encoding of regtest's difficulty limit: an all-but-trivial
/// target, wide enough that a freshly-assembled header satisfies proof of
/// work without grinding for a nonce.
const REGTEST_BITS: CompactDifficulty = CompactDifficulty(0x207f_ffff);

/// Builds the block a fresh [`crw_state::SledStore`] is seeded with on
/// `network`, or an error if `network` has no synthesizable genesis (see
/// the module docs).
pub fn genesis_block(network: Network) -> Result<Arc<Block>, NodeError> {
    match network {
        Network::Regtest => Ok(regtest_genesis()),
        Network::Mainnet | Network::Testnet => Err(NodeError::GenesisUnavailable(network)),
    }
}

fn regtest_genesis() -> Arc<Block> {
    let data = CoinbaseData::new(b"crw regtest genesis".to_vec()).expect("well under the 100-byte coinbase limit");
    let input = crw_chain::transparent::Input::new_coinbase(Some(block::Height(0)), data, 0xffff_ffff);
    let output = Output {
        value: Amount::<NonNegative>::try_from(GENESIS_SUBSIDY).expect("genesis subsidy fits in an Amount"),
        lock_script: Script(vec![crw_script::opcode::OP_1]),
    };
    let coinbase = Transaction::new(1, vec![input], vec![output], LockTime::new_height(block::Height(0)));

    let merkle_root: merkle::Root = std::iter::once(coinbase.hash()).collect();
    let header = Header::new(
        1,
        GENESIS_PREVIOUS_BLOCK_HASH,
        merkle_root,
        chrono::Utc::now(),
        REGTEST_BITS,
        0,
    );

    Arc::new(Block { header, transactions: vec![Arc::new(coinbase)] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regtest_genesis_is_a_coinbase_only_block() {
        let genesis = genesis_block(Network::Regtest).unwrap();
        assert_eq!(genesis.header.previous_block_hash, GENESIS_PREVIOUS_BLOCK_HASH);
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
    }

    #[test]
    fn mainnet_and_testnet_have_no_synthetic_genesis() {
        assert!(genesis_block(Network::Mainnet).is_err());
        assert!(genesis_block(Network::Testnet).is_err());
    }
}

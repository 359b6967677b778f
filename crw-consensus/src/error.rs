//! The error taxonomy the chain engine and its context-free checks produce.

use displaydoc::Display;
use thiserror::Error;

use crw_chain::{
    block,
    parameters::Network,
    transaction,
    work::difficulty::ExpandedDifficulty,
};

/// An error validating a transaction, independent of chain context.
#[derive(Error, Display, Debug, PartialEq, Clone)]
pub enum TransactionError {
    /// transaction has no inputs
    NoInputs,
    /// transaction has no outputs
    NoOutputs,
    /// coinbase transaction must be the first in the block
    CoinbasePosition,
    /// coinbase input found in non-coinbase transaction
    CoinbaseInputFound,
    /// transaction spends the same outpoint twice
    DuplicateOutPoint,
    /// transaction serializes to more than the block size limit
    ExceedsSizeLimit,
    /// transaction lock time has not been reached
    LockTimeNotReached,
    /// could not resolve an input's UTXO
    MissingUtxo(transaction::Hash, u32),
    /// spent a coinbase output before it matured
    ImmatureCoinbaseSpend,
    /// sum of transaction outputs exceeds sum of its inputs
    ValueUnbalanced,
    /// transaction output or input amount under- or overflowed
    AmountOverflow,
    #[error(transparent)]
    Script(#[from] crw_script::ScriptError),
    #[error(transparent)]
    Amount(#[from] crw_chain::amount::AmountError),
}

/// An error validating a block, independent of chain context.
#[derive(Error, Display, Debug, PartialEq, Clone)]
pub enum BlockError {
    /// block has no transactions
    NoTransactions,
    /// block exceeds the maximum serialized size
    ExceedsSizeLimit,
    /// block {0:?} hash {1:?} has no valid double-SHA256 proof of work
    InvalidProofOfWork(block::Height, block::Hash),
    /// block {0:?} hash {1:?} difficulty_threshold field not in valid format
    InvalidDifficulty(block::Height, block::Hash),
    /// block {0:?} hash {1:?} has difficulty threshold {2:?} greater than the {4:?} difficulty limit {3:?}
    TargetDifficultyLimit(
        block::Height,
        block::Hash,
        ExpandedDifficulty,
        Network,
        ExpandedDifficulty,
    ),
    /// block {0:?} hash {1:?} has hash greater than the difficulty threshold {2:?} for {3:?}
    DifficultyFilter(block::Height, block::Hash, ExpandedDifficulty, Network),
    /// block {0:?} hash {1:?} difficulty threshold does not match the expected retarget value
    BadDifficultyRetarget(block::Height, block::Hash),
    /// block merkle root {actual:?} does not match computed root {expected:?}
    BadMerkleRoot {
        actual: crw_chain::block::merkle::Root,
        expected: crw_chain::block::merkle::Root,
    },
    /// block contains duplicate transactions
    DuplicateTransaction,
    /// block's height does not follow its parent's height
    NonSequentialHeight,
    /// block's timestamp is not greater than the median time past of the preceding 11 blocks
    TimeTooOld,
    #[error(transparent)]
    Time(#[from] block::BlockTimeError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Subsidy(#[from] SubsidyError),
}

/// An error validating a block's coinbase subsidy and fees.
#[derive(Error, Display, Debug, PartialEq, Clone)]
pub enum SubsidyError {
    /// block does not have a coinbase transaction
    NoCoinbase,
    /// coinbase transaction does not encode its block height (BIP34)
    MissingCoinbaseHeight,
    /// coinbase height {0:?} does not match the block's actual height {1:?}
    WrongCoinbaseHeight(usize, block::Height),
    /// coinbase output total {0:?} exceeds the allowed subsidy plus fees {1:?}
    SubsidyOverspend(crw_chain::amount::Amount<crw_chain::amount::NonNegative>, crw_chain::amount::Amount<crw_chain::amount::NonNegative>),
}

/// The union of everything that can reject a block at the chain engine's
/// `add_block` boundary; every variant here is something a remote peer
/// could have sent honestly, so it is session-scoped, not a panic.
#[derive(Error, Display, Debug)]
pub enum VerificationError {
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    State(#[from] crw_state::StateError),
    /// block's parent is not known to this node
    Orphan,
    /// reorg of {0} blocks exceeds the configured maximum of {1}
    ReorgTooDeep(u32, u32),
}

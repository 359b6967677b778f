//! Context-free block checks: everything that can be decided from a block's
//! own bytes, without consulting the chain it extends.

use chrono::{DateTime, Utc};

use crw_chain::{
    block::{Block, Hash, Header, Height},
    parameters::Network,
    transaction,
    work::difficulty::ExpandedDifficulty,
};

use crate::error::*;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `block`,
/// and it is the first transaction.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition)?;
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound)?;
    }

    Ok(())
}

/// Returns `Ok(())` if `hash` passes the network's difficulty limit and the
/// difficulty filter implied by `header`'s own claimed threshold.
///
/// This only checks the threshold encoded in the header against the hash;
/// whether that threshold was the *correct* one for this height is a
/// contextual check (see [`super::difficulty`]).
pub fn difficulty_is_valid(
    header: &Header,
    network: Network,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;

    // These are u256 integer comparisons; greater values mean *less* work.
    if difficulty_threshold > ExpandedDifficulty::target_difficulty_limit(network) {
        Err(BlockError::TargetDifficultyLimit(
            *height,
            *hash,
            difficulty_threshold,
            network,
            ExpandedDifficulty::target_difficulty_limit(network),
        ))?;
    }

    if ExpandedDifficulty::from_hash(*hash) > difficulty_threshold {
        Err(BlockError::DifficultyFilter(
            *height,
            *hash,
            difficulty_threshold,
            network,
        ))?;
    }

    Ok(())
}

/// Returns `Ok(())` if `block` serializes to no more than the maximum block size.
pub fn block_is_not_too_large(block: &Block) -> Result<(), BlockError> {
    let size: u64 = (crw_chain::block::Header::len()
        + crw_chain::compactint::CompactInt::size(block.transactions.len())
        + block.transactions.iter().map(|tx| tx.len()).sum::<usize>()) as u64;
    if size > crw_chain::block::MAX_BLOCK_BYTES {
        return Err(BlockError::ExceedsSizeLimit);
    }
    Ok(())
}

/// Returns `Ok(())` if `block`'s coinbase transaction commits to `height`
/// (BIP34), given the height the engine independently computed from the
/// block's position in the chain.
pub fn coinbase_height_matches(block: &Block, height: Height) -> Result<(), BlockError> {
    match block.coinbase_height() {
        Some(reported) if reported == height => Ok(()),
        Some(reported) => Err(SubsidyError::WrongCoinbaseHeight(reported.0 as usize, height))?,
        None => Err(SubsidyError::MissingCoinbaseHeight)?,
    }
}

/// Returns `Ok(())` if `header.time` is no more than 2 hours ahead of `now`,
/// the caller's own clock.
///
/// This is a non-deterministic rule: clocks vary between nodes, and a block
/// rejected by this check now may be accepted later.
pub fn time_is_valid_at(
    header: &Header,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), crw_chain::block::BlockTimeError> {
    header.time_is_valid_at(now, height, hash)
}

/// Checks that `block`'s header merkle root matches its transactions, and
/// that those transactions contain no duplicate hashes (the CVE-2012-2459
/// malleability defense).
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

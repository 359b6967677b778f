//! Constants governing the block subsidy and its halving schedule.

use crw_chain::{amount::COIN, block::Height};

/// The largest block subsidy, used before the first halving.
pub const MAX_BLOCK_SUBSIDY: u64 = (50 * COIN) as u64;

/// The number of blocks between successive subsidy halvings.
pub const HALVING_INTERVAL: Height = Height(210_000);

/// The number of confirmations a coinbase output needs before it can be spent.
pub const COINBASE_MATURITY: u32 = 100;

//! Difficulty retargeting: the contextual half of proof-of-work validation.
//!
//! [`BlockError::InvalidDifficulty`]/[`BlockError::TargetDifficultyLimit`]/
//! [`BlockError::DifficultyFilter`] are context-free and live in
//! [`super::check`]; the retarget calculation here needs the previous
//! retarget window's worth of header timestamps and so can only run once a
//! block's ancestry is known to the engine.

use primitive_types::U256;

use crw_chain::{
    block::{Hash, Header, Height},
    parameters::{Network, NetworkUpgrade, POW_AVERAGING_WINDOW},
    work::difficulty::{CompactDifficulty, ExpandedDifficulty},
};

use crate::error::BlockError;

/// Clamp bounds on the retarget timespan, matching Bitcoin Core: the next
/// target can change by at most a factor of 4 in either direction per
/// retarget, however far off schedule the interval actually ran.
fn clamp_timespan(target_timespan: i64, actual_timespan: i64) -> i64 {
    actual_timespan.clamp(target_timespan / 4, target_timespan * 4)
}

/// Computes the expected `nBits` for the block at `height`, given the last
/// header before it and the first header of the outgoing retarget window.
///
/// Returns `last_header`'s own difficulty unchanged outside a retarget
/// boundary, and always on regtest.
pub fn expected_difficulty(
    network: Network,
    height: Height,
    last_header: &Header,
    first_header_in_window: &Header,
) -> Option<CompactDifficulty> {
    if network.disables_retargeting() {
        return Some(last_header.difficulty_threshold);
    }
    if height.0 % (POW_AVERAGING_WINDOW as u32) != 0 {
        return Some(last_header.difficulty_threshold);
    }

    let target_timespan = NetworkUpgrade::averaging_window_timespan_for_height(network, height).num_seconds();
    let actual_timespan = (last_header.time - first_header_in_window.time).num_seconds();
    let actual_timespan = clamp_timespan(target_timespan, actual_timespan);

    let old_target = last_header.difficulty_threshold.to_expanded()?;
    let mut new_target = old_target.0 * U256::from(actual_timespan as u64);
    new_target /= U256::from(target_timespan as u64);

    let limit = ExpandedDifficulty::target_difficulty_limit(network);
    let new_target = if new_target > limit.0 { limit } else { ExpandedDifficulty(new_target) };

    Some(CompactDifficulty::from_expanded(new_target))
}

/// Returns `Ok(())` if `header`'s claimed `difficulty_threshold` matches the
/// retarget calculation, given its predecessor and the header from the start
/// of the current retarget window (or an equivalent minimum-difficulty
/// exception on a network that allows one).
pub fn difficulty_retarget_is_valid(
    network: Network,
    height: Height,
    hash: Hash,
    header: &Header,
    last_header: &Header,
    first_header_in_window: &Header,
) -> Result<(), BlockError> {
    let expected = expected_difficulty(network, height, last_header, first_header_in_window)
        .ok_or(BlockError::InvalidDifficulty(height, hash))?;

    if header.difficulty_threshold == expected {
        return Ok(());
    }

    if network.allows_minimum_difficulty_blocks() {
        let target_spacing = NetworkUpgrade::target_spacing_for_height(network, height).num_seconds();
        let since_last = (header.time - last_header.time).num_seconds();
        let minimum_difficulty =
            CompactDifficulty::from_expanded(ExpandedDifficulty::target_difficulty_limit(network));
        if since_last > target_spacing * 2 && header.difficulty_threshold == minimum_difficulty {
            return Ok(());
        }
    }

    Err(BlockError::BadDifficultyRetarget(height, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retarget_interval_matches_the_averaging_window() {
        assert_eq!(POW_AVERAGING_WINDOW, 2016);
    }
}

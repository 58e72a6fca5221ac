//! Difficulty retargeting.
//!
//! Every [`RETARGET_WINDOW`] blocks, the time actually elapsed across the
//! window is compared against the expected time
//! (`RETARGET_WINDOW * TARGET_INTERVAL`):
//!
//! - elapsed < 90% of expected → blocks came in too fast, difficulty + 1
//! - elapsed > 110% of expected → blocks came in too slow, difficulty - 1
//! - otherwise → difficulty unchanged
//!
//! Difficulty never drops below [`MIN_DIFFICULTY`]. Heights that are not a
//! retarget boundary keep the parent's difficulty unchanged.

use crate::constants::{MIN_DIFFICULTY, RETARGET_WINDOW, TARGET_INTERVAL};

/// Expected duration of a full retarget window, in seconds.
pub const fn expected_window_time() -> u64 {
    RETARGET_WINDOW * TARGET_INTERVAL
}

/// Whether `height` is the height of a block that triggers a retarget check
/// (i.e. closes out a window of [`RETARGET_WINDOW`] blocks).
pub fn is_retarget_height(height: u64) -> bool {
    height > 0 && height % RETARGET_WINDOW == 0
}

/// Compute the next difficulty given the parent's difficulty and the
/// timestamps bracketing the just-completed window (`window_start` is the
/// timestamp of the block `RETARGET_WINDOW` heights back, `window_end` is
/// the parent's timestamp).
///
/// Only meaningful when `is_retarget_height(height)` holds; callers at
/// non-boundary heights should keep the parent's difficulty instead.
pub fn next_difficulty(parent_difficulty: u32, window_start: u64, window_end: u64) -> u32 {
    let elapsed = window_end.saturating_sub(window_start);
    let expected = expected_window_time();

    let lower = expected * 9 / 10;
    let upper = expected * 11 / 10;

    if elapsed < lower {
        parent_difficulty.saturating_add(1)
    } else if elapsed > upper {
        parent_difficulty.saturating_sub(1).max(MIN_DIFFICULTY)
    } else {
        parent_difficulty
    }
}

/// Compute the difficulty for the block at `height`, given the parent's
/// difficulty and a lookup for prior block timestamps.
///
/// Returns `parent_difficulty` unchanged unless `height` lands exactly on a
/// retarget boundary.
pub fn difficulty_for_height(
    height: u64,
    parent_difficulty: u32,
    get_timestamp: impl Fn(u64) -> u64,
) -> u32 {
    if !is_retarget_height(height) {
        return parent_difficulty;
    }

    let window_start = get_timestamp(height - RETARGET_WINDOW);
    let window_end = get_timestamp(height - 1);
    next_difficulty(parent_difficulty, window_start, window_end)
}

/// Work contributed by a single block mined at `difficulty`.
///
/// A header hash with `difficulty` leading hex zeros takes on average
/// `16^difficulty` attempts to find. Fork choice sums this across every
/// block in a candidate chain to compare total work between chains of
/// equal height.
pub fn work_for_difficulty(difficulty: u32) -> u128 {
    16u128.saturating_pow(difficulty)
}

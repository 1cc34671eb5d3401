//! Debug assertion macros for ring buffer invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay
//! nothing for them.

// =============================================================================
// Bounded Count
// =============================================================================

/// Assert that the number of claimed slots never exceeds capacity.
///
/// **Invariant**: `0 ≤ added - removed ≤ capacity`
///
/// Used in: `claim_write()` after a successful cursor CAS
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the read cursor never overtakes the write cursor.
///
/// **Invariant**: `removed ≤ added` (after a read claim)
///
/// Used in: `claim_read()` after a successful cursor CAS
macro_rules! debug_assert_removed_not_past_added {
    ($new_removed:expr, $added:expr) => {
        debug_assert!(
            $new_removed <= $added,
            "read cursor {} advanced beyond write cursor {}",
            $new_removed,
            $added
        )
    };
}

// =============================================================================
// Monotonic Progress
// =============================================================================

/// Assert that a cursor only increases.
///
/// Used in: both claim paths, comparing the claimed position with the new cursor
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new > $old,
            "{} cursor did not advance: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Slot Stamp Protocol
// =============================================================================

/// Assert that a slot carries the stamp expected for the claimed position.
///
/// **Invariant**: position `p` may be written when `stamp == 2p` and read when
/// `stamp == 2p + 1`; after a read the slot is stamped `2(p + capacity)`.
///
/// Used in: `publish()` after the claim and `take()` once its wait on the stamp completes
macro_rules! debug_assert_slot_stamp {
    ($stamp:expr, $expected:expr) => {
        debug_assert_eq!(
            $stamp, $expected,
            "slot stamp {} does not match claimed position stamp {}",
            $stamp, $expected
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_removed_not_past_added;
pub(crate) use debug_assert_slot_stamp;

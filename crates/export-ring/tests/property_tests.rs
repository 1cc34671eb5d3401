//! Property-based tests for the ring buffer invariants.
//!
//! Each property drives a `BoundedRing` through an arbitrary sequence of
//! operations and checks that the observable counters behave.

use export_ring::BoundedRing;
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Add(u32),
    Read,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u32>().prop_map(Op::Add),
        2 => Just(Op::Read),
    ]
}

// =============================================================================
// Bounded Count
// "0 ≤ count ≤ capacity" after every operation
// =============================================================================

proptest! {
    #[test]
    fn prop_count_stays_within_capacity(
        capacity in 1usize..32,
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let ring = BoundedRing::new(capacity).unwrap();

        for op in ops {
            match op {
                Op::Add(value) => {
                    let before = ring.count();
                    let accepted = ring.add(value);
                    if before == capacity {
                        prop_assert!(!accepted, "add accepted on a full ring");
                        prop_assert_eq!(ring.count(), before);
                    } else {
                        prop_assert!(accepted);
                        prop_assert_eq!(ring.count(), before + 1);
                    }
                }
                Op::Read => {
                    if ring.count() > 0 {
                        let before = ring.count();
                        ring.read().unwrap();
                        prop_assert_eq!(ring.count(), before - 1);
                    } else {
                        prop_assert!(ring.read().is_err());
                    }
                }
            }
            prop_assert!(ring.count() <= ring.capacity());
        }
    }
}

// =============================================================================
// Monotonic Progress
// "added_count and removed_count never decrease"
// =============================================================================

proptest! {
    #[test]
    fn prop_counters_are_monotonic(
        capacity in 1usize..16,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let ring = BoundedRing::new(capacity).unwrap();
        let mut last_added = 0;
        let mut last_removed = 0;

        for op in ops {
            match op {
                Op::Add(value) => { ring.add(value); }
                Op::Read => { let _ = ring.read(); }
            }

            prop_assert!(ring.added_count() >= last_added);
            prop_assert!(ring.removed_count() >= last_removed);
            prop_assert_eq!(
                (ring.added_count() - ring.removed_count()) as usize,
                ring.count()
            );

            last_added = ring.added_count();
            last_removed = ring.removed_count();
        }
    }
}

// =============================================================================
// FIFO
// "the ring behaves exactly like a bounded VecDeque"
// =============================================================================

proptest! {
    #[test]
    fn prop_matches_bounded_queue_model(
        capacity in 1usize..16,
        ops in prop::collection::vec(op_strategy(), 0..300),
    ) {
        let ring = BoundedRing::new(capacity).unwrap();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Add(value) => {
                    let accepted = ring.add(value);
                    if model.len() < capacity {
                        model.push_back(value);
                        prop_assert!(accepted);
                    } else {
                        prop_assert!(!accepted);
                    }
                }
                Op::Read => {
                    prop_assert_eq!(ring.read().ok(), model.pop_front());
                }
            }
        }
    }
}

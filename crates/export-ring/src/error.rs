//! Error types for ring buffer operations.

use thiserror::Error;

/// Errors surfaced by [`BoundedRing`](crate::BoundedRing).
///
/// A full ring is deliberately *not* an error: `add` reports it as `false`
/// so callers can drop the item without unwinding anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// The requested capacity cannot hold a single item.
    #[error("ring capacity must be greater than zero (got {capacity})")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },

    /// `read` was called while nothing was buffered.
    #[error("ring buffer is empty")]
    Empty,
}

//! Export Ring - Bounded Lock-Free Queue for Telemetry Export
//!
//! A fixed-capacity ring buffer that many producer threads can append to
//! without locks, drained by one (or more) consumers. It is the queue sitting
//! between instrumented code and the background export worker.
//!
//! # Key Features
//!
//! - Monotonic `u64` cursors with modulo indexing (no ABA on the cursors)
//! - Cache-padded cursors to keep producers and consumers off each other's lines
//! - Non-blocking `add`: a full ring returns `false` (the backpressure signal)
//! - Per-slot stamps so a consumer never observes a half-written slot
//!
//! # Example
//!
//! ```
//! use export_ring::BoundedRing;
//!
//! let ring = BoundedRing::new(2).unwrap();
//! assert!(ring.add("a"));
//! assert!(ring.add("b"));
//! assert!(!ring.add("c")); // full, item dropped by the caller
//!
//! assert_eq!(ring.count(), 2);
//! assert_eq!(ring.read().unwrap(), "a");
//! assert_eq!(ring.count(), 1);
//! ```

mod error;
mod invariants;
mod ring;

pub use error::RingError;
pub use ring::BoundedRing;

//! Record pools.
//!
//! Two flavours recycle [`LogRecord`](crate::LogRecord) allocations:
//!
//! - [`LocalRecordPool`]: a single-slot cache owned by one producer. No
//!   synchronization; it is `&mut self` all the way.
//! - [`SharedRecordPool`]: a bounded lock-free pool shared by every thread,
//!   reached through a [`PoolHandle`] that can swap in a resized pool at
//!   runtime.
//!
//! Rent never fails: when nothing can be reused a fresh record is allocated.

mod local;
mod shared;

pub use local::LocalRecordPool;
pub use shared::{PoolHandle, SharedRecordPool};

/// Default capacity of a shared pool.
pub const DEFAULT_MAX_POOL_SIZE: usize = 2048;

/// Records carrying more attributes than this lose their attribute storage
/// when recycled.
pub const DEFAULT_MAX_NUMBER_OF_ATTRIBUTES: usize = 64;

/// Records carrying more buffered scopes than this lose their scope storage
/// when recycled.
pub const DEFAULT_MAX_NUMBER_OF_SCOPES: usize = 16;

use super::{DEFAULT_MAX_NUMBER_OF_ATTRIBUTES, DEFAULT_MAX_NUMBER_OF_SCOPES, DEFAULT_MAX_POOL_SIZE};
use crate::error::PoolError;
use crate::record::{LogRecord, RecordSource};
use arc_swap::ArcSwap;
use crossbeam_utils::{Backoff, CachePadded};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Number of times a renter re-checks a claimed slot that is still empty
/// before giving up and allocating.
const CLAIM_ATTEMPTS: usize = 10;

// =============================================================================
// SLOT PROTOCOL
// =============================================================================
//
// `rent_index` and `return_index` are monotonic positions; slot index is
// `position % capacity`. A returner claims a position with a CAS on
// `return_index` (bounded so the pool never holds more than `capacity`
// records), then swaps its record into the slot. A renter claims a position
// with a CAS on `rent_index` (bounded by `return_index`), then swaps the slot
// to null to take ownership of whatever is there.
//
// A claim does not guarantee the slot is populated: the returner that owns
// the matching position may still be between its CAS and its store, or the
// renter may have been suspended long enough for the cursors to lap it. The
// renter therefore re-checks a few times and then allocates a fresh record.
// A returner whose swap displaces a stale pointer releases that record. Every
// pointer is moved by an atomic swap, so each record has exactly one owner.
//
// =============================================================================

/// A bounded, lock-free pool of records shared by every producer.
///
/// Records are reference counted at the pool level: [`rent`](Self::rent)
/// hands out a record with a count of 1, [`LogRecord::add_reference`] adds
/// holders, and each [`return_record`](Self::return_record) removes one. Only
/// the return that brings the count to exactly zero recycles the record.
pub struct SharedRecordPool {
    rent_index: CachePadded<AtomicU64>,
    return_index: CachePadded<AtomicU64>,
    capacity: usize,
    /// Each non-null entry owns one `Arc<LogRecord>` produced by `Arc::into_raw`.
    slots: Box<[AtomicPtr<LogRecord>]>,
}

impl SharedRecordPool {
    /// Creates an empty pool able to hold `capacity` idle records.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity { capacity });
        }
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            rent_index: CachePadded::new(AtomicU64::new(0)),
            return_index: CachePadded::new(AtomicU64::new(0)),
            capacity,
            slots,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle records currently held, clamped to `[0, capacity]`.
    #[inline]
    pub fn count(&self) -> usize {
        let rent = self.rent_index.load(Ordering::Acquire);
        let ret = self.return_index.load(Ordering::Acquire);
        (ret.saturating_sub(rent) as usize).min(self.capacity)
    }

    #[inline]
    fn slot(&self, position: u64) -> &AtomicPtr<LogRecord> {
        &self.slots[(position % self.capacity as u64) as usize]
    }

    /// Takes an idle record, or allocates one if none can be claimed.
    ///
    /// The returned record has a pool reference count of 1 and a cleared
    /// payload.
    pub fn rent(&self) -> Arc<LogRecord> {
        let backoff = Backoff::new();

        loop {
            let rent = self.rent_index.load(Ordering::Acquire);
            let ret = self.return_index.load(Ordering::Acquire);

            if rent >= ret {
                return Self::allocate();
            }

            if self
                .rent_index
                .compare_exchange_weak(rent, rent + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return self.take_slot(rent).unwrap_or_else(Self::allocate);
            }

            backoff.spin();
        }
    }

    /// Empties the slot for a claimed rent position.
    fn take_slot(&self, position: u64) -> Option<Arc<LogRecord>> {
        let slot = self.slot(position);
        let backoff = Backoff::new();

        for _ in 0..CLAIM_ATTEMPTS {
            let raw = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                // Safety: non-null slot pointers come from `Arc::into_raw` in
                // `return_record`, and the swap made us their sole owner.
                let record = unsafe { Arc::from_raw(raw) };
                record.reset_for_rent();
                return Some(record);
            }
            backoff.snooze();
        }

        None
    }

    fn allocate() -> Arc<LogRecord> {
        Arc::new(LogRecord::pooled(RecordSource::SharedPool))
    }

    /// Releases one holder of `record`, recycling it when none remain.
    ///
    /// Records that did not come from a shared pool are ignored. A return that
    /// drives the count below zero is a no-op. If the pool is full the record
    /// is dropped.
    pub fn return_record(&self, record: Arc<LogRecord>) {
        if record.source() != RecordSource::SharedPool {
            return;
        }

        let remaining = record.release_reference();
        if remaining != 0 {
            if remaining < 0 {
                debug!(record = ?record.id(), remaining, "record returned more often than rented");
            }
            return;
        }

        record.clear(DEFAULT_MAX_NUMBER_OF_ATTRIBUTES, DEFAULT_MAX_NUMBER_OF_SCOPES);

        let backoff = Backoff::new();
        loop {
            let rent = self.rent_index.load(Ordering::Acquire);
            let ret = self.return_index.load(Ordering::Acquire);

            if ret.saturating_sub(rent) >= self.capacity as u64 {
                return;
            }

            if self
                .return_index
                .compare_exchange_weak(ret, ret + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let raw = Arc::into_raw(record).cast_mut();
                let displaced = self.slot(ret).swap(raw, Ordering::AcqRel);
                if !displaced.is_null() {
                    // Safety: same provenance as in `take_slot`; the swap
                    // transferred ownership of the stale record to us.
                    drop(unsafe { Arc::from_raw(displaced) });
                }
                return;
            }

            backoff.spin();
        }
    }
}

impl Drop for SharedRecordPool {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let raw = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !raw.is_null() {
                // Safety: see `take_slot`.
                drop(unsafe { Arc::from_raw(raw) });
            }
        }
    }
}

impl std::fmt::Debug for SharedRecordPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRecordPool")
            .field("capacity", &self.capacity)
            .field("count", &self.count())
            .finish()
    }
}

/// A cloneable handle to the current shared pool.
///
/// [`resize`](Self::resize) swaps in a brand-new pool. Records rented before
/// the swap stay valid; they are returned to whatever pool is current at the
/// time of the return.
#[derive(Clone)]
pub struct PoolHandle {
    current: Arc<ArcSwap<SharedRecordPool>>,
}

impl PoolHandle {
    /// Creates a handle to a new pool of the given capacity.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        let pool = SharedRecordPool::new(capacity)?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(pool)),
        })
    }

    /// The pool currently in use.
    pub fn current(&self) -> Arc<SharedRecordPool> {
        self.current.load_full()
    }

    /// Capacity of the current pool.
    pub fn capacity(&self) -> usize {
        self.current.load().capacity()
    }

    /// Replaces the current pool with an empty one of the given capacity.
    ///
    /// Anyone still holding the previous pool may keep using it.
    pub fn resize(&self, capacity: usize) -> Result<Arc<SharedRecordPool>, PoolError> {
        let pool = Arc::new(SharedRecordPool::new(capacity)?);
        let previous = self.current.swap(Arc::clone(&pool));
        debug!(
            old_capacity = previous.capacity(),
            new_capacity = capacity,
            "shared record pool resized"
        );
        Ok(pool)
    }

    /// Rents from the current pool.
    pub fn rent(&self) -> Arc<LogRecord> {
        self.current.load().rent()
    }

    /// Returns to the current pool.
    pub fn return_record(&self, record: Arc<LogRecord>) {
        self.current.load().return_record(record);
    }
}

impl Default for PoolHandle {
    fn default() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(SharedRecordPool::with_capacity(
                DEFAULT_MAX_POOL_SIZE,
            ))),
        }
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PoolHandle").field(&*self.current.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(
            SharedRecordPool::new(0).unwrap_err(),
            PoolError::InvalidCapacity { capacity: 0 }
        );
        assert!(PoolHandle::new(0).is_err());
    }

    #[test]
    fn test_resize_creates_new_pool() {
        let handle = PoolHandle::new(4).unwrap();
        let before = handle.current();
        assert_eq!(before.capacity(), 4);

        let after = handle.resize(8).unwrap();
        assert_eq!(after.capacity(), 8);
        assert_eq!(handle.capacity(), 8);
        assert!(!Arc::ptr_eq(&before, &after));

        // The old pool keeps working for whoever still holds it.
        let record = before.rent();
        before.return_record(record);
        assert_eq!(before.count(), 1);

        assert!(handle.resize(0).is_err());
        assert_eq!(handle.capacity(), 8);
    }

    #[test]
    fn test_rent_and_return() {
        let pool = SharedRecordPool::new(2).unwrap();
        assert_eq!(pool.count(), 0);

        let first = pool.rent();
        assert_eq!(first.pool_reference_count(), 1);
        assert_eq!(first.source(), RecordSource::SharedPool);
        let second = pool.rent();
        let third = pool.rent();
        assert_eq!(pool.count(), 0);

        let first_id = first.id();
        first.update(|d| d.body = Some("payload".into()));
        pool.return_record(first);
        assert_eq!(pool.count(), 1);
        pool.return_record(second);
        assert_eq!(pool.count(), 2);
        // Pool is full: this one is discarded.
        pool.return_record(third);
        assert_eq!(pool.count(), 2);

        let reused = pool.rent();
        assert_eq!(reused.id(), first_id);
        assert_eq!(reused.generation(), 1);
        assert_eq!(reused.pool_reference_count(), 1);
        assert!(reused.data().body.is_none());
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_manual_record_is_ignored() {
        let pool = SharedRecordPool::new(2).unwrap();
        let record = Arc::new(LogRecord::new());

        for _ in 0..3 {
            pool.return_record(Arc::clone(&record));
        }
        assert_eq!(pool.count(), 0);
        assert_eq!(record.pool_reference_count(), crate::record::NOT_POOLED);
    }

    #[test]
    fn test_track_reference() {
        let pool = SharedRecordPool::new(2).unwrap();
        let record = pool.rent();
        assert_eq!(record.pool_reference_count(), 1);

        record.add_reference();
        assert_eq!(record.pool_reference_count(), 2);

        pool.return_record(Arc::clone(&record));
        assert_eq!(record.pool_reference_count(), 1);
        assert_eq!(pool.count(), 0);

        pool.return_record(Arc::clone(&record));
        assert_eq!(record.pool_reference_count(), 0);
        assert_eq!(pool.count(), 1);

        // Double return: count goes negative, pool unchanged.
        pool.return_record(Arc::clone(&record));
        assert_eq!(record.pool_reference_count(), -1);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_clear_on_return() {
        let pool = SharedRecordPool::new(2).unwrap();

        let small = pool.rent();
        small.update(|d| {
            d.attributes = Some(Vec::with_capacity(DEFAULT_MAX_NUMBER_OF_ATTRIBUTES));
            d.add_attribute("k", "v");
        });
        let large = pool.rent();
        large.update(|d| {
            for i in 0..=DEFAULT_MAX_NUMBER_OF_ATTRIBUTES {
                d.add_attribute("k", i as i64);
            }
        });

        pool.return_record(small);
        pool.return_record(large);

        let small = pool.rent();
        let kept = small.data().attributes.as_ref().map_or(0, Vec::capacity);
        assert!(kept >= DEFAULT_MAX_NUMBER_OF_ATTRIBUTES);

        let large = pool.rent();
        assert!(large.data().attributes.is_none());
    }

    #[test]
    fn test_drop_releases_idle_records() {
        let pool = SharedRecordPool::new(4).unwrap();
        let record = pool.rent();
        let weak = Arc::downgrade(&record);
        pool.return_record(record);
        assert!(weak.upgrade().is_some());

        drop(pool);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_handle_clones_share_pool() {
        let handle = PoolHandle::new(4).unwrap();
        let other = handle.clone();

        let record = handle.rent();
        other.return_record(record);
        assert_eq!(handle.current().count(), 1);

        let default = PoolHandle::default();
        assert_eq!(default.capacity(), DEFAULT_MAX_POOL_SIZE);
    }
}

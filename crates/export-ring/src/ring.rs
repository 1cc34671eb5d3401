use crate::error::RingError;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_monotonic, debug_assert_removed_not_past_added,
    debug_assert_slot_stamp,
};
use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// ## Cursors
//
// `added` and `removed` are unbounded u64 positions. A slot index is
// `position % capacity`, computed only when a slot is touched. At 10 billion
// items/second the stamps (twice the position) take ~29 years to wrap.
//
// Producers claim a position with a CAS on `added`, bounded so that
// `added - removed < capacity` at the moment of the claim. Consumers claim a
// position with a CAS on `removed`, bounded by `removed < added`. Claiming
// never touches the slot itself, so the cursors alone decide ownership and
// `count = added - removed` can never leave `[0, capacity]`.
//
// ## Slot stamps
//
// A claim only reserves a position; the data moves afterwards. Each slot has
// a stamp that serializes the hand-off between the two parties that share it:
//
//   stamp == 2p                slot is free for the writer of position p
//   stamp == 2p + 1            position p is written and may be read
//   stamp == 2(p + capacity)   position p was read; free for its next writer
//
// Doubling keeps "written" and "free" apart even when `capacity == 1`.
//
// A producer only claims position p after observing `stamp == 2p` (Acquire),
// so the slot is already vacated when it writes; it then stores `2p + 1`
// (Release). A slot whose reader has claimed but not yet vacated it reports
// the ring as full, so producers never wait on a consumer. The reader waits
// for `stamp == 2p + 1` (Acquire), moves the value out, then stores
// `2(p + capacity)` (Release). That wait only spins while a producer has
// claimed its position but not finished copying.
//
// =============================================================================

/// Stamp of a slot that is free for the writer of `position`.
#[inline]
const fn vacant(position: u64) -> u64 {
    position << 1
}

/// Stamp of a slot holding the unread value of `position`.
#[inline]
const fn written(position: u64) -> u64 {
    (position << 1) | 1
}

/// One storage cell of the ring.
struct Slot<T> {
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity, lock-free, multi-producer queue.
///
/// Any number of threads may call [`add`](Self::add) concurrently. Reads are
/// claimed with a CAS as well, so one or more consumers may drain the ring;
/// the export pipeline uses exactly one.
///
/// `added_count` and `removed_count` are monotonic for the lifetime of the
/// ring and `count()` always lies within `[0, capacity]`.
pub struct BoundedRing<T> {
    /// Write cursor: number of positions ever claimed by producers.
    added: CachePadded<AtomicU64>,
    /// Read cursor: number of positions ever claimed by consumers.
    removed: CachePadded<AtomicU64>,
    capacity: usize,
    /// Fixed at construction, never grows or shrinks.
    slots: Box<[Slot<T>]>,
}

// Safety: values are moved in by exactly one producer and out by exactly one
// consumer per position; the stamp protocol orders those two accesses.
unsafe impl<T: Send> Send for BoundedRing<T> {}
unsafe impl<T: Send> Sync for BoundedRing<T> {}

impl<T> BoundedRing<T> {
    /// Creates a ring able to buffer `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::InvalidCapacity { capacity });
        }

        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicU64::new(vacant(i as u64)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            added: CachePadded::new(AtomicU64::new(0)),
            removed: CachePadded::new(AtomicU64::new(0)),
            capacity,
            slots,
        })
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Returns the maximum number of buffered items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of items currently buffered.
    ///
    /// Under concurrent use this is a snapshot; it is clamped to
    /// `[0, capacity]` so a torn pair of cursor loads never leaks out.
    #[inline]
    pub fn count(&self) -> usize {
        let removed = self.removed.load(Ordering::Acquire);
        let added = self.added.load(Ordering::Acquire);
        (added.saturating_sub(removed) as usize).min(self.capacity)
    }

    /// Total number of items ever accepted. Never decreases.
    #[inline]
    pub fn added_count(&self) -> u64 {
        self.added.load(Ordering::Acquire)
    }

    /// Total number of items ever read. Never decreases.
    #[inline]
    pub fn removed_count(&self) -> u64 {
        self.removed.load(Ordering::Acquire)
    }

    /// Returns true if nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns true if an `add` would currently be rejected.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    #[inline]
    fn slot(&self, position: u64) -> &Slot<T> {
        &self.slots[(position % self.capacity as u64) as usize]
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Adds an item, returning `false` (and dropping the item) if the ring is full.
    ///
    /// Never blocks on a full ring; contention on the write cursor is retried
    /// until the claim either succeeds or the ring is observed full.
    #[inline]
    pub fn add(&self, item: T) -> bool {
        self.try_add(item).is_ok()
    }

    /// Adds an item, handing it back if the ring is full.
    pub fn try_add(&self, item: T) -> Result<(), T> {
        match self.claim_write(None) {
            Some(position) => {
                self.publish(position, item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Adds an item, giving up after `max_spins` lost races on the write cursor.
    ///
    /// Returns the item if the ring is full or the spin budget ran out.
    pub fn try_add_with_spin(&self, item: T, max_spins: usize) -> Result<(), T> {
        match self.claim_write(Some(max_spins)) {
            Some(position) => {
                self.publish(position, item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Claims the next write position, or `None` if full / out of spins.
    fn claim_write(&self, max_spins: Option<usize>) -> Option<u64> {
        let backoff = Backoff::new();
        let mut spins = 0usize;

        loop {
            // Load `removed` first: a stale value can only make the ring look
            // fuller than it is, never emptier.
            let removed = self.removed.load(Ordering::Acquire);
            let added = self.added.load(Ordering::Acquire);

            if added.saturating_sub(removed) >= self.capacity as u64 {
                return None;
            }

            // The reader of `added - capacity` may have claimed its position
            // without vacating the slot yet. That slot is still occupied.
            let stamp = self.slot(added).stamp.load(Ordering::Acquire);
            if stamp < vacant(added) {
                return None;
            }
            // A newer stamp means `added` is stale: another producer took it.
            let claimed = stamp == vacant(added)
                && self
                    .added
                    .compare_exchange_weak(added, added + 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok();

            if claimed {
                debug_assert_monotonic!("write", added, added + 1);
                debug_assert_bounded_count!(
                    (added + 1).saturating_sub(removed) as usize,
                    self.capacity
                );
                return Some(added);
            }

            spins += 1;
            if max_spins.is_some_and(|max| spins >= max) {
                return None;
            }
            backoff.spin();
        }
    }

    /// Writes `item` into the slot of a claimed position and publishes it.
    ///
    /// `claim_write` saw the slot vacated before claiming, so this never waits.
    fn publish(&self, position: u64, item: T) {
        let slot = self.slot(position);
        debug_assert_slot_stamp!(slot.stamp.load(Ordering::Relaxed), vacant(position));

        // SAFETY: the slot was vacant for our position before the claim, and
        // only the writer of `position` advances it from there, so no other
        // thread owns this slot until we store `position + 1` below.
        unsafe {
            (*slot.value.get()).write(item);
        }

        slot.stamp.store(written(position), Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Reads the oldest item.
    ///
    /// Callers are expected to check [`count`](Self::count) first; reading an
    /// empty ring returns [`RingError::Empty`] rather than waiting. If the
    /// claimed position is still being written, this waits for the producer
    /// to finish.
    pub fn read(&self) -> Result<T, RingError> {
        let position = self.claim_read().ok_or(RingError::Empty)?;
        Ok(self.take(position))
    }

    /// Reads up to `max` items, passing each to `handler` in FIFO order.
    ///
    /// Only items buffered when the call starts are considered, so a steady
    /// stream of producers cannot keep the caller here forever.
    pub fn drain_up_to<F>(&self, max: usize, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        let available = self.count().min(max);
        let mut drained = 0;

        while drained < available {
            match self.claim_read() {
                Some(position) => {
                    handler(self.take(position));
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Claims the next read position, or `None` if nothing is buffered.
    fn claim_read(&self) -> Option<u64> {
        let backoff = Backoff::new();

        loop {
            let removed = self.removed.load(Ordering::Acquire);
            let added = self.added.load(Ordering::Acquire);

            if removed >= added {
                return None;
            }

            match self.removed.compare_exchange_weak(
                removed,
                removed + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    debug_assert_monotonic!("read", removed, removed + 1);
                    debug_assert_removed_not_past_added!(removed + 1, added);
                    return Some(removed);
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Moves the value out of a claimed read position and frees the slot.
    fn take(&self, position: u64) -> T {
        let slot = self.slot(position);

        // Wait for the writer of `position` to publish.
        let backoff = Backoff::new();
        while slot.stamp.load(Ordering::Acquire) != written(position) {
            backoff.snooze();
        }
        debug_assert_slot_stamp!(slot.stamp.load(Ordering::Relaxed), written(position));

        // SAFETY: a written stamp means the writer finished and no
        // other reader can hold this position (read claims are unique).
        let value = unsafe { (*slot.value.get()).assume_init_read() };

        slot.stamp
            .store(vacant(position + self.capacity as u64), Ordering::Release);
        value
    }
}

impl<T> Drop for BoundedRing<T> {
    fn drop(&mut self) {
        let removed = *self.removed.get_mut();
        let added = *self.added.get_mut();
        let capacity = self.capacity as u64;

        for position in removed..added {
            let slot = &mut self.slots[(position % capacity) as usize];
            if *slot.stamp.get_mut() == written(position) {
                // SAFETY: the stamp marks this position as written and unread.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

impl<T> std::fmt::Debug for BoundedRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRing")
            .field("capacity", &self.capacity)
            .field("added", &self.added_count())
            .field("removed", &self.removed_count())
            .finish()
    }
}

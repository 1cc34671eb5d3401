//! Blocking coordination primitives between the processor and its worker.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Auto-reset wake-up flag for the dedicated worker thread.
///
/// A `notify` with no waiter is remembered, so a wake-up sent between the
/// worker's checks and its wait is never lost.
#[derive(Debug, Default)]
pub(crate) struct Trigger {
    pending: Mutex<bool>,
    cv: Condvar,
}

impl Trigger {
    pub(crate) fn notify(&self) {
        *lock(&self.pending) = true;
        self.cv.notify_one();
    }

    /// Blocks until notified or `timeout` elapses, then clears the flag.
    pub(crate) fn wait(&self, timeout: Duration) {
        let guard = lock(&self.pending);
        let (mut pending, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |pending| !*pending)
            .unwrap_or_else(PoisonError::into_inner);
        *pending = false;
    }
}

/// Broadcast raised every time the worker finishes an export pass.
///
/// Waiters read the epoch first, re-check their condition, then wait for the
/// epoch to move.
#[derive(Debug, Default)]
pub(crate) struct ExportSignal {
    epoch: Mutex<u64>,
    cv: Condvar,
}

impl ExportSignal {
    pub(crate) fn epoch(&self) -> u64 {
        *lock(&self.epoch)
    }

    pub(crate) fn notify(&self) {
        *lock(&self.epoch) += 1;
        self.cv.notify_all();
    }

    /// Waits until the epoch differs from `seen` or `timeout` elapses.
    pub(crate) fn wait(&self, seen: u64, timeout: Duration) {
        let guard = lock(&self.epoch);
        let _unused = self
            .cv
            .wait_timeout_while(guard, timeout, |epoch| *epoch == seen)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// One-shot flag set when the worker loop has exited.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    set: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    pub(crate) fn set(&self) {
        *lock(&self.set) = true;
        self.cv.notify_all();
    }

    pub(crate) fn is_set(&self) -> bool {
        *lock(&self.set)
    }

    /// Waits for the latch, `None` meaning without limit. Returns whether it
    /// was set.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let guard = lock(&self.set);
        match timeout {
            None => *self
                .cv
                .wait_while(guard, |set| !*set)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (set, _) = self
                    .cv
                    .wait_timeout_while(guard, timeout, |set| !*set)
                    .unwrap_or_else(PoisonError::into_inner);
                *set
            }
        }
    }
}

/// Sets the latch when dropped, including on unwind.
pub(crate) struct SetOnDrop<'a>(pub(crate) &'a Latch);

impl Drop for SetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// A point in time derived from an optional timeout. `None` never expires.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.and_then(|t| Instant::now().checked_add(t)))
    }

    /// Time left, `None` if unbounded. Saturates at zero.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_trigger_remembers_notify() {
        let trigger = Trigger::default();
        trigger.notify();

        let started = Instant::now();
        trigger.wait(Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(5));

        // Auto-reset: the next wait times out.
        let started = Instant::now();
        trigger.wait(Duration::from_millis(20));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_export_signal_wakes_waiter() {
        let signal = Arc::new(ExportSignal::default());
        let seen = signal.epoch();

        let notifier = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                signal.notify();
            })
        };

        signal.wait(seen, Duration::from_secs(10));
        assert_ne!(signal.epoch(), seen);
        notifier.join().unwrap();
    }

    #[test]
    fn test_latch() {
        let latch = Arc::new(Latch::default());
        assert!(!latch.wait(Some(Duration::ZERO)));

        {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                let _guard = SetOnDrop(&latch);
            })
            .join()
            .unwrap();
        }

        assert!(latch.is_set());
        assert!(latch.wait(None));
    }

    #[test]
    fn test_deadline() {
        let unbounded = Deadline::after(None);
        assert_eq!(unbounded.remaining(), None);
        assert!(!unbounded.is_expired());

        let expired = Deadline::after(Some(Duration::ZERO));
        assert!(expired.is_expired());

        let huge = Deadline::after(Some(Duration::MAX));
        assert!(!huge.is_expired());
    }
}

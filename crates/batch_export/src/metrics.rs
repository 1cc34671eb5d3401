use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters shared by producers and the export worker.
#[derive(Debug, Default)]
pub(crate) struct ProcessorMetrics {
    /// Items rejected by `on_end` (queue full or processor shut down)
    dropped: AtomicU64,
    /// Items handed to the exporter and recycled, whatever the outcome
    processed: AtomicU64,
    /// Export calls that returned `Ok`
    batches_exported: AtomicU64,
    /// Export calls that returned `Err` or panicked
    export_failures: AtomicU64,
    /// Export calls that ran longer than the configured exporter timeout
    export_over_budget: AtomicU64,
}

impl ProcessorMetrics {
    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes progress for waiters in `force_flush`, hence Release.
    #[inline]
    pub(crate) fn record_processed(&self, count: u64) {
        self.processed.fetch_add(count, Ordering::Release);
    }

    #[inline]
    pub(crate) fn record_success(&self) {
        self.batches_exported.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_over_budget(&self) {
        self.export_over_budget.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dropped: self.dropped(),
            processed: self.processed(),
            batches_exported: self.batches_exported.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
            export_over_budget: self.export_over_budget.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a processor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dropped: u64,
    pub processed: u64,
    pub batches_exported: u64,
    pub export_failures: u64,
    pub export_over_budget: u64,
}

impl MetricsSnapshot {
    /// Fraction of export calls that failed, or 0 if none were made.
    pub fn failure_rate(&self) -> f64 {
        let calls = self.batches_exported + self.export_failures;
        if calls == 0 {
            0.0
        } else {
            self.export_failures as f64 / calls as f64
        }
    }
}

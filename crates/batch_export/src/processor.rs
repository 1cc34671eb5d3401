use crate::config::{BatchExportConfig, WorkerKind};
use crate::error::ProcessorError;
use crate::exporter::Exporter;
use crate::lifecycle::{ItemLifecycle, Unpooled};
use crate::metrics::MetricsSnapshot;
use crate::pool::PoolHandle;
use crate::record::LogRecord;
use crate::signal::Deadline;
use crate::worker::{ExportState, Worker};
use export_ring::BoundedRing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lost CAS races `on_end` tolerates before treating the queue as full.
const MAX_ADD_SPINS: usize = 50_000;

/// Longest single wait in `force_flush` before progress is re-checked.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Buffers finished items and exports them in batches from a background worker.
///
/// Producers call [`on_end`](Self::on_end) from any number of threads; it
/// never blocks and never fails. When the queue is full the item is dropped
/// and counted. The worker wakes when a full batch is buffered, when the
/// scheduled delay elapses, or when a flush or shutdown asks for it.
///
/// Delivery is at most once: a batch whose export fails is not retried.
///
/// # Example
///
/// ```
/// use batch_export::{BatchExportConfig, BatchExportProcessor, InMemoryExporter};
/// use std::sync::Arc;
///
/// let exporter = Arc::new(InMemoryExporter::<u64>::new());
/// let processor =
///     BatchExportProcessor::new(Arc::clone(&exporter), BatchExportConfig::default()).unwrap();
///
/// processor.on_end(1);
/// processor.on_end(2);
/// assert!(processor.force_flush(None));
/// assert_eq!(exporter.exported(), vec![1, 2]);
///
/// assert!(processor.shutdown(None));
/// ```
pub struct BatchExportProcessor<T: Send + 'static> {
    state: Arc<ExportState<T>>,
    worker: Worker,
    is_shutdown: AtomicBool,
}

impl<T: Send + 'static> BatchExportProcessor<T> {
    /// Creates a processor for plain owned items.
    pub fn new<E>(exporter: E, config: BatchExportConfig) -> Result<Self, ProcessorError>
    where
        E: Exporter<T> + 'static,
    {
        Self::with_lifecycle(exporter, Unpooled, config)
    }

    /// Creates a processor whose items are tracked by `lifecycle`.
    ///
    /// With [`WorkerKind::Task`] this must be called from within a
    /// multi-threaded tokio runtime.
    pub fn with_lifecycle<E, L>(
        exporter: E,
        lifecycle: L,
        config: BatchExportConfig,
    ) -> Result<Self, ProcessorError>
    where
        E: Exporter<T> + 'static,
        L: ItemLifecycle<T> + 'static,
    {
        config.validate()?;
        let ring = BoundedRing::new(config.max_queue_size)?;

        let state = Arc::new(ExportState::new(
            ring,
            Box::new(exporter),
            Box::new(lifecycle),
            config.max_export_batch_size,
            config.scheduled_delay,
            config.exporter_timeout,
        ));
        let worker = Worker::spawn(Arc::clone(&state), config.worker_kind())?;

        debug!(
            exporter = state.exporter.name(),
            max_queue_size = config.max_queue_size,
            max_export_batch_size = config.max_export_batch_size,
            worker = ?config.worker_kind(),
            "batch export processor started"
        );

        Ok(Self {
            state,
            worker,
            is_shutdown: AtomicBool::new(false),
        })
    }

    /// Queues a finished item for export.
    ///
    /// Never blocks. Items arriving while the queue is full, or after
    /// [`shutdown`](Self::shutdown), are dropped and counted.
    pub fn on_end(&self, item: T) {
        let state = &self.state;

        if self.is_shutdown.load(Ordering::Acquire) {
            state.metrics.record_dropped();
            return;
        }

        let item = state.lifecycle.on_enqueue(item);
        match state.ring.try_add_with_spin(item, MAX_ADD_SPINS) {
            Ok(()) => {
                if state.ring.count() >= state.max_export_batch_size {
                    self.worker.wake();
                }
            }
            Err(item) => {
                state.metrics.record_dropped();
                trace!(exporter = state.exporter.name(), "export queue full, item dropped");
                state.lifecycle.on_rejected(item);
            }
        }
    }

    /// Exports everything queued at the time of the call, then flushes the
    /// exporter.
    ///
    /// `None` waits without limit. Returns `false` if the deadline passed or
    /// shutdown began before the queued items were exported; the worker keeps
    /// going regardless. `Some(Duration::ZERO)` only wakes the worker.
    pub fn force_flush(&self, timeout: Option<Duration>) -> bool {
        let state = &self.state;
        let deadline = Deadline::after(timeout);
        let target = state.ring.added_count();

        if state.metrics.processed() >= target {
            return state.exporter.force_flush(deadline.remaining());
        }

        state.request_export(target);
        self.worker.wake();

        if timeout == Some(Duration::ZERO) {
            return false;
        }

        loop {
            // Read the epoch before checking progress so an export finishing
            // in between is not missed.
            let seen = state.exported.epoch();
            if state.metrics.processed() >= target {
                break;
            }
            if state.shutdown_requested() {
                return false;
            }

            if deadline.is_expired() {
                warn!(
                    exporter = state.exporter.name(),
                    pending = target.saturating_sub(state.metrics.processed()),
                    "force flush timed out"
                );
                return false;
            }

            let wait = deadline
                .remaining()
                .map_or(FLUSH_POLL_INTERVAL, |left| left.min(FLUSH_POLL_INTERVAL));
            state.exported.wait(seen, wait);
        }

        state.exporter.force_flush(deadline.remaining())
    }

    /// Drains the queue, stops the worker and shuts the exporter down.
    ///
    /// `None` waits without limit. Returns `true` only if the worker finished
    /// in time and the exporter shut down cleanly. Idempotent: later calls
    /// return whether the worker has finished.
    pub fn shutdown(&self, timeout: Option<Duration>) -> bool {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return self.state.finished.is_set();
        }

        let state = &self.state;
        let deadline = Deadline::after(timeout);

        state.request_shutdown();
        self.worker.wake();
        // Flushes blocked on the export signal re-check and give up.
        state.exported.notify();

        let finished = state.finished.wait(deadline.remaining());
        if finished {
            self.worker.join();
        } else {
            warn!(
                exporter = state.exporter.name(),
                queued = state.ring.count(),
                "export worker did not finish before the shutdown deadline"
            );
        }

        let exporter_ok = state.exporter.shutdown(deadline.remaining());
        let metrics = state.metrics.snapshot();
        info!(
            exporter = state.exporter.name(),
            processed = metrics.processed,
            dropped = metrics.dropped,
            export_failures = metrics.export_failures,
            finished,
            "batch export processor shut down"
        );

        finished && exporter_ok
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Items dropped because the queue was full or the processor shut down.
    pub fn dropped_count(&self) -> u64 {
        self.state.metrics.dropped()
    }

    /// Items handed to the exporter and released, whatever the outcome.
    pub fn processed_count(&self) -> u64 {
        self.state.metrics.processed()
    }

    /// Every item ever passed to `on_end`, accepted or not.
    pub fn received_count(&self) -> u64 {
        self.state.ring.added_count() + self.state.metrics.dropped()
    }

    /// Items currently waiting in the queue.
    pub fn queued_count(&self) -> usize {
        self.state.ring.count()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    pub fn worker_kind(&self) -> WorkerKind {
        self.worker.kind()
    }

    pub fn exporter_name(&self) -> &str {
        self.state.exporter.name()
    }
}

impl BatchExportProcessor<Arc<LogRecord>> {
    /// Creates a processor for pooled log records.
    ///
    /// Records rented from a [`LocalRecordPool`](crate::LocalRecordPool) are
    /// copied into `pool` on `on_end`; shared-pool records are referenced.
    /// Either way every queued record is returned to `pool` after export.
    pub fn for_log_records<E>(
        exporter: E,
        pool: PoolHandle,
        config: BatchExportConfig,
    ) -> Result<Self, ProcessorError>
    where
        E: Exporter<Arc<LogRecord>> + 'static,
    {
        Self::with_lifecycle(exporter, pool, config)
    }
}

impl<T: Send + 'static> Drop for BatchExportProcessor<T> {
    fn drop(&mut self) {
        if !self.is_shutdown() {
            self.shutdown(Some(self.state.exporter_timeout));
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for BatchExportProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExportProcessor")
            .field("exporter", &self.exporter_name())
            .field("worker", &self.worker_kind())
            .field("queued", &self.queued_count())
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

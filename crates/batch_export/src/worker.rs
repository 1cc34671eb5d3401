//! The background export loop and the two ways of running it.

use crate::batch::Batch;
use crate::config::WorkerKind;
use crate::error::ProcessorError;
use crate::exporter::Exporter;
use crate::lifecycle::ItemLifecycle;
use crate::metrics::ProcessorMetrics;
use crate::signal::{ExportSignal, Latch, SetOnDrop, Trigger};
use export_ring::BoundedRing;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::RuntimeFlavor;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Drain target meaning "no shutdown requested".
const NO_SHUTDOWN: u64 = u64::MAX;

/// State shared by the processor handle and its worker.
pub(crate) struct ExportState<T> {
    pub(crate) ring: BoundedRing<T>,
    pub(crate) exporter: Box<dyn Exporter<T>>,
    pub(crate) lifecycle: Box<dyn ItemLifecycle<T>>,
    pub(crate) max_export_batch_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) exporter_timeout: Duration,
    /// Added count up to which a pending flush wants items exported.
    export_target: AtomicU64,
    /// Added count recorded by shutdown; the loop exits once it is drained.
    shutdown_drain_target: AtomicU64,
    pub(crate) metrics: ProcessorMetrics,
    /// Raised after every export pass.
    pub(crate) exported: ExportSignal,
    /// Set when the loop has exited.
    pub(crate) finished: Latch,
}

impl<T> ExportState<T> {
    pub(crate) fn new(
        ring: BoundedRing<T>,
        exporter: Box<dyn Exporter<T>>,
        lifecycle: Box<dyn ItemLifecycle<T>>,
        max_export_batch_size: usize,
        scheduled_delay: Duration,
        exporter_timeout: Duration,
    ) -> Self {
        Self {
            ring,
            exporter,
            lifecycle,
            max_export_batch_size,
            scheduled_delay,
            exporter_timeout,
            export_target: AtomicU64::new(0),
            shutdown_drain_target: AtomicU64::new(NO_SHUTDOWN),
            metrics: ProcessorMetrics::default(),
            exported: ExportSignal::default(),
            finished: Latch::default(),
        }
    }

    /// Asks the worker to keep exporting until `target` items were removed.
    pub(crate) fn request_export(&self, target: u64) {
        self.export_target.fetch_max(target, Ordering::AcqRel);
    }

    /// Asks the worker to drain everything accepted so far and exit.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown_drain_target
            .store(self.ring.added_count(), Ordering::Release);
    }

    #[inline]
    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_drain_target.load(Ordering::Acquire) != NO_SHUTDOWN
    }

    /// The loop only sleeps while there is less than a full batch buffered
    /// and nobody is waiting for the buffer to be drained.
    fn should_wait(&self) -> bool {
        !self.shutdown_requested()
            && self.ring.count() < self.max_export_batch_size
            && self.ring.removed_count() >= self.export_target.load(Ordering::Acquire)
    }

    fn drained_for_shutdown(&self) -> bool {
        self.ring.removed_count() >= self.shutdown_drain_target.load(Ordering::Acquire)
    }

    /// Drains up to one batch and hands it to the exporter.
    ///
    /// Every drained item is passed to the lifecycle afterwards, whatever the
    /// export outcome. Returns the number of items drained.
    pub(crate) fn export_batch(&self, batch: &mut Vec<T>) -> usize {
        self.ring
            .drain_up_to(self.max_export_batch_size, |item| batch.push(item));
        if batch.is_empty() {
            return 0;
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.exporter.export(&Batch::new(batch.as_slice()))
        }));
        let elapsed = started.elapsed();

        let count = batch.len();
        match outcome {
            Ok(Ok(())) => self.metrics.record_success(),
            Ok(Err(error)) => {
                self.metrics.record_failure();
                warn!(exporter = self.exporter.name(), %error, items = count, "export failed, batch dropped");
            }
            Err(_) => {
                self.metrics.record_failure();
                warn!(exporter = self.exporter.name(), items = count, "exporter panicked, batch dropped");
            }
        }

        if elapsed > self.exporter_timeout {
            self.metrics.record_over_budget();
            warn!(
                exporter = self.exporter.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.exporter_timeout.as_millis() as u64,
                "export exceeded its timeout"
            );
        }

        for item in batch.drain(..) {
            self.lifecycle.on_exported(item);
        }
        self.metrics.record_processed(count as u64);
        self.exported.notify();
        count
    }
}

/// Handle to the running export loop.
pub(crate) struct Worker {
    waker: Waker,
    handle: Mutex<Option<WorkerHandle>>,
}

enum Waker {
    Thread(Arc<Trigger>),
    Task(Arc<Notify>),
}

enum WorkerHandle {
    Thread(thread::JoinHandle<()>),
    Task(tokio::task::JoinHandle<()>),
}

impl Worker {
    /// Starts the export loop for `state` with the given strategy.
    pub(crate) fn spawn<T: Send + 'static>(
        state: Arc<ExportState<T>>,
        kind: WorkerKind,
    ) -> Result<Self, ProcessorError> {
        match kind {
            WorkerKind::Thread => {
                let trigger = Arc::new(Trigger::default());
                let name = format!("batch-export-{}", state.exporter.name());
                let handle = {
                    let trigger = Arc::clone(&trigger);
                    thread::Builder::new()
                        .name(name)
                        .spawn(move || run_thread(&state, &trigger))?
                };
                Ok(Self {
                    waker: Waker::Thread(trigger),
                    handle: Mutex::new(Some(WorkerHandle::Thread(handle))),
                })
            }
            WorkerKind::Task => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|_| ProcessorError::NoRuntime)?;
                // `force_flush` and `shutdown` block their caller; on a
                // single-threaded runtime that caller is the only thread able
                // to poll the task.
                if runtime.runtime_flavor() == RuntimeFlavor::CurrentThread {
                    return Err(ProcessorError::CurrentThreadRuntime);
                }
                let notify = Arc::new(Notify::new());
                let handle = runtime.spawn(run_task(state, Arc::clone(&notify)));
                Ok(Self {
                    waker: Waker::Task(notify),
                    handle: Mutex::new(Some(WorkerHandle::Task(handle))),
                })
            }
        }
    }

    pub(crate) fn kind(&self) -> WorkerKind {
        match self.waker {
            Waker::Thread(_) => WorkerKind::Thread,
            Waker::Task(_) => WorkerKind::Task,
        }
    }

    /// Wakes the loop. A wake-up sent while it is busy is kept for its next wait.
    pub(crate) fn wake(&self) {
        match &self.waker {
            Waker::Thread(trigger) => trigger.notify(),
            Waker::Task(notify) => notify.notify_one(),
        }
    }

    /// Reaps the loop after it has signalled completion.
    pub(crate) fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(WorkerHandle::Thread(handle)) => {
                if handle.join().is_err() {
                    warn!("export worker thread panicked");
                }
            }
            // The task has already returned; dropping the handle detaches it.
            Some(WorkerHandle::Task(_)) | None => {}
        }
    }
}

fn run_thread<T>(state: &ExportState<T>, trigger: &Trigger) {
    let _finished = SetOnDrop(&state.finished);
    debug!(exporter = state.exporter.name(), "export worker thread started");

    let mut batch = Vec::with_capacity(state.max_export_batch_size);
    loop {
        if state.should_wait() {
            trigger.wait(state.scheduled_delay);
        }

        state.export_batch(&mut batch);

        if state.drained_for_shutdown() {
            break;
        }
    }

    debug!(exporter = state.exporter.name(), "export worker thread stopped");
}

async fn run_task<T: Send + 'static>(state: Arc<ExportState<T>>, notify: Arc<Notify>) {
    let _finished = SetOnDrop(&state.finished);
    debug!(exporter = state.exporter.name(), "export worker task started");

    let mut batch = Vec::with_capacity(state.max_export_batch_size);
    loop {
        if state.should_wait() {
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(state.scheduled_delay) => {}
            }
        }

        // The exporter is synchronous; keep it off the async worker threads.
        let job_state = Arc::clone(&state);
        let job = tokio::task::spawn_blocking(move || {
            job_state.export_batch(&mut batch);
            batch
        });
        match job.await {
            Ok(returned) => batch = returned,
            Err(error) => {
                warn!(exporter = state.exporter.name(), %error, "export job aborted");
                break;
            }
        }

        if state.drained_for_shutdown() {
            break;
        }
    }

    debug!(exporter = state.exporter.name(), "export worker task stopped");
}

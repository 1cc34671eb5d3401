//! Configuration for the batch export processor.

use crate::error::ConfigError;
use std::time::Duration;

/// Default ring buffer capacity.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;
/// Default upper bound on items handed to the exporter in one call.
pub const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default background wake period.
pub const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_millis(5000);
/// Default budget for a single export call.
pub const DEFAULT_EXPORTER_TIMEOUT: Duration = Duration::from_millis(30000);

/// How the background export loop is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerKind {
    /// A dedicated OS thread owned by the processor.
    #[default]
    Thread,
    /// A task on the ambient tokio runtime, which must be multi-threaded.
    Task,
}

/// Configuration for [`BatchExportProcessor`](crate::BatchExportProcessor).
#[derive(Debug, Clone)]
pub struct BatchExportConfig {
    /// Capacity of the queue between producers and the export worker.
    /// Items arriving while it is full are dropped.
    ///
    /// Default: 2048
    pub max_queue_size: usize,

    /// Maximum number of items per export call. Must not exceed
    /// `max_queue_size`.
    ///
    /// Default: 512
    pub max_export_batch_size: usize,

    /// Interval at which the worker wakes up to export whatever is buffered.
    ///
    /// Default: 5s
    pub scheduled_delay: Duration,

    /// Budget for one export call. The worker does not interrupt the
    /// exporter; calls running past the budget are counted and logged.
    ///
    /// Default: 30s
    pub exporter_timeout: Duration,

    /// Run the loop on a dedicated thread (`true`) or as a tokio task (`false`).
    ///
    /// Default: true
    pub use_background_thread: bool,
}

impl Default for BatchExportConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            exporter_timeout: DEFAULT_EXPORTER_TIMEOUT,
            use_background_thread: true,
        }
    }
}

impl BatchExportConfig {
    /// Small batches flushed often.
    pub fn low_latency() -> Self {
        Self {
            max_queue_size: 1024,
            max_export_batch_size: 64,
            scheduled_delay: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Large queue and batches for bursty, high-volume producers.
    pub fn high_throughput() -> Self {
        Self {
            max_queue_size: 16384,
            max_export_batch_size: 2048,
            scheduled_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.max_export_batch_size = size;
        self
    }

    /// Sets the background wake period.
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.scheduled_delay = delay;
        self
    }

    /// Sets the export call budget.
    pub fn with_exporter_timeout(mut self, timeout: Duration) -> Self {
        self.exporter_timeout = timeout;
        self
    }

    /// Selects the dedicated-thread or tokio-task worker.
    pub fn with_background_thread(mut self, enabled: bool) -> Self {
        self.use_background_thread = enabled;
        self
    }

    /// The scheduling strategy selected by `use_background_thread`.
    #[inline]
    pub fn worker_kind(&self) -> WorkerKind {
        if self.use_background_thread {
            WorkerKind::Thread
        } else {
            WorkerKind::Task
        }
    }

    /// Checks the option ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize);
        }

        if self.max_export_batch_size == 0 || self.max_export_batch_size > self.max_queue_size {
            return Err(ConfigError::InvalidBatchSize {
                batch_size: self.max_export_batch_size,
                max_queue_size: self.max_queue_size,
            });
        }

        if self.scheduled_delay.is_zero() {
            return Err(ConfigError::InvalidScheduledDelay);
        }

        Ok(())
    }
}

//! Error types for pool, configuration and processor construction.
//!
//! Runtime failures on the hot path are never errors: a full queue is a
//! dropped item, a failed export is a counted and logged event.

use export_ring::RingError;
use thiserror::Error;

/// Errors raised when creating or resizing a record pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool must hold at least one record.
    #[error("pool capacity must be greater than zero (got {capacity})")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
}

/// Invalid processor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_queue_size` was zero.
    #[error("max_queue_size must be greater than zero")]
    InvalidQueueSize,

    /// `max_export_batch_size` was zero or larger than the queue.
    #[error("max_export_batch_size must be in 1..={max_queue_size} (got {batch_size})")]
    InvalidBatchSize {
        /// The rejected batch size.
        batch_size: usize,
        /// The configured queue size it must not exceed.
        max_queue_size: usize,
    },

    /// `scheduled_delay` was zero.
    #[error("scheduled_delay must be greater than zero")]
    InvalidScheduledDelay,
}

/// Errors that can occur while constructing a [`BatchExportProcessor`](crate::BatchExportProcessor).
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The export queue could not be created.
    #[error("failed to create export queue: {0}")]
    Queue(#[from] RingError),

    /// The task strategy was selected outside of a tokio runtime.
    #[error("task-scheduled export worker requires a tokio runtime")]
    NoRuntime,

    /// The task strategy was selected on a current-thread runtime, where a
    /// blocking flush or shutdown would starve the export task.
    #[error("task-scheduled export worker requires a multi-threaded tokio runtime")]
    CurrentThreadRuntime,

    /// The dedicated worker thread could not be spawned.
    #[error("failed to spawn export worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

//! Batch Export - Non-blocking telemetry export pipeline
//!
//! Producers hand finished items to a [`BatchExportProcessor`], which queues
//! them in a lock-free [`BoundedRing`](export_ring::BoundedRing) and exports
//! them in batches from a background worker. The worker runs either on a
//! dedicated thread or as a task on the ambient tokio runtime.
//!
//! Log records are reused across export cycles through two pools:
//!
//! - [`LocalRecordPool`]: one cached record per producer, no synchronization.
//! - [`SharedRecordPool`]: a bounded lock-free pool, reached through a
//!   resizable [`PoolHandle`].
//!
//! # Key Properties
//!
//! - `on_end` never blocks; a full queue drops the item and counts it
//! - Batches are exported in queue order; delivery is at most once
//! - Every exported or rejected record goes back to its pool
//! - `force_flush` and `shutdown` take an optional timeout and are safe to
//!   call while an export is in flight
//!
//! # Example
//!
//! ```
//! use batch_export::{
//!     BatchExportConfig, BatchExportProcessor, InMemoryExporter, LocalRecordPool, PoolHandle,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let pool = PoolHandle::new(64).unwrap();
//! let exporter = Arc::new(InMemoryExporter::log_records());
//! let processor = BatchExportProcessor::for_log_records(
//!     Arc::clone(&exporter),
//!     pool.clone(),
//!     BatchExportConfig::default(),
//! )
//! .unwrap();
//!
//! // Rent, fill, hand over, give back.
//! let mut local = LocalRecordPool::new();
//! let record = local.rent();
//! record.update(|data| data.body = Some("request handled".into()));
//! processor.on_end(Arc::clone(&record));
//! local.return_record(record);
//!
//! assert!(processor.force_flush(Some(Duration::from_secs(5))));
//! assert_eq!(exporter.exported()[0].body.as_deref(), Some("request handled"));
//! assert!(processor.shutdown(Some(Duration::from_secs(5))));
//! ```

mod batch;
mod config;
mod error;
mod exporter;
mod lifecycle;
mod metrics;
mod pool;
mod processor;
mod record;
mod signal;
mod worker;

pub use batch::Batch;
pub use config::{
    BatchExportConfig, WorkerKind, DEFAULT_EXPORTER_TIMEOUT, DEFAULT_MAX_EXPORT_BATCH_SIZE,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SCHEDULED_DELAY,
};
pub use error::{ConfigError, PoolError, ProcessorError};
pub use exporter::{
    ExportError, ExportResult, Exporter, InMemoryExporter, NullExporter, StdoutExporter,
};
pub use lifecycle::{ItemLifecycle, Unpooled};
pub use metrics::MetricsSnapshot;
pub use pool::{
    LocalRecordPool, PoolHandle, SharedRecordPool, DEFAULT_MAX_NUMBER_OF_ATTRIBUTES,
    DEFAULT_MAX_NUMBER_OF_SCOPES, DEFAULT_MAX_POOL_SIZE,
};
pub use processor::BatchExportProcessor;
pub use record::{
    AttributeValue, LogRecord, LogRecordData, RecordId, RecordSource, Severity, NOT_POOLED,
};

pub use export_ring::{BoundedRing, RingError};

use crate::batch::Batch;
use crate::record::{LogRecord, LogRecordData};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Error types for export operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// Transport-layer error (network, file, pipe)
    #[error("transport error: {0}")]
    Transport(String),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The exporter was already shut down
    #[error("exporter is shut down")]
    ShutDown,
}

/// Outcome of one export call.
pub type ExportResult = Result<(), ExportError>;

/// Destination for batches of telemetry items.
///
/// `export` is only ever called by the processor's single background worker
/// and runs synchronously; the processor does not interrupt it. `force_flush`
/// and `shutdown` are called from whichever thread flushes or shuts down the
/// processor. If the worker misses the shutdown deadline, `shutdown` may
/// overlap with a still-running export.
///
/// Items in the batch are borrowed. Anything the exporter wants to keep past
/// the call must be copied out, because the items are recycled as soon as
/// `export` returns.
pub trait Exporter<T>: Send + Sync {
    /// Exports a batch of items.
    fn export(&self, batch: &Batch<'_, T>) -> ExportResult;

    /// Flushes anything the exporter buffers internally.
    ///
    /// `None` means no deadline. Returns `false` if the flush did not
    /// complete in time.
    fn force_flush(&self, _timeout: Option<Duration>) -> bool {
        true
    }

    /// Releases exporter resources. Called once, after the final export.
    fn shutdown(&self, _timeout: Option<Duration>) -> bool {
        true
    }

    /// Returns the exporter name for debugging.
    fn name(&self) -> &str;
}

impl<T, E> Exporter<T> for Arc<E>
where
    E: Exporter<T> + ?Sized,
{
    fn export(&self, batch: &Batch<'_, T>) -> ExportResult {
        (**self).export(batch)
    }

    fn force_flush(&self, timeout: Option<Duration>) -> bool {
        (**self).force_flush(timeout)
    }

    fn shutdown(&self, timeout: Option<Duration>) -> bool {
        (**self).shutdown(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Null exporter that discards every batch (for benchmarking)
#[derive(Debug, Default)]
pub struct NullExporter;

impl NullExporter {
    pub fn new() -> Self {
        Self
    }
}

impl<T> Exporter<T> for NullExporter {
    fn export(&self, _batch: &Batch<'_, T>) -> ExportResult {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

type Mapper<T, S> = Box<dyn Fn(&T) -> S + Send + Sync>;

/// Exporter that keeps a copy of everything it receives.
///
/// Each exported item is converted with a mapper before it is stored, since
/// the item itself is recycled after the call. Share it with the processor
/// through an `Arc` to inspect the result.
pub struct InMemoryExporter<T, S = T> {
    items: Mutex<Vec<S>>,
    map: Mapper<T, S>,
    batches: AtomicU64,
    is_shutdown: AtomicBool,
}

impl<T: Clone + 'static> InMemoryExporter<T, T> {
    /// Collects clones of the exported items.
    pub fn new() -> Self {
        Self::with_mapper(T::clone)
    }
}

impl<T: Clone + 'static> Default for InMemoryExporter<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExporter<Arc<LogRecord>, LogRecordData> {
    /// Collects snapshots of exported log record payloads.
    pub fn log_records() -> Self {
        Self::with_mapper(|record: &Arc<LogRecord>| record.snapshot())
    }
}

impl<T, S> InMemoryExporter<T, S> {
    /// Collects whatever `map` extracts from each exported item.
    pub fn with_mapper<F>(map: F) -> Self
    where
        F: Fn(&T) -> S + Send + Sync + 'static,
    {
        Self {
            items: Mutex::new(Vec::new()),
            map: Box::new(map),
            batches: AtomicU64::new(0),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Number of items collected so far.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful export calls.
    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::Acquire)
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Takes the collected items, leaving the exporter empty.
    pub fn take(&self) -> Vec<S> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T, S: Clone> InMemoryExporter<T, S> {
    /// Copies out the collected items.
    pub fn exported(&self) -> Vec<S> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T, S> Exporter<T> for InMemoryExporter<T, S>
where
    S: Send,
{
    fn export(&self, batch: &Batch<'_, T>) -> ExportResult {
        if self.is_shutdown() {
            return Err(ExportError::ShutDown);
        }

        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.extend(batch.iter().map(|item| (self.map)(item)));
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn shutdown(&self, _timeout: Option<Duration>) -> bool {
        self.is_shutdown.store(true, Ordering::Release);
        true
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

impl<T, S> std::fmt::Debug for InMemoryExporter<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExporter")
            .field("len", &self.len())
            .field("batches", &self.batch_count())
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Writes each log record as one JSON line to stdout.
#[derive(Debug, Default)]
pub struct StdoutExporter;

impl StdoutExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Exporter<Arc<LogRecord>> for StdoutExporter {
    fn export(&self, batch: &Batch<'_, Arc<LogRecord>>) -> ExportResult {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        for record in batch {
            serde_json::to_writer(&mut out, &*record.data())
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            out.write_all(b"\n")
                .map_err(|e| ExportError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    fn force_flush(&self, _timeout: Option<Duration>) -> bool {
        std::io::stdout().flush().is_ok()
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_exporter() {
        let exporter = NullExporter::new();
        let items: Vec<u64> = (0..1000).collect();
        assert!(exporter.export(&Batch::new(&items)).is_ok());
        assert!(Exporter::<u64>::force_flush(&exporter, None));
        assert!(Exporter::<u64>::shutdown(&exporter, None));
    }

    #[test]
    fn test_in_memory_exporter() {
        let exporter = InMemoryExporter::<u64>::new();
        exporter.export(&Batch::new(&[1, 2, 3])).unwrap();
        exporter.export(&Batch::new(&[4])).unwrap();

        assert_eq!(exporter.exported(), vec![1, 2, 3, 4]);
        assert_eq!(exporter.batch_count(), 2);

        assert!(exporter.shutdown(None));
        assert_eq!(
            exporter.export(&Batch::new(&[5])),
            Err(ExportError::ShutDown)
        );
        assert_eq!(exporter.take().len(), 4);
        assert!(exporter.is_empty());
    }

    #[test]
    fn test_in_memory_log_records_are_snapshots() {
        let exporter = InMemoryExporter::log_records();
        let record = Arc::new(LogRecord::new());
        record.update(|d| d.body = Some("before".into()));

        exporter.export(&Batch::new(&[Arc::clone(&record)])).unwrap();
        record.update(|d| d.body = None);

        assert_eq!(exporter.exported()[0].body.as_deref(), Some("before"));
    }

    #[test]
    fn test_shared_exporter() {
        let exporter = Arc::new(InMemoryExporter::<u64>::new());
        let shared: Box<dyn Exporter<u64>> = Box::new(Arc::clone(&exporter));

        shared.export(&Batch::new(&[7])).unwrap();
        assert_eq!(shared.name(), "in_memory");
        assert_eq!(exporter.len(), 1);
    }

    #[test]
    fn test_stdout_exporter() {
        let exporter = StdoutExporter::new();
        let record = Arc::new(LogRecord::new());
        record.update(|d| {
            d.category = "test".into();
            d.add_attribute("answer", 42i64);
        });

        assert!(exporter.export(&Batch::new(&[record])).is_ok());
    }
}

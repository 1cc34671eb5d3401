//! Hooks that tie queued items to the pool they came from.
//!
//! The processor itself is generic over the item type. What it must do with
//! an item when it is queued, rejected or exported depends on where the item
//! lives, so those decisions are delegated to an [`ItemLifecycle`].

use crate::pool::PoolHandle;
use crate::record::{LogRecord, RecordSource};
use std::sync::Arc;

/// Ownership hooks invoked by the processor.
pub trait ItemLifecycle<T>: Send + Sync {
    /// Called by `on_end` before the item is queued. The returned value is
    /// what gets queued; it must not share mutable state with anything the
    /// producer may reuse after the call.
    fn on_enqueue(&self, item: T) -> T {
        item
    }

    /// Called when the queue was full and the item is being dropped.
    fn on_rejected(&self, item: T) {
        drop(item);
    }

    /// Called once for every item after its batch was handed to the
    /// exporter, whatever the export outcome.
    fn on_exported(&self, item: T) {
        drop(item);
    }
}

/// Lifecycle for items that are plain owned values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpooled;

impl<T> ItemLifecycle<T> for Unpooled {}

impl ItemLifecycle<Arc<LogRecord>> for PoolHandle {
    fn on_enqueue(&self, record: Arc<LogRecord>) -> Arc<LogRecord> {
        match record.source() {
            // The producer's local slot may be reused the moment `on_end`
            // returns, so queue an independent copy.
            RecordSource::LocalPool => {
                let copy = self.rent();
                record.copy_into(&copy);
                copy
            }
            RecordSource::SharedPool => {
                record.add_reference();
                record
            }
            RecordSource::Manual => record,
        }
    }

    fn on_rejected(&self, record: Arc<LogRecord>) {
        self.return_record(record);
    }

    fn on_exported(&self, record: Arc<LogRecord>) {
        self.return_record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocalRecordPool;

    #[test]
    fn test_local_records_are_copied() {
        let pool = PoolHandle::new(4).unwrap();
        let mut local = LocalRecordPool::new();

        let record = local.rent();
        record.update(|d| d.body = Some("hello".into()));

        let queued = pool.on_enqueue(Arc::clone(&record));
        assert_ne!(queued.id(), record.id());
        assert_eq!(queued.source(), RecordSource::SharedPool);

        // The producer reuses its slot immediately.
        local.return_record(record);
        let reused = local.rent();
        reused.update(|d| d.body = Some("overwritten".into()));

        assert_eq!(queued.data().body.as_deref(), Some("hello"));

        pool.on_exported(queued);
        assert_eq!(pool.current().count(), 1);
    }

    #[test]
    fn test_shared_records_are_referenced() {
        let pool = PoolHandle::new(4).unwrap();
        let record = pool.rent();

        let queued = pool.on_enqueue(Arc::clone(&record));
        assert_eq!(queued.id(), record.id());
        assert_eq!(record.pool_reference_count(), 2);

        // Producer and exporter each release their hold.
        pool.return_record(record);
        assert_eq!(pool.current().count(), 0);
        pool.on_exported(queued);
        assert_eq!(pool.current().count(), 1);
    }

    #[test]
    fn test_manual_records_pass_through() {
        let pool = PoolHandle::new(4).unwrap();
        let record = Arc::new(LogRecord::new());

        let queued = pool.on_enqueue(Arc::clone(&record));
        assert!(Arc::ptr_eq(&queued, &record));
        pool.on_rejected(queued);
        assert_eq!(pool.current().count(), 0);
    }
}

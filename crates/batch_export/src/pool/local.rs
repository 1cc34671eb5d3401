use super::{DEFAULT_MAX_NUMBER_OF_ATTRIBUTES, DEFAULT_MAX_NUMBER_OF_SCOPES};
use crate::record::{LogRecord, RecordSource};
use std::sync::Arc;

/// A one-record cache owned by a single producer.
///
/// Keep one per thread (or per task) and pass it by `&mut`. A record rented
/// here must not escape to another thread while still referenced by the
/// caller; the batch processor copies such records into the shared pool
/// before queueing them.
#[derive(Debug, Default)]
pub struct LocalRecordPool {
    slot: Option<Arc<LogRecord>>,
}

impl LocalRecordPool {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Returns the cached record, or a fresh one if the cache is empty.
    ///
    /// The returned record has a pool reference count of 1.
    pub fn rent(&mut self) -> Arc<LogRecord> {
        match self.slot.take() {
            Some(record) => {
                record.reset_for_rent();
                record
            }
            None => Arc::new(LogRecord::pooled(RecordSource::LocalPool)),
        }
    }

    /// Hands a record back to the cache.
    ///
    /// Only records rented from a local pool are cached, and only if the
    /// cache is empty and the caller holds the last handle. Everything else
    /// is simply dropped.
    ///
    /// Returning a record while another clone of the `Arc` is still alive is a
    /// silent no-op: the record is not cleared and not cached, so the next
    /// `rent` allocates. Return the last handle to get it reused.
    pub fn return_record(&mut self, record: Arc<LogRecord>) {
        if record.source() != RecordSource::LocalPool || self.slot.is_some() {
            return;
        }
        if Arc::strong_count(&record) != 1 {
            return;
        }

        record.clear(DEFAULT_MAX_NUMBER_OF_ATTRIBUTES, DEFAULT_MAX_NUMBER_OF_SCOPES);
        self.slot = Some(record);
    }

    /// Number of cached records (0 or 1).
    #[inline]
    pub fn count(&self) -> usize {
        usize::from(self.slot.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return_reuses_allocation() {
        let mut pool = LocalRecordPool::new();
        assert_eq!(pool.count(), 0);

        let record = pool.rent();
        assert_eq!(record.source(), RecordSource::LocalPool);
        assert_eq!(record.pool_reference_count(), 1);
        let id = record.id();
        record.update(|d| d.body = Some("first".into()));

        pool.return_record(record);
        assert_eq!(pool.count(), 1);

        let again = pool.rent();
        assert_eq!(again.id(), id);
        assert_eq!(again.generation(), 1);
        assert!(again.data().body.is_none());
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn test_return_ignores_foreign_records() {
        let mut pool = LocalRecordPool::new();
        pool.return_record(Arc::new(LogRecord::new()));
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn test_return_keeps_only_one() {
        let mut pool = LocalRecordPool::new();
        let a = pool.rent();
        let b = pool.rent();
        assert_ne!(a.id(), b.id());

        pool.return_record(a);
        pool.return_record(b);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_return_skips_records_still_shared() {
        let mut pool = LocalRecordPool::new();
        let record = pool.rent();
        let alias = Arc::clone(&record);

        alias.update(|d| d.body = Some("kept".into()));
        pool.return_record(record);
        assert_eq!(pool.count(), 0);
        assert_eq!(alias.data().body.as_deref(), Some("kept"));

        // The last handle is cached as usual.
        let id = alias.id();
        pool.return_record(alias);
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.rent().id(), id);
    }
}

//! Log record data model.
//!
//! A [`LogRecord`] is a reusable, mutable unit of telemetry. Records are
//! shared as `Arc<LogRecord>`; the payload sits behind a mutex so that a
//! pool can clear a record it has just reclaimed even while stale handles
//! to it still exist.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Reference count carried by records that did not come from a pool.
/// Returning such a record never reaches zero, so it is never recycled.
pub const NOT_POOLED: i32 = i32::MAX;

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one physical record allocation.
///
/// Two handles refer to the same record iff their ids are equal. Combined
/// with [`LogRecord::generation`] it tells apart successive rentals of the
/// same allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        Self(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a record was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Rented from a [`SharedRecordPool`](crate::SharedRecordPool).
    SharedPool,
    /// Rented from a [`LocalRecordPool`](crate::LocalRecordPool).
    LocalPool,
    /// Constructed directly; never recycled.
    Manual,
}

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Severity {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

/// Attribute value types for record metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The payload of a log record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecordData {
    /// Event time (Unix nanoseconds)
    pub timestamp: u64,
    /// Logger category
    pub category: String,
    pub severity: Severity,
    pub event_name: Option<String>,
    /// Formatted message
    pub body: Option<String>,
    /// Trace context (zero when absent)
    pub trace_id: u128,
    pub span_id: u64,
    /// Attribute storage. `None` until the first attribute is added.
    pub attributes: Option<Vec<(String, AttributeValue)>>,
    /// Buffered scope values. `None` until the first scope is pushed.
    pub scopes: Option<Vec<AttributeValue>>,
}

impl LogRecordData {
    /// Appends an attribute, allocating storage on first use.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
    }

    /// Appends a scope value, allocating storage on first use.
    pub fn push_scope(&mut self, value: impl Into<AttributeValue>) {
        self.scopes.get_or_insert_with(Vec::new).push(value.into());
    }

    /// Stamps the record with the current wall-clock time.
    pub fn stamp_now(&mut self) {
        self.timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
    }

    /// Resets every field for reuse.
    ///
    /// Collections no larger than the given limits are emptied but keep their
    /// allocation; larger ones are discarded so one oversized record cannot
    /// pin memory in the pool indefinitely.
    pub(crate) fn clear(&mut self, max_attributes: usize, max_scopes: usize) {
        self.timestamp = 0;
        self.category.clear();
        self.severity = Severity::default();
        self.event_name = None;
        self.body = None;
        self.trace_id = 0;
        self.span_id = 0;

        if self.attributes.as_ref().is_some_and(|a| a.len() > max_attributes) {
            self.attributes = None;
        } else if let Some(attributes) = self.attributes.as_mut() {
            attributes.clear();
        }

        if self.scopes.as_ref().is_some_and(|s| s.len() > max_scopes) {
            self.scopes = None;
        } else if let Some(scopes) = self.scopes.as_mut() {
            scopes.clear();
        }
    }
}

/// A reusable log record.
pub struct LogRecord {
    id: RecordId,
    source: RecordSource,
    /// Incremented every time a pool hands this record out again.
    generation: AtomicU64,
    /// Outstanding holders. Recycling happens when this reaches exactly zero.
    pool_reference_count: AtomicI32,
    data: Mutex<LogRecordData>,
}

impl LogRecord {
    /// Creates a record that is not owned by any pool.
    ///
    /// Returning it to a pool is always a no-op.
    pub fn new() -> Self {
        Self::with_data(LogRecordData::default())
    }

    /// Creates an unpooled record with the given payload.
    pub fn with_data(data: LogRecordData) -> Self {
        Self {
            id: RecordId::next(),
            source: RecordSource::Manual,
            generation: AtomicU64::new(0),
            pool_reference_count: AtomicI32::new(NOT_POOLED),
            data: Mutex::new(data),
        }
    }

    /// Creates a fresh record on behalf of a pool, already held once.
    pub(crate) fn pooled(source: RecordSource) -> Self {
        Self {
            id: RecordId::next(),
            source,
            generation: AtomicU64::new(0),
            pool_reference_count: AtomicI32::new(1),
            data: Mutex::new(LogRecordData::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> RecordId {
        self.id
    }

    #[inline]
    pub fn source(&self) -> RecordSource {
        self.source
    }

    /// Number of times this allocation has been handed out after being recycled.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current pool reference count. May be negative after a double return.
    #[inline]
    pub fn pool_reference_count(&self) -> i32 {
        self.pool_reference_count.load(Ordering::Acquire)
    }

    /// Registers an additional holder so the record outlives the current call.
    ///
    /// Each call must be balanced by one extra return to the pool.
    pub fn add_reference(&self) {
        if self.source != RecordSource::Manual {
            self.pool_reference_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Drops one holder, returning the remaining count.
    pub(crate) fn release_reference(&self) -> i32 {
        self.pool_reference_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Marks the record as freshly rented.
    pub(crate) fn reset_for_rent(&self) {
        self.pool_reference_count.store(1, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Locks the payload for reading or writing.
    pub fn data(&self) -> MutexGuard<'_, LogRecordData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutates the payload in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut LogRecordData),
    {
        f(&mut self.data());
    }

    /// Clones the payload out.
    pub fn snapshot(&self) -> LogRecordData {
        self.data().clone()
    }

    /// Copies this record's payload into `target`, reusing its allocations.
    pub fn copy_into(&self, target: &LogRecord) {
        if self.id == target.id {
            return;
        }
        let source = self.data();
        target.data().clone_from(&source);
    }

    pub(crate) fn clear(&self, max_attributes: usize, max_scopes: usize) {
        self.data().clear(max_attributes, max_scopes);
    }
}

impl Default for LogRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRecord")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("generation", &self.generation())
            .field("pool_reference_count", &self.pool_reference_count())
            .finish_non_exhaustive()
    }
}

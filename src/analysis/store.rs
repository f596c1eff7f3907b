//! Mismatch stores feeding the analysis session.
//!
//! The session depends on exactly two operations: pop the next pending
//! record and count what is left. [`MemoryStore`] is the in-process backend;
//! data is lost on process restart.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::experiment::{Event, MismatchRecord, Publisher};
use crate::Result;

/// Source of recorded mismatches.
///
/// Implementations own the persistence format; the session only needs
/// `read` and `count`, and turns each raw record into a prepared one with its
/// cook step.
pub trait MismatchStore {
    /// Raw record type as stored.
    type Raw;

    /// Pop the next pending record.
    ///
    /// Returns `None` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read.
    fn read(&self) -> Result<Option<Self::Raw>>;

    /// Number of pending records.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be queried.
    fn count(&self) -> Result<usize>;

    /// Whether any record is pending.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be queried.
    fn more(&self) -> Result<bool> {
        Ok(self.count()? != 0)
    }
}

impl<S: MismatchStore + ?Sized> MismatchStore for Arc<S> {
    type Raw = S::Raw;

    fn read(&self) -> Result<Option<Self::Raw>> {
        (**self).read()
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}

/// In-memory mismatch store.
///
/// Records are kept in push order and consumed from the tail, so the most
/// recently pushed record is read first. Thread-safe: one side can publish
/// into the store while another drains it.
///
/// # Example
///
/// ```rust
/// use labcoat::analysis::{MemoryStore, MismatchStore};
///
/// let store = MemoryStore::from(vec!["a", "b", "c"]);
/// assert_eq!(store.read()?, Some("c"));
/// assert_eq!(store.count()?, 2);
/// # Ok::<(), labcoat::Error>(())
/// ```
#[derive(Debug)]
pub struct MemoryStore<R> {
    records: Mutex<Vec<R>>,
}

impl<R> MemoryStore<R> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Create with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Push a record; it becomes the next one read.
    pub fn push(&self, record: R) {
        self.records.lock().push(record);
    }

    /// Get the number of pending records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop every pending record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> From<Vec<R>> for MemoryStore<R> {
    fn from(records: Vec<R>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl<R> FromIterator<R> for MemoryStore<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<R> MismatchStore for MemoryStore<R> {
    type Raw = R;

    fn read(&self) -> Result<Option<R>> {
        Ok(self.records.lock().pop())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.len())
    }
}

/// Persists mismatches only; matches are dropped.
impl Publisher for MemoryStore<MismatchRecord> {
    fn publish(&self, event: Event, payload: &MismatchRecord) {
        if event.is_mismatch() {
            debug!(experiment = payload.experiment(), "storing mismatch");
            self.push(payload.clone());
        }
    }
}

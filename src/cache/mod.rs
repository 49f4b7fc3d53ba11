//! RecordCache - latest fetched records and per-viewer state.
//!
//! Every key owns a slot with its own lock, following the lazily created
//! per-key locks of a lock manager. Writes are last-write-wins: a fetch
//! result replaces the prior value for its key, it is never merged.
//!
//! There is no eviction. Records are never deleted at the source, so the
//! cache is bounded by the record count.
//!
//! ## Example
//!
//! ```ignore
//! let cache: RecordCache<Poll, PollViewer> = RecordCache::new();
//! cache.put(0, poll)?;
//! cache.mark_stale(0)?;
//! assert!(cache.is_stale(0)?);
//! ```

mod slot;

use std::fmt;

use crate::record::{Address, RecordId};
use slot::SlotMap;

/// A cached value with its bookkeeping flags.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub value: T,
    /// Incremented on every successful write.
    pub version: u64,
    /// Marked by an invalidation and not yet re-fetched.
    pub stale: bool,
    /// The latest fetch failed; `value` is what an earlier fetch returned.
    pub fetch_failed: bool,
}

/// Epoch of a slot captured when a fetch starts.
///
/// Passing it back on commit tells the cache whether the slot was
/// invalidated while the fetch was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
}

/// Error type for cache operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    LockPoisoned(&'static str),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::LockPoisoned(operation) => {
                write!(f, "cache lock poisoned during {}", operation)
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// Key-value store from record ID to record, and from `(id, viewer)` to viewer state.
pub struct RecordCache<R, V> {
    records: SlotMap<RecordId, R>,
    viewer_states: SlotMap<(RecordId, Address), V>,
}

impl<R: Clone, V: Clone> Default for RecordCache<R, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone, V: Clone> RecordCache<R, V> {
    pub fn new() -> Self {
        RecordCache {
            records: SlotMap::new(),
            viewer_states: SlotMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    /// The last known value of a record.
    pub fn get(&self, id: RecordId) -> Result<Option<R>, CacheError> {
        self.records.value(&id)
    }

    /// The last known value of a record with its flags.
    pub fn entry(&self, id: RecordId) -> Result<Option<CachedValue<R>>, CacheError> {
        self.records.entry(&id)
    }

    /// Overwrite a record and clear its stale and failure flags. Returns the new version.
    pub fn put(&self, id: RecordId, record: R) -> Result<u64, CacheError> {
        self.records.put(&id, record)
    }

    /// Capture the record slot's epoch before fetching it.
    pub fn begin_fetch(&self, id: RecordId) -> Result<FetchTicket, CacheError> {
        self.records.begin_fetch(&id)
    }

    /// Write a fetch result. The slot stays stale if it was invalidated after `ticket` was taken.
    pub fn commit(&self, id: RecordId, record: R, ticket: FetchTicket) -> Result<u64, CacheError> {
        self.records.commit(&id, record, ticket)
    }

    /// Record a failed fetch. Returns whether an earlier value is retained.
    pub fn fail(&self, id: RecordId) -> Result<bool, CacheError> {
        self.records.fail(&id)
    }

    pub fn mark_stale(&self, id: RecordId) -> Result<(), CacheError> {
        self.records.mark_stale(&id)
    }

    pub fn is_stale(&self, id: RecordId) -> Result<bool, CacheError> {
        self.records.is_stale(&id)
    }

    /// True when the record was never cached or is stale.
    pub fn needs_fetch(&self, id: RecordId) -> Result<bool, CacheError> {
        self.records.needs_fetch(&id)
    }

    /// Number of records holding a value.
    pub fn len(&self) -> Result<usize, CacheError> {
        self.records.populated()
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Drop every record and viewer state with `id >= count`. Returns how many records were dropped.
    pub fn truncate(&self, count: u64) -> Result<usize, CacheError> {
        self.viewer_states.retain(|(id, _)| *id < count)?;
        self.records.retain(|id| *id < count)
    }

    // ------------------------------------------------------------------------
    // Viewer state
    // ------------------------------------------------------------------------

    pub fn get_viewer_state(&self, id: RecordId, viewer: &Address) -> Result<Option<V>, CacheError> {
        self.viewer_states.value(&(id, viewer.clone()))
    }

    pub fn viewer_entry(
        &self,
        id: RecordId,
        viewer: &Address,
    ) -> Result<Option<CachedValue<V>>, CacheError> {
        self.viewer_states.entry(&(id, viewer.clone()))
    }

    pub fn put_viewer_state(&self, id: RecordId, viewer: &Address, state: V) -> Result<u64, CacheError> {
        self.viewer_states.put(&(id, viewer.clone()), state)
    }

    pub fn begin_viewer_fetch(&self, id: RecordId, viewer: &Address) -> Result<FetchTicket, CacheError> {
        self.viewer_states.begin_fetch(&(id, viewer.clone()))
    }

    pub fn commit_viewer_state(
        &self,
        id: RecordId,
        viewer: &Address,
        state: V,
        ticket: FetchTicket,
    ) -> Result<u64, CacheError> {
        self.viewer_states.commit(&(id, viewer.clone()), state, ticket)
    }

    pub fn fail_viewer_state(&self, id: RecordId, viewer: &Address) -> Result<bool, CacheError> {
        self.viewer_states.fail(&(id, viewer.clone()))
    }

    /// The latest viewer-state read failed. True even when nothing was cached before it.
    pub fn viewer_fetch_failed(&self, id: RecordId, viewer: &Address) -> Result<bool, CacheError> {
        self.viewer_states.fetch_failed(&(id, viewer.clone()))
    }

    pub fn mark_viewer_stale(&self, id: RecordId, viewer: &Address) -> Result<(), CacheError> {
        self.viewer_states.mark_stale(&(id, viewer.clone()))
    }

    pub fn is_viewer_stale(&self, id: RecordId, viewer: &Address) -> Result<bool, CacheError> {
        self.viewer_states.is_stale(&(id, viewer.clone()))
    }

    pub fn viewer_needs_fetch(&self, id: RecordId, viewer: &Address) -> Result<bool, CacheError> {
        self.viewer_states.needs_fetch(&(id, viewer.clone()))
    }
}

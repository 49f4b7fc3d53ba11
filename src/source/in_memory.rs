//! InMemoryRecordSource - Vec-backed record source for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{RecordSource, SourceError};
use crate::record::{Address, Record, RecordId, ViewerState};

struct SourceState<R, V> {
    records: Vec<R>,
    viewer_states: HashMap<(RecordId, Address), V>,
    count_override: Option<u64>,
    failing_count: bool,
    failing_records: HashSet<RecordId>,
    failing_viewer_states: HashSet<RecordId>,
    delays: HashMap<RecordId, Duration>,
    count_reads: usize,
    record_reads: HashMap<RecordId, usize>,
    viewer_reads: HashMap<RecordId, usize>,
}

/// In-memory record source backed by a `Vec`.
///
/// Clone-friendly via Arc: a test keeps one handle to mutate records and
/// inspect read counters while the synchronizer reads through another.
/// Viewer state that was never set reads as `V::default()`.
pub struct InMemoryRecordSource<R, V> {
    state: Arc<RwLock<SourceState<R, V>>>,
}

impl<R, V> Clone for InMemoryRecordSource<R, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R: Record, V: ViewerState + Default> Default for InMemoryRecordSource<R, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record, V: ViewerState + Default> InMemoryRecordSource<R, V> {
    /// Create an empty source.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SourceState {
                records: Vec::new(),
                viewer_states: HashMap::new(),
                count_override: None,
                failing_count: false,
                failing_records: HashSet::new(),
                failing_viewer_states: HashSet::new(),
                delays: HashMap::new(),
                count_reads: 0,
                record_reads: HashMap::new(),
                viewer_reads: HashMap::new(),
            })),
        }
    }

    /// Create a source holding the given records. Their IDs must be `0..n` in order.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Result<Self, SourceError> {
        let source = Self::new();
        for record in records {
            source.append(record)?;
        }
        Ok(source)
    }

    fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, SourceState<R, V>>, SourceError> {
        self.state
            .read()
            .map_err(|_| SourceError::Unavailable(format!("lock poisoned during {}", operation)))
    }

    fn write(&self, operation: &'static str) -> Result<RwLockWriteGuard<'_, SourceState<R, V>>, SourceError> {
        self.state
            .write()
            .map_err(|_| SourceError::Unavailable(format!("lock poisoned during {}", operation)))
    }

    /// Append a record. Its ID must equal the current record count.
    pub fn append(&self, record: R) -> Result<RecordId, SourceError> {
        let mut state = self.write("append")?;
        let expected = state.records.len() as RecordId;
        if record.id() != expected {
            return Err(SourceError::Decode(format!(
                "record id {} out of sequence, expected {}",
                record.id(),
                expected
            )));
        }
        state.records.push(record);
        Ok(expected)
    }

    /// Mutate a stored record in place.
    pub fn update<F>(&self, id: RecordId, f: F) -> Result<(), SourceError>
    where
        F: FnOnce(&mut R),
    {
        let mut state = self.write("update")?;
        let record = state
            .records
            .get_mut(id as usize)
            .ok_or(SourceError::NotFound(id))?;
        f(record);
        Ok(())
    }

    /// Get a copy of a stored record, bypassing read counters and injected failures.
    pub fn record(&self, id: RecordId) -> Result<Option<R>, SourceError> {
        Ok(self.read("inspect")?.records.get(id as usize).cloned())
    }

    /// Number of stored records, ignoring any count override.
    pub fn len(&self) -> Result<usize, SourceError> {
        Ok(self.read("inspect")?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, SourceError> {
        Ok(self.len()? == 0)
    }

    /// Get the viewer state explicitly set for `(id, viewer)`, bypassing read counters.
    pub fn viewer_state(&self, id: RecordId, viewer: &Address) -> Result<Option<V>, SourceError> {
        Ok(self
            .read("inspect")?
            .viewer_states
            .get(&(id, viewer.clone()))
            .cloned())
    }

    /// Set the viewer state returned for `(id, viewer)`.
    pub fn set_viewer_state(&self, id: RecordId, viewer: &Address, state: V) -> Result<(), SourceError> {
        self.write("set viewer state")?
            .viewer_states
            .insert((id, viewer.clone()), state);
        Ok(())
    }

    /// Report `count` instead of the number of stored records. `None` clears it.
    pub fn set_count_override(&self, count: Option<u64>) -> Result<(), SourceError> {
        self.write("count override")?.count_override = count;
        Ok(())
    }

    /// Make `get_count` fail while `failing` is set.
    pub fn fail_count(&self, failing: bool) -> Result<(), SourceError> {
        self.write("fail count")?.failing_count = failing;
        Ok(())
    }

    /// Make reads of a record fail until `restore` is called.
    pub fn fail_reads(&self, id: RecordId) -> Result<(), SourceError> {
        self.write("fail reads")?.failing_records.insert(id);
        Ok(())
    }

    /// Make viewer-state reads for a record fail until `restore` is called.
    pub fn fail_viewer_reads(&self, id: RecordId) -> Result<(), SourceError> {
        self.write("fail reads")?.failing_viewer_states.insert(id);
        Ok(())
    }

    /// Clear injected failures and delays for a record.
    pub fn restore(&self, id: RecordId) -> Result<(), SourceError> {
        let mut state = self.write("restore")?;
        state.failing_records.remove(&id);
        state.failing_viewer_states.remove(&id);
        state.delays.remove(&id);
        Ok(())
    }

    /// Delay every read of a record (and its viewer state) by `delay`.
    pub fn delay_reads(&self, id: RecordId, delay: Duration) -> Result<(), SourceError> {
        self.write("delay reads")?.delays.insert(id, delay);
        Ok(())
    }

    /// How many times `get_count` was called.
    pub fn count_reads(&self) -> Result<usize, SourceError> {
        Ok(self.read("read counters")?.count_reads)
    }

    /// How many times `get_record(id)` was called.
    pub fn record_reads(&self, id: RecordId) -> Result<usize, SourceError> {
        Ok(self
            .read("read counters")?
            .record_reads
            .get(&id)
            .copied()
            .unwrap_or(0))
    }

    /// Total `get_record` calls across all IDs.
    pub fn total_record_reads(&self) -> Result<usize, SourceError> {
        Ok(self.read("read counters")?.record_reads.values().sum())
    }

    /// How many times `get_viewer_state(id, _)` was called, across viewers.
    pub fn viewer_reads(&self, id: RecordId) -> Result<usize, SourceError> {
        Ok(self
            .read("read counters")?
            .viewer_reads
            .get(&id)
            .copied()
            .unwrap_or(0))
    }

    /// Zero all read counters.
    pub fn reset_read_counts(&self) -> Result<(), SourceError> {
        let mut state = self.write("reset counters")?;
        state.count_reads = 0;
        state.record_reads.clear();
        state.viewer_reads.clear();
        Ok(())
    }

    fn visible_count(state: &SourceState<R, V>) -> u64 {
        state
            .count_override
            .unwrap_or(state.records.len() as u64)
    }
}

#[async_trait]
impl<R: Record, V: ViewerState + Default> RecordSource for InMemoryRecordSource<R, V> {
    type Record = R;
    type Viewer = V;

    async fn get_count(&self) -> Result<u64, SourceError> {
        let mut state = self.write("count read")?;
        state.count_reads += 1;
        if state.failing_count {
            return Err(SourceError::Unavailable("count read failed".into()));
        }
        Ok(Self::visible_count(&state))
    }

    async fn get_record(&self, id: RecordId) -> Result<R, SourceError> {
        let delay = {
            let mut state = self.write("record read")?;
            *state.record_reads.entry(id).or_insert(0) += 1;
            state.delays.get(&id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.read("record read")?;
        if state.failing_records.contains(&id) {
            return Err(SourceError::Unavailable(format!("read of record {} failed", id)));
        }
        if id >= Self::visible_count(&state) {
            return Err(SourceError::NotFound(id));
        }
        state
            .records
            .get(id as usize)
            .cloned()
            .ok_or(SourceError::NotFound(id))
    }

    async fn get_viewer_state(&self, id: RecordId, viewer: &Address) -> Result<V, SourceError> {
        let delay = {
            let mut state = self.write("viewer read")?;
            *state.viewer_reads.entry(id).or_insert(0) += 1;
            state.delays.get(&id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.read("viewer read")?;
        if state.failing_viewer_states.contains(&id) {
            return Err(SourceError::Unavailable(format!(
                "read of viewer state for record {} failed",
                id
            )));
        }
        if id >= Self::visible_count(&state) {
            return Err(SourceError::NotFound(id));
        }
        Ok(state
            .viewer_states
            .get(&(id, viewer.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

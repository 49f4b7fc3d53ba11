use serde::{Deserialize, Serialize};

use crate::record::{Address, RecordId};

/// Freshness of a snapshot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// The latest fetch for this entry succeeded.
    Fresh,
    /// The latest fetch failed; the values come from an earlier fetch.
    FetchFailed,
    /// A viewer is set but its state for this record has never been read
    /// successfully. `viewer_state` is `None`.
    ViewerStateUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<R, V> {
    pub id: RecordId,
    pub record: R,
    /// `None` when no viewer is set, or with `ViewerStateUnavailable` status.
    pub viewer_state: Option<V>,
    pub status: EntryStatus,
}

/// The ordered list of records handed to the presentation layer.
///
/// Entries are in ascending ID order. IDs below `count` that have never
/// been fetched successfully are listed in `unavailable` instead of being
/// dropped silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<R, V> {
    pub count: u64,
    pub viewer: Option<Address>,
    pub entries: Vec<SnapshotEntry<R, V>>,
    pub unavailable: Vec<RecordId>,
}

impl<R, V> Snapshot<R, V> {
    pub fn empty(viewer: Option<Address>) -> Self {
        Snapshot {
            count: 0,
            viewer,
            entries: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&SnapshotEntry<R, V>> {
        self.entries
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.entries.iter().map(|entry| &entry.record)
    }

    /// Every ID below `count` has an entry.
    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty() && self.entries.len() as u64 == self.count
    }

    /// Some entry is missing or shows data from before a failed read.
    pub fn has_failures(&self) -> bool {
        !self.unavailable.is_empty()
            || self
                .entries
                .iter()
                .any(|entry| entry.status != EntryStatus::Fresh)
    }
}

impl<R: Serialize, V: Serialize> Snapshot<R, V> {
    /// Binary encoding used to compare snapshots byte for byte.
    pub fn encode(&self) -> Result<Vec<u8>, bitcode::Error> {
        bitcode::serialize(self)
    }
}

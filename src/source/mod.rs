//! RecordSource - the external, authoritative ledger of indexed records.
//!
//! A source exposes a record count and per-ID reads. IDs are dense and
//! zero-based, so every `id < count` is expected to resolve eventually.
//! Reads are assumed idempotent and side-effect free.

mod in_memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::record::{Address, Record, RecordId, ViewerState};

/// Read access to an append-only set of records and per-viewer state.
///
/// In a dapp this is a deployed contract reached over RPC; `InMemoryRecordSource`
/// is the in-process implementation used in tests.
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Record;
    type Viewer: ViewerState;

    /// Number of records created so far.
    async fn get_count(&self) -> Result<u64, SourceError>;

    /// Fetch a single record by ID.
    async fn get_record(&self, id: RecordId) -> Result<Self::Record, SourceError>;

    /// Fetch the viewer-specific state for a record.
    async fn get_viewer_state(
        &self,
        id: RecordId,
        viewer: &Address,
    ) -> Result<Self::Viewer, SourceError>;
}

/// Error type for source reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// No record with this ID exists (yet).
    NotFound(RecordId),
    /// The source could not be reached or refused the read.
    Unavailable(String),
    /// The source answered with data that could not be decoded.
    Decode(String),
    /// The read did not complete before the deadline.
    Timeout(Duration),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(id) => write!(f, "record {} not found", id),
            SourceError::Unavailable(msg) => write!(f, "source unavailable: {}", msg),
            SourceError::Decode(msg) => write!(f, "could not decode source response: {}", msg),
            SourceError::Timeout(after) => {
                write!(f, "source read timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for SourceError {}

pub use in_memory::InMemoryRecordSource;

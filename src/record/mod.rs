//! Records - the sequentially identified items a source exposes.
//!
//! Every record carries a dense, zero-based `RecordId` assigned by the source
//! when it is created. Records are never deleted or renumbered.
//!
//! ## Example
//!
//! ```ignore
//! use indexed_sync::{Record, RecordId};
//!
//! #[derive(Clone, PartialEq, Serialize, Deserialize, Record)]
//! #[record(collection = "questions")]
//! struct Question {
//!     id: RecordId,
//!     text: String,
//! }
//! ```

mod address;

use serde::{de::DeserializeOwned, Serialize};

pub use address::{Address, AddressError};

/// Position of a record in its source. Assigned sequentially from zero.
pub type RecordId = u64;

/// Trait for types that can be held in a `RecordCache` and listed in a `Snapshot`.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    /// The collection name for this record type (e.g. "polls", "questions").
    /// Used for log fields and transport paths.
    const COLLECTION: &'static str;

    /// The record's position in its source.
    fn id(&self) -> RecordId;
}

/// Per-viewer facts derived from a record, such as "has already voted".
///
/// Implemented for every type meeting the bounds.
pub trait ViewerState: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

impl<T> ViewerState for T where T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

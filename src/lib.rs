extern crate self as indexed_sync;

mod aggregator;
mod cache;
mod config;
mod error;
mod mutation;
mod record;
mod source;
mod synchronizer;

pub mod domain;
#[cfg(feature = "emitter")]
pub mod events;
#[cfg(feature = "http")]
pub mod http;
pub mod units;

pub use aggregator::{
    Aggregator, CountRefresh, CountRegression, EntryStatus, FetchFailure, FetchReport, Snapshot,
    SnapshotEntry, SourceSnapshot,
};
pub use cache::{CacheError, CachedValue, FetchTicket, RecordCache};
pub use config::{ConfigError, SyncConfig};
pub use error::{ActError, SyncError};
pub use mutation::{
    Action, CallArg, CallContext, ContractCall, Effect, HandlerDispatcher, MutationDispatcher,
    MutationError, Receipt, ValidationError,
};
pub use record::{Address, AddressError, Record, RecordId, ViewerState};
pub use source::{InMemoryRecordSource, RecordSource, SourceError};
pub use synchronizer::{Refresh, SourceRefresh, SyncWarning, Synchronizer};

// Derive macro for `Record`
pub use indexed_sync_macros::Record;

#[cfg(feature = "emitter")]
pub use events::SyncEvents;

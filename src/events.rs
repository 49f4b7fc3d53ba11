//! In-process notifications for synchronizer observers.
//!
//! Wraps `event_emitter_rs::EventEmitter`. Listeners run on the emitter's
//! own threads, so callbacks must not assume they run before `emit` returns.
//!
//! ## Example
//!
//! ```ignore
//! let events = Arc::new(SyncEvents::new());
//! events.on(COUNT_REGRESSED, |e: CountRegressed| {
//!     eprintln!("count went from {} to {}", e.previous, e.current);
//! })?;
//! let aggregator = Aggregator::new(source).with_events(events.clone());
//! ```

use std::sync::Mutex;

use event_emitter_rs::EventEmitter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::CacheError;
use crate::record::RecordId;

pub const COUNT_REGRESSED: &str = "count_regressed";
pub const FETCH_FAILED: &str = "fetch_failed";
pub const MUTATION_CONFIRMED: &str = "mutation_confirmed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRegressed {
    pub collection: String,
    pub previous: u64,
    pub current: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailed {
    pub collection: String,
    pub id: RecordId,
    /// The failed read was a viewer-state read.
    pub viewer_state: bool,
    pub reason: String,
    /// An earlier value is still shown.
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationConfirmed {
    pub function: String,
    pub tx_hash: String,
    pub invalidated: usize,
}

/// Shared emitter for synchronizer events.
pub struct SyncEvents {
    emitter: Mutex<EventEmitter>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        SyncEvents {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Register a listener. Returns the emitter's listener ID.
    pub fn on<T, F>(&self, event: &str, listener: F) -> Result<String, CacheError>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| CacheError::LockPoisoned("event listener registration"))?;
        Ok(emitter.on(event, listener))
    }

    /// Emit an event. A poisoned emitter drops the event.
    pub(crate) fn emit<T: Serialize>(&self, event: &str, payload: T) {
        if let Ok(mut emitter) = self.emitter.lock() {
            let _ = emitter.emit(event, payload);
        }
    }
}

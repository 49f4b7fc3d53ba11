//! Synchronizer - the caller-facing API over an aggregator and a dispatcher.
//!
//! `get_snapshot` answers from the last materialized snapshot when nothing
//! has been invalidated since, and kicks off a background refresh so new
//! records show up on a later call. After a successful `act`, the affected
//! entries are invalidated before `act` returns, so the next `get_snapshot`
//! re-reads them instead of answering from the old snapshot.
//!
//! ## Example
//!
//! ```ignore
//! let sync = Synchronizer::new(Aggregator::new(source), dispatcher);
//! sync.set_viewer(Some(alice))?;
//!
//! let polls = sync.get_snapshot().await?;
//! sync.act(&PollAction::Vote { poll_id: 0, option_index: 1 }).await?;
//! let polls = sync.get_snapshot().await?; // poll 0 re-read
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{
    Aggregator, CountRefresh, CountRegression, FetchFailure, Snapshot, SourceSnapshot,
};
use crate::cache::CacheError;
use crate::error::{ActError, SyncError};
#[cfg(feature = "emitter")]
use crate::events;
use crate::mutation::{Action, Effect, MutationDispatcher, MutationError, Receipt};
use crate::record::{Address, RecordId};
use crate::source::RecordSource;

/// A condition the caller should know about that did not fail the refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// The source reported fewer records than before; the list was truncated.
    CountRegression { previous: u64, current: u64 },
    /// A per-ID read failed. With `retained` set, the entry shows older data.
    FetchFailed {
        id: RecordId,
        viewer_state: bool,
        reason: String,
        retained: bool,
    },
}

impl From<CountRegression> for SyncWarning {
    fn from(regression: CountRegression) -> Self {
        SyncWarning::CountRegression {
            previous: regression.previous,
            current: regression.current,
        }
    }
}

impl From<&FetchFailure> for SyncWarning {
    fn from(failure: &FetchFailure) -> Self {
        SyncWarning::FetchFailed {
            id: failure.id,
            viewer_state: failure.viewer.is_some(),
            reason: failure.error.to_string(),
            retained: failure.retained,
        }
    }
}

/// Result of an explicit refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refresh<R, V> {
    pub snapshot: Snapshot<R, V>,
    pub warnings: Vec<SyncWarning>,
}

/// Refresh result for a given source.
pub type SourceRefresh<S> = Refresh<<S as RecordSource>::Record, <S as RecordSource>::Viewer>;

struct CachedSnapshot<S: RecordSource> {
    snapshot: SourceSnapshot<S>,
    generation: u64,
}

struct Inner<S: RecordSource, D> {
    aggregator: Aggregator<S>,
    dispatcher: D,
    latest: Mutex<Option<CachedSnapshot<S>>>,
    refreshing: AtomicBool,
}

/// Keeps one record list in sync with its source and routes actions to the dispatcher.
///
/// Cloning is cheap; clones share the cache and the last snapshot.
pub struct Synchronizer<S: RecordSource, D> {
    inner: Arc<Inner<S, D>>,
}

impl<S: RecordSource, D> Clone for Synchronizer<S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, D> Synchronizer<S, D>
where
    S: RecordSource + 'static,
    D: MutationDispatcher + 'static,
{
    pub fn new(aggregator: Aggregator<S>, dispatcher: D) -> Self {
        Self {
            inner: Arc::new(Inner {
                aggregator,
                dispatcher,
                latest: Mutex::new(None),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub fn aggregator(&self) -> &Aggregator<S> {
        &self.inner.aggregator
    }

    pub fn dispatcher(&self) -> &D {
        &self.inner.dispatcher
    }

    pub fn viewer(&self) -> Result<Option<Address>, SyncError> {
        self.inner.aggregator.viewer()
    }

    /// Switch the connected account. The next `get_snapshot` fetches its viewer state.
    pub fn set_viewer(&self, viewer: Option<Address>) -> Result<(), SyncError> {
        self.inner.aggregator.set_viewer(viewer)
    }

    /// The last materialized snapshot, without touching the source.
    pub fn latest(&self) -> Result<Option<SourceSnapshot<S>>, SyncError> {
        let latest = self.inner.lock_latest()?;
        Ok(latest.as_ref().map(|cached| cached.snapshot.clone()))
    }

    /// Return the current snapshot.
    ///
    /// Waits for a refresh when there is no snapshot yet or something was
    /// invalidated since the last one. Otherwise returns the cached snapshot
    /// and, if enabled, refreshes in the background.
    pub async fn get_snapshot(&self) -> Result<SourceSnapshot<S>, SyncError> {
        let generation = self.inner.aggregator.generation();
        let current = self
            .inner
            .lock_latest()?
            .as_ref()
            .filter(|cached| cached.generation == generation)
            .map(|cached| cached.snapshot.clone());

        match current {
            Some(snapshot) => {
                if self.inner.aggregator.config().background_refresh {
                    self.spawn_refresh();
                }
                Ok(snapshot)
            }
            None => Ok(self.inner.refresh().await?.snapshot),
        }
    }

    /// Re-read the count and fetch everything missing or stale.
    pub async fn refresh(&self) -> Result<SourceRefresh<S>, SyncError> {
        self.inner.refresh().await
    }

    fn spawn_refresh(&self) {
        if self.inner.refreshing.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.refresh().await {
                warn!(error = %e, "background refresh failed");
            }
            inner.refreshing.store(false, Ordering::SeqCst);
        });
    }

    /// Validate and submit an action, then invalidate what it affected.
    ///
    /// The submit is sent from the current viewer. A dispatcher error is
    /// returned unchanged and leaves the cache untouched.
    pub async fn act<A>(&self, action: &A) -> Result<Receipt, ActError>
    where
        A: Action + ?Sized,
    {
        action.validate()?;

        let viewer = self.viewer()?;
        let mut call = action.to_call();
        call.from = viewer.clone();

        let limit = self.inner.aggregator.config().submit_timeout();
        let submitted = match tokio::time::timeout(limit, self.inner.dispatcher.submit(&call)).await {
            Ok(result) => result,
            Err(_) => Err(MutationError::Timeout(limit)),
        };
        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!(
                    function = action.function(),
                    reason = %error,
                    "mutation rejected"
                );
                return Err(ActError::Mutation(error));
            }
        };

        let mut invalidated = 0;
        for effect in action.effects() {
            match effect {
                Effect::Record(id) => {
                    self.inner.aggregator.invalidate(id, None)?;
                    invalidated += 1;
                }
                Effect::ViewerState(id) => {
                    if let Some(viewer) = &viewer {
                        self.inner.aggregator.invalidate_viewer_state(id, viewer)?;
                        invalidated += 1;
                    }
                }
                Effect::NewRecord => {
                    self.inner.aggregator.invalidate_count()?;
                    invalidated += 1;
                }
            }
        }

        info!(
            function = action.function(),
            tx_hash = receipt.tx_hash.as_str(),
            invalidated,
            "mutation confirmed"
        );
        #[cfg(feature = "emitter")]
        if let Some(events) = self.inner.aggregator.events() {
            events.emit(
                events::MUTATION_CONFIRMED,
                events::MutationConfirmed {
                    function: receipt.function.clone(),
                    tx_hash: receipt.tx_hash.clone(),
                    invalidated,
                },
            );
        }

        Ok(receipt)
    }
}

impl<S: RecordSource, D> Inner<S, D> {
    fn lock_latest(&self) -> Result<MutexGuard<'_, Option<CachedSnapshot<S>>>, CacheError> {
        self.latest
            .lock()
            .map_err(|_| CacheError::LockPoisoned("latest snapshot"))
    }

    async fn refresh(&self) -> Result<SourceRefresh<S>, SyncError> {
        let count = self.aggregator.refresh_count().await?;
        // Taken after the count read, whose growth bumps the generation itself.
        let generation = self.aggregator.generation();
        let (snapshot, report) = self.aggregator.fetch_all_reported().await?;

        let mut warnings: Vec<SyncWarning> = Some(&count)
            .into_iter()
            .chain(report.count_refresh.as_ref())
            .filter_map(|refresh: &CountRefresh| refresh.regression)
            .map(SyncWarning::from)
            .collect();
        warnings.extend(report.failures.iter().map(SyncWarning::from));

        self.store(&snapshot, generation)?;
        debug!(
            entries = snapshot.len(),
            warnings = warnings.len(),
            generation,
            "refresh complete"
        );
        Ok(Refresh { snapshot, warnings })
    }

    /// Keep `snapshot` unless a refresh that started later already stored one.
    fn store(&self, snapshot: &SourceSnapshot<S>, generation: u64) -> Result<(), CacheError> {
        let mut latest = self.lock_latest()?;
        let newer_stored = latest
            .as_ref()
            .is_some_and(|cached| cached.generation > generation);
        if !newer_stored {
            *latest = Some(CachedSnapshot {
                snapshot: snapshot.clone(),
                generation,
            });
        }
        Ok(())
    }
}

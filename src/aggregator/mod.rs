//! Aggregator - turns a record count plus per-ID reads into an ordered list.
//!
//! A refresh reads the count, works out which IDs are missing or stale, and
//! fetches them concurrently with a bounded fan-out. Each per-ID result is
//! committed to the cache as soon as it arrives, so a refresh dropped part
//! way through keeps whatever it already fetched.
//!
//! ## Example
//!
//! ```ignore
//! let aggregator = Aggregator::new(source).with_config(config);
//! aggregator.set_viewer(Some(alice))?;
//!
//! let snapshot = aggregator.fetch_all().await?;
//! aggregator.invalidate(3, None)?;
//! let snapshot = aggregator.fetch_all().await?; // re-reads record 3 only
//! ```

mod snapshot;

use std::future::Future;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
#[cfg(feature = "emitter")]
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheError, RecordCache};
use crate::config::SyncConfig;
use crate::error::SyncError;
#[cfg(feature = "emitter")]
use crate::events::{self, SyncEvents};
use crate::record::{Address, Record, RecordId};
use crate::source::{RecordSource, SourceError};

pub use snapshot::{EntryStatus, Snapshot, SnapshotEntry};

/// Snapshot type produced for a given source.
pub type SourceSnapshot<S> = Snapshot<<S as RecordSource>::Record, <S as RecordSource>::Viewer>;

/// The source reported fewer records than it did before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRegression {
    pub previous: u64,
    pub current: u64,
}

/// Outcome of a count read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRefresh {
    pub count: u64,
    pub previous: Option<u64>,
    /// IDs that became visible with this read.
    pub revealed: Range<RecordId>,
    pub regression: Option<CountRegression>,
}

/// A per-ID read that failed during a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub id: RecordId,
    /// Set when the failed read was the viewer-state read.
    pub viewer: Option<Address>,
    pub error: SourceError,
    /// An earlier value is still cached and shown.
    pub retained: bool,
}

/// What a single `fetch_all` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub count_refresh: Option<CountRefresh>,
    pub records_fetched: Vec<RecordId>,
    pub viewer_states_fetched: Vec<RecordId>,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug, Default)]
struct CountState {
    observed: Option<u64>,
    dirty: bool,
}

#[derive(Debug, Clone, Copy)]
struct FetchJob {
    id: RecordId,
    record: bool,
    viewer_state: bool,
}

#[derive(Debug, Default)]
struct JobOutcome {
    record_fetched: Option<RecordId>,
    viewer_state_fetched: Option<RecordId>,
    failures: Vec<FetchFailure>,
}

/// Maintains the cached list for one record source.
pub struct Aggregator<S: RecordSource> {
    source: S,
    cache: RecordCache<S::Record, S::Viewer>,
    count: Mutex<CountState>,
    viewer: RwLock<Option<Address>>,
    generation: AtomicU64,
    config: SyncConfig,
    #[cfg(feature = "emitter")]
    events: Option<Arc<SyncEvents>>,
}

impl<S: RecordSource> Aggregator<S> {
    const COLLECTION: &'static str = <S::Record as Record>::COLLECTION;

    pub fn new(source: S) -> Self {
        Aggregator {
            source,
            cache: RecordCache::new(),
            count: Mutex::new(CountState::default()),
            viewer: RwLock::new(None),
            generation: AtomicU64::new(0),
            config: SyncConfig::default(),
            #[cfg(feature = "emitter")]
            events: None,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[cfg(feature = "emitter")]
    pub fn with_events(mut self, events: Arc<SyncEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &RecordCache<S::Record, S::Viewer> {
        &self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[cfg(feature = "emitter")]
    pub(crate) fn events(&self) -> Option<&Arc<SyncEvents>> {
        self.events.as_ref()
    }

    /// Bumped whenever cached state changes in a way that outdates earlier
    /// snapshots: invalidations, viewer switches and count changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn viewer(&self) -> Result<Option<Address>, SyncError> {
        let viewer = self
            .viewer
            .read()
            .map_err(|_| CacheError::LockPoisoned("viewer read"))?;
        Ok(viewer.clone())
    }

    /// Switch the account whose viewer state is fetched.
    ///
    /// Viewer state cached for other accounts is kept, so switching back
    /// does not re-read it.
    pub fn set_viewer(&self, viewer: Option<Address>) -> Result<(), SyncError> {
        let mut current = self
            .viewer
            .write()
            .map_err(|_| CacheError::LockPoisoned("viewer write"))?;
        if *current != viewer {
            let label = viewer.as_ref().map(Address::short).unwrap_or_default();
            debug!(
                collection = Self::COLLECTION,
                viewer = %label,
                "viewer changed"
            );
            *current = viewer;
            self.bump_generation();
        }
        Ok(())
    }

    fn lock_count(&self) -> Result<MutexGuard<'_, CountState>, CacheError> {
        self.count
            .lock()
            .map_err(|_| CacheError::LockPoisoned("record count"))
    }

    /// The last count read from the source, if any.
    pub fn observed_count(&self) -> Result<Option<u64>, SyncError> {
        Ok(self.lock_count()?.observed)
    }

    fn count_needs_refresh(&self) -> Result<bool, CacheError> {
        let state = self.lock_count()?;
        Ok(state.observed.is_none() || state.dirty)
    }

    async fn timed<T, F>(&self, read: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let limit = self.config.fetch_timeout();
        match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(limit)),
        }
    }

    /// Read the record count from the source.
    ///
    /// A count below the previous one means the source was reset. The cache
    /// is truncated to the new count and the regression is reported.
    pub async fn refresh_count(&self) -> Result<CountRefresh, SyncError> {
        let count = self
            .timed(self.source.get_count())
            .await
            .map_err(SyncError::Count)?;

        let previous = {
            let mut state = self.lock_count()?;
            let previous = state.observed;
            state.observed = Some(count);
            state.dirty = false;
            previous
        };

        let mut refresh = CountRefresh {
            count,
            previous,
            revealed: count..count,
            regression: None,
        };

        match previous {
            None => {
                refresh.revealed = 0..count;
                debug!(
                    collection = Self::COLLECTION,
                    count,
                    "record count observed"
                );
            }
            Some(previous) if count > previous => {
                refresh.revealed = previous..count;
                self.bump_generation();
                debug!(
                    collection = Self::COLLECTION,
                    from = previous,
                    to = count,
                    "new records revealed"
                );
            }
            Some(previous) if count < previous => {
                let dropped = self.cache.truncate(count)?;
                self.bump_generation();
                warn!(
                    collection = Self::COLLECTION,
                    previous,
                    current = count,
                    dropped,
                    "record count went backwards, truncating cache"
                );
                #[cfg(feature = "emitter")]
                if let Some(events) = &self.events {
                    events.emit(
                        events::COUNT_REGRESSED,
                        events::CountRegressed {
                            collection: Self::COLLECTION.to_string(),
                            previous,
                            current: count,
                        },
                    );
                }
                refresh.regression = Some(CountRegression {
                    previous,
                    current: count,
                });
            }
            Some(_) => {}
        }

        Ok(refresh)
    }

    /// Mark a record stale, and with `viewer` set, that viewer's state for it too.
    ///
    /// Only the named record is touched. The next `fetch_all` re-reads it.
    pub fn invalidate(&self, id: RecordId, viewer: Option<&Address>) -> Result<(), SyncError> {
        self.cache.mark_stale(id)?;
        if let Some(viewer) = viewer {
            self.cache.mark_viewer_stale(id, viewer)?;
        }
        self.bump_generation();
        debug!(
            collection = Self::COLLECTION,
            id,
            viewer_state = viewer.is_some(),
            "entry invalidated"
        );
        Ok(())
    }

    /// Mark only `viewer`'s state for a record stale. The record itself is kept.
    pub fn invalidate_viewer_state(&self, id: RecordId, viewer: &Address) -> Result<(), SyncError> {
        self.cache.mark_viewer_stale(id, viewer)?;
        self.bump_generation();
        debug!(
            collection = Self::COLLECTION,
            id,
            viewer = %viewer,
            "viewer state invalidated"
        );
        Ok(())
    }

    /// Force the next `fetch_all` to re-read the count.
    pub fn invalidate_count(&self) -> Result<(), SyncError> {
        self.lock_count()?.dirty = true;
        self.bump_generation();
        debug!(
            collection = Self::COLLECTION,
            "record count invalidated"
        );
        Ok(())
    }

    /// Bring the cache up to date and return the resulting snapshot.
    pub async fn fetch_all(&self) -> Result<SourceSnapshot<S>, SyncError> {
        let (snapshot, _) = self.fetch_all_reported().await?;
        Ok(snapshot)
    }

    /// Like `fetch_all`, also returning what was fetched and what failed.
    ///
    /// The count is re-read only when it was never read or was invalidated.
    /// Records are fetched when missing or stale, viewer state likewise for
    /// the current viewer. Per-ID failures do not fail the refresh.
    pub async fn fetch_all_reported(&self) -> Result<(SourceSnapshot<S>, FetchReport), SyncError> {
        let mut report = FetchReport::default();
        if self.count_needs_refresh()? {
            report.count_refresh = Some(self.refresh_count().await?);
        }

        let count = self.observed_count()?.unwrap_or(0);
        let viewer = self.viewer()?;

        let mut jobs = Vec::new();
        for id in 0..count {
            let record = self.cache.needs_fetch(id)?;
            let viewer_state = match &viewer {
                Some(viewer) => self.cache.viewer_needs_fetch(id, viewer)?,
                None => false,
            };
            if record || viewer_state {
                jobs.push(FetchJob {
                    id,
                    record,
                    viewer_state,
                });
            }
        }

        if !jobs.is_empty() {
            debug!(
                collection = Self::COLLECTION,
                count,
                fetching = jobs.len(),
                "fetching records"
            );
        }

        let width = self.config.max_concurrent_fetches.max(1);
        let fetches: Vec<_> = jobs
            .into_iter()
            .map(|job| self.run_job(job, viewer.as_ref()))
            .collect();
        let outcomes: Vec<Result<JobOutcome, CacheError>> = stream::iter(fetches)
            .buffer_unordered(width)
            .collect()
            .await;

        for outcome in outcomes {
            let outcome = outcome?;
            report.records_fetched.extend(outcome.record_fetched);
            report.viewer_states_fetched.extend(outcome.viewer_state_fetched);
            report.failures.extend(outcome.failures);
        }
        report.records_fetched.sort_unstable();
        report.viewer_states_fetched.sort_unstable();
        report.failures.sort_by_key(|failure| failure.id);

        Ok((self.snapshot()?, report))
    }

    async fn run_job(&self, job: FetchJob, viewer: Option<&Address>) -> Result<JobOutcome, CacheError> {
        let record = async {
            if !job.record {
                return Ok(None);
            }
            self.fetch_record(job.id).await.map(Some)
        };
        let viewer_state = async {
            match viewer {
                Some(viewer) if job.viewer_state => {
                    self.fetch_viewer_state(job.id, viewer).await.map(Some)
                }
                _ => Ok(None),
            }
        };
        let (record, viewer_state) = futures::join!(record, viewer_state);

        let mut outcome = JobOutcome::default();
        match record? {
            Some(Ok(())) => outcome.record_fetched = Some(job.id),
            Some(Err(failure)) => outcome.failures.push(failure),
            None => {}
        }
        match viewer_state? {
            Some(Ok(())) => outcome.viewer_state_fetched = Some(job.id),
            Some(Err(failure)) => outcome.failures.push(failure),
            None => {}
        }
        Ok(outcome)
    }

    async fn fetch_record(&self, id: RecordId) -> Result<Result<(), FetchFailure>, CacheError> {
        let ticket = self.cache.begin_fetch(id)?;
        let result = self
            .timed(self.source.get_record(id))
            .await
            .and_then(|record| {
                if record.id() == id {
                    Ok(record)
                } else {
                    Err(SourceError::Decode(format!(
                        "asked for record {}, got record {}",
                        id,
                        record.id()
                    )))
                }
            });

        match result {
            Ok(record) => {
                let version = self.cache.commit(id, record, ticket)?;
                debug!(
                    collection = Self::COLLECTION,
                    id,
                    version,
                    "record committed"
                );
                Ok(Ok(()))
            }
            Err(error) => {
                let retained = self.cache.fail(id)?;
                Ok(Err(self.report_failure(id, None, error, retained)))
            }
        }
    }

    async fn fetch_viewer_state(
        &self,
        id: RecordId,
        viewer: &Address,
    ) -> Result<Result<(), FetchFailure>, CacheError> {
        let ticket = self.cache.begin_viewer_fetch(id, viewer)?;
        match self.timed(self.source.get_viewer_state(id, viewer)).await {
            Ok(state) => {
                self.cache.commit_viewer_state(id, viewer, state, ticket)?;
                Ok(Ok(()))
            }
            Err(error) => {
                let retained = self.cache.fail_viewer_state(id, viewer)?;
                Ok(Err(self.report_failure(id, Some(viewer), error, retained)))
            }
        }
    }

    fn report_failure(
        &self,
        id: RecordId,
        viewer: Option<&Address>,
        error: SourceError,
        retained: bool,
    ) -> FetchFailure {
        warn!(
            collection = Self::COLLECTION,
            id,
            viewer_state = viewer.is_some(),
            retained,
            error = %error,
            "fetch failed"
        );
        #[cfg(feature = "emitter")]
        if let Some(events) = &self.events {
            events.emit(
                events::FETCH_FAILED,
                events::FetchFailed {
                    collection: Self::COLLECTION.to_string(),
                    id,
                    viewer_state: viewer.is_some(),
                    reason: error.to_string(),
                    retained,
                },
            );
        }
        FetchFailure {
            id,
            viewer: viewer.cloned(),
            error,
            retained,
        }
    }

    /// Materialize a snapshot from the cache without reading the source.
    pub fn snapshot(&self) -> Result<SourceSnapshot<S>, SyncError> {
        let count = self.observed_count()?.unwrap_or(0);
        let viewer = self.viewer()?;
        let mut snapshot = Snapshot::empty(viewer);
        snapshot.count = count;

        for id in 0..count {
            let Some(record) = self.cache.entry(id)? else {
                snapshot.unavailable.push(id);
                continue;
            };
            let viewer_state = match &snapshot.viewer {
                Some(viewer) => self.cache.viewer_entry(id, viewer)?,
                None => None,
            };
            let viewer_unavailable = match &snapshot.viewer {
                Some(viewer) if viewer_state.is_none() => {
                    self.cache.viewer_fetch_failed(id, viewer)?
                }
                _ => false,
            };
            let failed = record.fetch_failed
                || viewer_state.as_ref().is_some_and(|state| state.fetch_failed);
            let status = if viewer_unavailable {
                EntryStatus::ViewerStateUnavailable
            } else if failed {
                EntryStatus::FetchFailed
            } else {
                EntryStatus::Fresh
            };
            snapshot.entries.push(SnapshotEntry {
                id,
                record: record.value,
                viewer_state: viewer_state.map(|state| state.value),
                status,
            });
        }

        debug!(
            collection = Self::COLLECTION,
            count,
            entries = snapshot.entries.len(),
            unavailable = snapshot.unavailable.len(),
            "snapshot materialized"
        );
        Ok(snapshot)
    }
}

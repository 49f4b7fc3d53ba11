use std::fmt;

use crate::cache::CacheError;
use crate::mutation::{MutationError, ValidationError};
use crate::source::SourceError;

/// Error type for a refresh cycle.
///
/// Per-ID fetch failures are not errors here: they are reported in the
/// `FetchReport` and flagged in the `Snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Cache(CacheError),
    /// The record count could not be read.
    Count(SourceError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Cache(e) => write!(f, "cache error: {}", e),
            SyncError::Count(e) => write!(f, "could not read record count: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Cache(e) => Some(e),
            SyncError::Count(e) => Some(e),
        }
    }
}

impl From<CacheError> for SyncError {
    fn from(err: CacheError) -> Self {
        SyncError::Cache(err)
    }
}

/// Error type for `Synchronizer::act`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActError {
    /// The payload failed client-side validation; nothing was submitted.
    Invalid(ValidationError),
    /// The dispatcher's error, unchanged. The cache was not touched.
    Mutation(MutationError),
    /// The submit succeeded but invalidating the cache failed.
    Sync(SyncError),
}

impl fmt::Display for ActError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActError::Invalid(e) => write!(f, "{}", e),
            ActError::Mutation(e) => write!(f, "{}", e),
            ActError::Sync(e) => write!(f, "submitted, but {}", e),
        }
    }
}

impl std::error::Error for ActError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActError::Invalid(e) => Some(e),
            ActError::Mutation(e) => Some(e),
            ActError::Sync(e) => Some(e),
        }
    }
}

impl From<ValidationError> for ActError {
    fn from(err: ValidationError) -> Self {
        ActError::Invalid(err)
    }
}

impl From<MutationError> for ActError {
    fn from(err: MutationError) -> Self {
        ActError::Mutation(err)
    }
}

impl From<SyncError> for ActError {
    fn from(err: SyncError) -> Self {
        ActError::Sync(err)
    }
}

impl SyncError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SyncError::Cache(_) => 500,
            SyncError::Count(_) => 503,
        }
    }
}

impl ActError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ActError::Invalid(_) => 400,
            ActError::Mutation(MutationError::Rejected { .. }) => 409,
            ActError::Mutation(MutationError::UnknownFunction(_)) => 404,
            ActError::Mutation(MutationError::Timeout(_)) => 504,
            ActError::Sync(e) => e.status_code(),
        }
    }
}

//! Synchronizer configuration.
//!
//! Defaults suit a public RPC endpoint. Values can be set in code with the
//! `with_*` builders or loaded from JSON:
//!
//! ```json
//! { "fetch_timeout_ms": 5000, "max_concurrent_fetches": 8 }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts and fan-out limits for a `Synchronizer` and its `Aggregator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for each source read (`get_count`, `get_record`, `get_viewer_state`).
    pub fetch_timeout_ms: u64,
    /// Deadline for each mutation submit.
    pub submit_timeout_ms: u64,
    /// Maximum per-ID fetches in flight during one `fetch_all`.
    pub max_concurrent_fetches: usize,
    /// Whether `get_snapshot` spawns a refresh after answering from cache.
    pub background_refresh: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            fetch_timeout_ms: 10_000,
            submit_timeout_ms: 60_000,
            max_concurrent_fetches: 16,
            background_refresh: true,
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "could not parse sync config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid sync config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SyncConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be positive"));
        }
        if self.submit_timeout_ms == 0 {
            return Err(ConfigError::Invalid("submit_timeout_ms must be positive"));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid("max_concurrent_fetches must be at least 1"));
        }
        Ok(())
    }

    /// Set the per-read deadline.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the submit deadline.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the fan-out width of `fetch_all`. Zero is raised to one.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Enable or disable the refresh spawned by `get_snapshot`.
    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

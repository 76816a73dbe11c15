//! Monitor tuning
//!
//! Settings load from an optional TOML file; any key left out takes its
//! default.

use crate::{DEFAULT_DATABASE, MonitorError, MonitorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Requests running longer than this are reported
    pub long_running_threshold_secs: u64,
    /// Pause between sweeps in polling mode
    pub refresh_interval_secs: u64,
    /// Database every session scope returns to
    pub default_database: String,
    /// Concurrent connections for per-database scans (1 = sequential)
    pub parallel_workers: usize,
    /// Number of cached statements whose plans are analyzed
    pub expensive_query_limit: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            long_running_threshold_secs: 30,
            refresh_interval_secs: 60,
            default_database: DEFAULT_DATABASE.to_string(),
            parallel_workers: 1,
            expensive_query_limit: 10,
        }
    }
}

impl MonitorSettings {
    /// Loads settings from `path`, or defaults if the file does not exist
    pub fn load(path: &Path) -> MonitorResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Settings(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates settings from TOML text
    pub fn from_toml_str(content: &str) -> MonitorResult<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| MonitorError::Settings(e.to_string()))?;
        settings.validate()
    }

    /// Rejects values the monitor cannot run with
    pub fn validate(self) -> MonitorResult<Self> {
        if self.refresh_interval_secs == 0 {
            return Err(MonitorError::Settings(
                "refresh_interval_secs must be at least 1".into(),
            ));
        }
        if self.parallel_workers == 0 {
            return Err(MonitorError::Settings(
                "parallel_workers must be at least 1".into(),
            ));
        }
        if self.expensive_query_limit == 0 {
            return Err(MonitorError::Settings(
                "expensive_query_limit must be at least 1".into(),
            ));
        }
        if self.default_database.trim().is_empty() {
            return Err(MonitorError::Settings(
                "default_database must not be empty".into(),
            ));
        }
        Ok(self)
    }

    /// Builder method: set the long-running threshold
    pub fn with_long_running_threshold_secs(mut self, secs: u64) -> Self {
        self.long_running_threshold_secs = secs;
        self
    }

    /// Builder method: set the number of parallel workers
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    /// Builder method: set the default database
    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = database.into();
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn long_running_threshold(&self) -> Duration {
        Duration::from_secs(self.long_running_threshold_secs)
    }
}

#[cfg(test)]
mod tests;

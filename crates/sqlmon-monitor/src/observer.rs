//! Scan event sink

use crate::ScanError;
use sqlmon_core::SqlmonError;

/// Receives progress events from scanners and session guards
///
/// Every method has an empty default so implementors only override what
/// they care about.
pub trait ScanObserver: Send + Sync {
    /// A scan over `databases` databases is starting
    fn scan_started(&self, _databases: usize) {}

    /// The query is about to run in `database`
    fn database_started(&self, _database: &str) {}

    /// The query returned `rows` rows in `database`
    fn database_succeeded(&self, _database: &str, _rows: usize) {}

    /// The query failed in one database; the scan continues
    fn database_failed(&self, _error: &ScanError) {}

    /// Switching back to the default database after `database` failed
    fn restore_failed(&self, _database: &str, _error: &SqlmonError) {}

    /// The scan stopped early with `remaining` databases unvisited
    fn scan_cancelled(&self, _remaining: usize) {}

    /// The scan finished
    fn scan_finished(&self, _rows: usize, _errors: usize) {}
}

/// Default observer that logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn scan_started(&self, databases: usize) {
        tracing::debug!(databases, "scan started");
    }

    fn database_started(&self, database: &str) {
        tracing::trace!(database, "scanning database");
    }

    fn database_succeeded(&self, database: &str, rows: usize) {
        tracing::debug!(database, rows, "database scanned");
    }

    fn database_failed(&self, error: &ScanError) {
        tracing::error!(database = %error.database, error = %error.message, "database scan failed");
    }

    fn restore_failed(&self, database: &str, error: &SqlmonError) {
        tracing::error!(database, error = %error, "failed to switch back to the default database");
    }

    fn scan_cancelled(&self, remaining: usize) {
        tracing::warn!(remaining, "scan cancelled");
    }

    fn scan_finished(&self, rows: usize, errors: usize) {
        tracing::info!(rows, errors, "scan finished");
    }
}

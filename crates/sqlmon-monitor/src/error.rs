//! Monitor error types

use sqlmon_core::SqlmonError;
use thiserror::Error;

/// Errors that abort a monitor operation
///
/// Failures inside one database never show up here; they are recorded as
/// [`crate::ScanError`]s on the scan outcome instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to enumerate databases: {0}")]
    DatabaseEnumeration(#[source] SqlmonError),

    #[error(transparent)]
    Connection(#[from] SqlmonError),

    #[error("{query} takes {expected} parameter(s), got {actual}")]
    ParameterCount {
        query: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid monitor settings: {0}")]
    Settings(String),
}

/// Result type alias for monitor operations
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

//! Error types for sqlmon

use thiserror::Error;

/// Core error type for connection-level operations
#[derive(Error, Debug)]
pub enum SqlmonError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type alias for sqlmon operations
pub type Result<T> = std::result::Result<T, SqlmonError>;

#[cfg(test)]
mod tests;

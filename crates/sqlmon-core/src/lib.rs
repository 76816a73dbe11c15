//! sqlmon core - shared abstractions for the SQL Server monitor
//!
//! This crate provides the fundamental traits and types that the other
//! sqlmon crates depend on. It defines:
//!
//! - `Connection` - Trait for a live database connection
//! - `ConnectionFactory` - Trait for opening fresh connections
//! - `ConnectionConfig` - Host, credentials and driver parameters
//! - Common types like `Value`, `Row`, `ColumnMeta` and `QueryResult`

mod config;
mod connection;
mod error;
mod types;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use types::*;

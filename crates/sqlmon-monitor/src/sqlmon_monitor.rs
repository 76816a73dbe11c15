//! sqlmon monitor - cross-database diagnostic sweeps
//!
//! This crate provides:
//! - A session guard that always returns a connection to its default database
//! - Sequential and parallel per-database scanners with partial-failure results
//! - Built-in SQL Server diagnostics with typed rows
//! - The `ServerMonitor` facade that runs one full sweep

pub mod diagnostics;
mod error;
mod monitor;
mod observer;
mod parallel;
mod row;
mod scan;
mod session;
mod settings;

#[cfg(test)]
mod mock;

pub use error::*;
pub use monitor::*;
pub use observer::*;
pub use parallel::*;
pub use row::*;
pub use scan::*;
pub use session::*;
pub use settings::*;

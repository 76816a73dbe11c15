//! SQL Server connection for sqlmon
//!
//! Implements the `sqlmon_core::Connection` trait on top of tiberius and
//! provides a `ConnectionFactory` so that scanners can open one connection
//! per worker.

mod connection;
mod factory;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod factory_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
pub use factory::MssqlConnectionFactory;

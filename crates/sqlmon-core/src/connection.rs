//! Connection and connection-factory traits

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A live database connection
///
/// Implementations execute text queries with positional parameters and
/// return rows as ordered, typed tuples. A connection carries session state
/// (such as the current database) that is shared by every caller holding it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that does not return rows (USE, SET, DML)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Factory for opening fresh, independent connections
///
/// Used by components that need one connection per worker.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }
}

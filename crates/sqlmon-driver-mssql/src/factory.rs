//! Connection factory for SQL Server

use crate::connection::MssqlConnection;
use async_trait::async_trait;
use sqlmon_core::{Connection, ConnectionConfig, ConnectionFactory, Result};
use std::sync::Arc;

/// Opens independent SQL Server connections from one configuration
#[derive(Debug, Clone)]
pub struct MssqlConnectionFactory {
    config: ConnectionConfig,
}

impl MssqlConnectionFactory {
    /// Create a factory for the given configuration
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Configuration used for every connection
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a connection and return it with its concrete type
    pub async fn connect(&self) -> Result<MssqlConnection> {
        Ok(MssqlConnection::from_config(&self.config).await?)
    }
}

#[async_trait]
impl ConnectionFactory for MssqlConnectionFactory {
    #[tracing::instrument(skip(self), fields(host = %self.config.host, port = self.config.get_port()))]
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!("opening SQL Server connection");
        let connection = self.connect().await?;
        Ok(Arc::new(connection))
    }
}

//! Tests for the SQL Server connection factory

use crate::factory::MssqlConnectionFactory;
use sqlmon_core::{ConnectionConfig, ConnectionFactory, SqlmonError};

#[test]
fn test_factory_keeps_config() {
    let config = ConnectionConfig::new("db.internal", 0)
        .with_database("master")
        .with_credentials("monitor", "secret");
    let factory = MssqlConnectionFactory::new(config);

    assert_eq!(factory.config().host, "db.internal");
    assert_eq!(factory.config().get_port(), 1433);
    assert_eq!(factory.config().database.as_deref(), Some("master"));
}

#[tokio::test]
async fn test_factory_reports_unreachable_server_as_connection_error() {
    // Port 1 on loopback refuses connections without a network round trip.
    let config = ConnectionConfig::new("127.0.0.1", 1).with_credentials("monitor", "secret");
    let factory = MssqlConnectionFactory::new(config);

    let err = match factory.create().await {
        Ok(_) => panic!("connection to a closed port must fail"),
        Err(err) => err,
    };
    assert!(matches!(err, SqlmonError::Connection(_)), "got {err:?}");
}

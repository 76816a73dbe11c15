//! Tests for the per-database scanner

use super::*;
use crate::mock::{CancellingObserver, MockConnection, RecordingObserver};
use sqlmon_core::{Row, SqlmonError};

fn context(mock: &Arc<MockConnection>) -> SessionContext {
    SessionContext::new(mock.clone(), "master")
}

fn names(databases: &[&str]) -> Vec<String> {
    databases.iter().map(|d| d.to_string()).collect()
}

struct Tagged {
    database: String,
}

impl FromRow for Tagged {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            database: text(row, "database_name")?,
        })
    }
}

struct NeedsMissingColumn;

impl FromRow for NeedsMissingColumn {
    fn from_row(row: &Row) -> Result<Self> {
        text(row, "no_such_column").map(|_| Self)
    }
}

mod enumeration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_list_databases() {
        let mock = Arc::new(MockConnection::new().with_databases(&["Inventory", "Sales"]));
        let dbs = Scanner::new().list_databases(&context(&mock)).await.unwrap();
        assert_eq!(dbs, names(&["Inventory", "Sales"]));
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts_scan() {
        let mock = Arc::new(MockConnection::new().with_enumeration_error("VIEW SERVER STATE denied"));
        let result = Scanner::new()
            .scan::<Row>(&context(&mock), "SELECT 1", &[])
            .await;

        match result {
            Err(MonitorError::DatabaseEnumeration(SqlmonError::Query(msg))) => {
                assert!(msg.contains("VIEW SERVER STATE"));
            }
            other => panic!("expected enumeration error, got {:?}", other.map(|o| o.rows.len())),
        }
        assert!(!mock.statements().iter().any(|s| s == "SELECT 1"));
    }

    #[tokio::test]
    async fn test_enumeration_is_not_cached() {
        let mock = Arc::new(MockConnection::new().with_databases(&["Sales"]));
        let ctx = context(&mock);
        let scanner = Scanner::new();

        scanner.scan::<Row>(&ctx, "SELECT 1", &[]).await.unwrap();
        scanner.scan::<Row>(&ctx, "SELECT 1", &[]).await.unwrap();

        let enumerations = mock
            .statements()
            .iter()
            .filter(|s| s.as_str() == USER_DATABASES_QUERY)
            .count();
        assert_eq!(enumerations, 2);
    }
}

mod scan_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_rows_are_summed_in_database_order() {
        let mock = Arc::new(
            MockConnection::new()
                .with_databases(&["A", "B", "C"])
                .with_rows("A", 2)
                .with_rows("B", 0)
                .with_rows("C", 3),
        );

        let outcome = Scanner::new()
            .scan::<Tagged>(&context(&mock), "SELECT 1", &[])
            .await
            .unwrap();

        let seen: Vec<&str> = outcome.rows.iter().map(|r| r.database.as_str()).collect();
        assert_eq!(seen, vec!["A", "A", "C", "C", "C"]);
        assert_eq!(outcome.databases_scanned, 3);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let mock = Arc::new(
            MockConnection::new()
                .with_databases(&["A", "B", "C"])
                .with_failing_database("B", "Invalid object name 'sys.foo'"),
        );
        let observer = Arc::new(RecordingObserver::default());

        let outcome = Scanner::new()
            .with_observer(observer.clone())
            .scan::<Tagged>(&context(&mock), "SELECT 1", &[])
            .await
            .unwrap();

        let seen: Vec<&str> = outcome.rows.iter().map(|r| r.database.as_str()).collect();
        assert_eq!(seen, vec!["A", "C"]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].database, "B");
        assert!(outcome.errors[0].message.contains("Invalid object name"));
        assert_eq!(mock.current_database(), "master");
        assert_eq!(
            observer.events(),
            vec!["started 3", "ok A 1", "failed B", "ok C 1", "finished 2 1"]
        );
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_rows() {
        let mock = Arc::new(
            MockConnection::new()
                .with_failing_database("A", "denied")
                .with_unreachable_database("B"),
        );

        let outcome: ScanOutcome<Row> = Scanner::new()
            .scan_databases(&context(&mock), &names(&["A", "B"]), "SELECT 1", &[])
            .await;

        assert!(outcome.rows.is_empty());
        let failed: Vec<&str> = outcome.errors.iter().map(|e| e.database.as_str()).collect();
        assert_eq!(failed, vec!["A", "B"]);
        assert_eq!(mock.current_database(), "master");
    }

    #[tokio::test]
    async fn test_decode_failure_is_a_scan_error() {
        let mock = Arc::new(MockConnection::new());

        let outcome: ScanOutcome<NeedsMissingColumn> = Scanner::new()
            .scan_databases(&context(&mock), &names(&["A"]), "SELECT 1", &[])
            .await;

        assert!(outcome.rows.is_empty());
        assert!(outcome.errors[0].message.contains("no_such_column"));
    }

    #[tokio::test]
    async fn test_caller_order_is_kept() {
        let mock = Arc::new(MockConnection::new());

        let outcome: ScanOutcome<Tagged> = Scanner::new()
            .scan_databases(&context(&mock), &names(&["Zeta", "Alpha"]), "SELECT 1", &[])
            .await;

        let seen: Vec<&str> = outcome.rows.iter().map(|r| r.database.as_str()).collect();
        assert_eq!(seen, vec!["Zeta", "Alpha"]);
    }

    #[tokio::test]
    async fn test_empty_database_list() {
        let mock = Arc::new(MockConnection::new());
        let outcome: ScanOutcome<Row> = Scanner::new()
            .scan_databases(&context(&mock), &[], "SELECT 1", &[])
            .await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.databases_scanned, 0);
        assert!(mock.statements().is_empty());
    }

    #[tokio::test]
    async fn test_params_are_forwarded() {
        let mock = Arc::new(MockConnection::new());
        let _: ScanOutcome<Row> = Scanner::new()
            .scan_databases(&context(&mock), &names(&["A"]), "SELECT @P1", &[Value::Int64(30)])
            .await;
        assert!(mock.params().contains(&vec![Value::Int64(30)]));
    }
}

mod cancellation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mock = Arc::new(MockConnection::new());
        let token = CancellationToken::new();
        token.cancel();
        let observer = Arc::new(RecordingObserver::default());

        let outcome: ScanOutcome<Row> = Scanner::new()
            .with_observer(observer.clone())
            .with_cancellation(token)
            .scan_databases(&context(&mock), &names(&["A", "B"]), "SELECT 1", &[])
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.databases_scanned, 0);
        assert!(observer.events().contains(&"cancelled 2".to_string()));
        assert!(outcome.summary().ends_with("(cancelled)"));
    }

    #[tokio::test]
    async fn test_cancelled_between_databases() {
        let mock = Arc::new(MockConnection::new());
        let token = CancellationToken::new();
        let observer = Arc::new(CancellingObserver::after_success(token.clone(), "A"));

        let outcome: ScanOutcome<Tagged> = Scanner::new()
            .with_observer(observer)
            .with_cancellation(token)
            .scan_databases(&context(&mock), &names(&["A", "B", "C"]), "SELECT 1", &[])
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.databases_scanned, 1);
        assert_eq!(outcome.row_count(), 1);
        assert_eq!(outcome.rows[0].database, "A");
        assert!(outcome.errors.is_empty());
        assert_eq!(mock.current_database(), "master");
        assert!(!mock.statements().contains(&"USE [B]".to_string()));
    }
}

mod outcome_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_map_keeps_errors() {
        let outcome = ScanOutcome {
            rows: vec![1, 2],
            errors: vec![ScanError::new("B", "boom")],
            cancelled: false,
            databases_scanned: 2,
        };
        let mapped = outcome.map(|n| n * 10);
        assert_eq!(mapped.rows, vec![10, 20]);
        assert_eq!(mapped.error_count(), 1);
        assert!(!mapped.is_complete());
        assert_eq!(mapped.summary(), "2 rows from 2 databases, 1 failed");
    }

    #[test]
    fn test_scan_error_serializes() {
        let json = serde_json::to_string(&ScanError::new("Sales", "timeout")).unwrap();
        assert_eq!(json, r#"{"database":"Sales","message":"timeout"}"#);
        assert_eq!(ScanError::new("Sales", "timeout").to_string(), "Sales: timeout");
    }
}

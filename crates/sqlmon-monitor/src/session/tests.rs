//! Tests for the session guard

use super::*;
use crate::mock::{MockConnection, RecordingObserver};
use futures::FutureExt;
use pretty_assertions::assert_eq;
use sqlmon_core::SqlmonError;

fn context(mock: &Arc<MockConnection>) -> SessionContext {
    SessionContext::new(mock.clone(), DEFAULT_DATABASE)
}

async fn exploding(_conn: Arc<dyn Connection>) -> Result<()> {
    panic!("diagnostic panicked")
}

#[test]
fn test_quote_identifier() {
    assert_eq!(quote_identifier("Sales"), "[Sales]");
    assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
}

#[tokio::test]
async fn test_restores_default_after_success() {
    let mock = Arc::new(MockConnection::new());
    let ctx = context(&mock);

    let seen = ctx
        .with_database("Sales", |conn| async move {
            let result = conn.query("SELECT 1", &[]).await?;
            Ok(result.rows[0].get_string("database_name"))
        })
        .await
        .unwrap();

    assert_eq!(seen.as_deref(), Some("Sales"));
    assert_eq!(mock.current_database(), "master");
    assert_eq!(ctx.current_database().await, "master");
    assert_eq!(
        mock.statements(),
        vec!["USE [Sales]", "SELECT 1", "USE [master]"]
    );
}

#[tokio::test]
async fn test_restores_default_after_error() {
    let mock = Arc::new(MockConnection::new().with_failing_database("Sales", "permission denied"));
    let ctx = context(&mock);

    let err = ctx
        .with_database("Sales", |conn| async move {
            conn.query("SELECT 1", &[]).await.map(|_| ())
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("permission denied"));
    assert_eq!(mock.current_database(), "master");
}

#[tokio::test]
async fn test_restores_default_after_panic() {
    let mock = Arc::new(MockConnection::new());
    let ctx = context(&mock);

    let outcome = AssertUnwindSafe(ctx.with_database("Sales", exploding))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(mock.current_database(), "master");
    assert_eq!(mock.statements().last().map(String::as_str), Some("USE [master]"));
}

#[tokio::test]
async fn test_failed_switch_is_reported() {
    let mock = Arc::new(MockConnection::new().with_unreachable_database("Offline"));
    let ctx = context(&mock);

    let err = ctx
        .with_database("Offline", |_conn| async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlmonError::Query(_)));
    assert_eq!(mock.current_database(), "master");
}

#[tokio::test]
async fn test_failed_restore_does_not_mask_result() {
    let mock = Arc::new(MockConnection::new().with_restore_failure());
    let observer = Arc::new(RecordingObserver::default());
    let ctx = context(&mock).with_observer(observer.clone());

    let value = ctx
        .with_database("Sales", |_conn| async { Ok(7) })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(observer.events(), vec!["restore failed Sales"]);
    assert_eq!(ctx.current_database().await, "Sales");
}

#[tokio::test]
async fn test_failed_restore_does_not_mask_error() {
    let mock = Arc::new(
        MockConnection::new()
            .with_restore_failure()
            .with_failing_database("Sales", "invalid object name"),
    );
    let ctx = context(&mock);

    let err = ctx
        .with_database("Sales", |conn| async move {
            conn.query("SELECT 1", &[]).await.map(|_| ())
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("invalid object name"));
}

#[tokio::test]
async fn test_default_database_scope_switches_back_first() {
    let mock = Arc::new(MockConnection::new());
    let ctx = SessionContext::new(mock.clone(), "master");
    mock.execute("USE [Sales]", &[]).await.unwrap();
    {
        let mut current = ctx.current.lock().await;
        *current = "Sales".to_string();
    }

    ctx.with_default_database(|_conn| async { Ok(()) })
        .await
        .unwrap();

    assert_eq!(mock.current_database(), "master");
    assert_eq!(ctx.current_database().await, "master");
}

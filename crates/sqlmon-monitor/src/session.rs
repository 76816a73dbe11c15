//! Session guard - scoped database switching on a shared connection
//!
//! A SQL Server connection has one current database. Diagnostics that read
//! per-database catalog views must `USE` each database in turn, and the
//! connection must end up back in its default database no matter how the
//! diagnostic ends.

use crate::{ScanObserver, TracingObserver};
use futures::FutureExt;
use sqlmon_core::{Connection, Result};
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default administrative database
pub const DEFAULT_DATABASE: &str = "master";

/// Quotes a database name as a bracketed identifier
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Owns the "current database" state of one connection
///
/// Scopes opened through [`SessionContext::with_database`] are serialised:
/// two scopes on the same context never interleave their switches.
pub struct SessionContext {
    conn: Arc<dyn Connection>,
    default_database: String,
    current: Mutex<String>,
    observer: Arc<dyn ScanObserver>,
}

impl SessionContext {
    /// Wraps a connection that is currently in `default_database`
    pub fn new(conn: Arc<dyn Connection>, default_database: impl Into<String>) -> Self {
        let default_database = default_database.into();
        Self {
            conn,
            current: Mutex::new(default_database.clone()),
            default_database,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Builder method: set the observer notified of failed restores
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The database every scope returns to
    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    /// The underlying connection
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// The database the connection is believed to be in
    pub async fn current_database(&self) -> String {
        self.current.lock().await.clone()
    }

    /// Runs `operation` with the connection switched to `database`
    ///
    /// The connection is switched back to the default database afterwards
    /// whether the operation succeeds, fails or panics; a panic resumes once
    /// the switch-back has been attempted. A failed switch-back is logged
    /// and reported to the observer but never replaces the operation's own
    /// result.
    #[tracing::instrument(level = "debug", skip(self, operation))]
    pub async fn with_database<T, F, Fut>(&self, database: &str, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut current = self.current.lock().await;

        if let Err(e) = use_database(self.conn.as_ref(), database).await {
            self.restore(&mut current, database).await;
            return Err(e);
        }
        *current = database.to_string();

        let conn = self.conn.clone();
        let outcome = AssertUnwindSafe(async move { operation(conn).await })
            .catch_unwind()
            .await;

        self.restore(&mut current, database).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Runs `operation` in the default database
    ///
    /// Takes the same lock as [`SessionContext::with_database`], so it never
    /// observes another scope's database.
    pub async fn with_default_database<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut current = self.current.lock().await;
        if *current != self.default_database {
            use_database(self.conn.as_ref(), &self.default_database).await?;
            *current = self.default_database.clone();
        }
        operation(self.conn.clone()).await
    }

    async fn restore(&self, current: &mut String, database: &str) {
        match use_database(self.conn.as_ref(), &self.default_database).await {
            Ok(()) => *current = self.default_database.clone(),
            Err(e) => self.observer.restore_failed(database, &e),
        }
    }
}

async fn use_database(conn: &dyn Connection, database: &str) -> Result<()> {
    conn.execute(&format!("USE {}", quote_identifier(database)), &[])
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests;

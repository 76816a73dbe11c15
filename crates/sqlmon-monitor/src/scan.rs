//! Per-database scanner
//!
//! Runs one query in every user database and unions the rows. A failure in
//! one database is recorded against that database and the sweep moves on.

use crate::row::{FromRow, text};
use crate::{MonitorError, MonitorResult, ScanObserver, SessionContext, TracingObserver};
use serde::Serialize;
use sqlmon_core::{Result, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Online, writable, non-system databases
pub const USER_DATABASES_QUERY: &str = "SELECT name FROM sys.databases WHERE database_id > 4 AND state_desc = 'ONLINE' AND is_read_only = 0 ORDER BY name";

/// A failure confined to one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub database: String,
    pub message: String,
}

impl ScanError {
    pub fn new(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.database, self.message)
    }
}

/// Unioned rows of a scan plus the per-database failures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome<R> {
    /// Rows from every database that succeeded, in database order
    pub rows: Vec<R>,
    /// One entry per database that failed
    pub errors: Vec<ScanError>,
    /// True if cancellation stopped the scan before every database was visited
    pub cancelled: bool,
    /// Number of databases the query was attempted in
    pub databases_scanned: usize,
}

impl<R> Default for ScanOutcome<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            databases_scanned: 0,
        }
    }
}

impl<R> ScanOutcome<R> {
    /// Number of rows collected
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of databases that failed
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// True if every database was visited and none failed
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }

    /// Converts every row, keeping errors and counters
    pub fn map<U>(self, f: impl FnMut(R) -> U) -> ScanOutcome<U> {
        ScanOutcome {
            rows: self.rows.into_iter().map(f).collect(),
            errors: self.errors,
            cancelled: self.cancelled,
            databases_scanned: self.databases_scanned,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} rows from {} databases, {} failed",
            self.rows.len(),
            self.databases_scanned,
            self.errors.len()
        );
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

/// Sequential scanner over one [`SessionContext`]
pub struct Scanner {
    observer: Arc<dyn ScanObserver>,
    cancel: CancellationToken,
}

impl Scanner {
    /// Create a scanner that logs through `tracing` and is never cancelled
    pub fn new() -> Self {
        Self {
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method: set the event observer
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Builder method: set the cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token checked before each database
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Lists the user databases, freshly, from the default database
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_databases(&self, ctx: &SessionContext) -> MonitorResult<Vec<String>> {
        let result = ctx
            .with_default_database(|conn| async move {
                conn.query(USER_DATABASES_QUERY, &[]).await
            })
            .await
            .map_err(MonitorError::DatabaseEnumeration)?;

        result
            .rows
            .iter()
            .map(|row| text(row, "name"))
            .collect::<Result<Vec<_>>>()
            .map_err(MonitorError::DatabaseEnumeration)
    }

    /// Enumerates the user databases and runs `sql` in each
    ///
    /// An enumeration failure aborts the scan; anything after that is
    /// recorded per database.
    #[tracing::instrument(skip(self, ctx, params))]
    pub async fn scan<R: FromRow>(
        &self,
        ctx: &SessionContext,
        sql: &str,
        params: &[Value],
    ) -> MonitorResult<ScanOutcome<R>> {
        let databases = self.list_databases(ctx).await?;
        Ok(self.scan_databases(ctx, &databases, sql, params).await)
    }

    /// Runs `sql` in each of `databases`, in order
    pub async fn scan_databases<R: FromRow>(
        &self,
        ctx: &SessionContext,
        databases: &[String],
        sql: &str,
        params: &[Value],
    ) -> ScanOutcome<R> {
        let mut outcome = ScanOutcome::default();
        self.observer.scan_started(databases.len());

        for (index, database) in databases.iter().enumerate() {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                self.observer.scan_cancelled(databases.len() - index);
                break;
            }

            self.observer.database_started(database);
            outcome.databases_scanned += 1;
            match scan_one::<R>(ctx, database, sql, params).await {
                Ok(rows) => {
                    self.observer.database_succeeded(database, rows.len());
                    outcome.rows.extend(rows);
                }
                Err(e) => {
                    let error = ScanError::new(database.as_str(), e.to_string());
                    self.observer.database_failed(&error);
                    outcome.errors.push(error);
                }
            }
        }

        self.observer
            .scan_finished(outcome.rows.len(), outcome.errors.len());
        outcome
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `sql` in one database and decodes every row
pub(crate) async fn scan_one<R: FromRow>(
    ctx: &SessionContext,
    database: &str,
    sql: &str,
    params: &[Value],
) -> Result<Vec<R>> {
    ctx.with_database(database, |conn| async move {
        let result = conn.query(sql, params).await?;
        result.rows.iter().map(R::from_row).collect()
    })
    .await
}

#[cfg(test)]
mod tests;

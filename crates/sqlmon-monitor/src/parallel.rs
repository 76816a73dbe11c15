//! Parallel per-database scanner
//!
//! Fans a scan out over several connections. Each worker opens its own
//! connection through the factory and owns its own [`SessionContext`], so
//! the current database is never shared between workers. Workers pull the
//! next database from a shared cursor; rows are merged back into the
//! caller's database order.

use crate::row::FromRow;
use crate::scan::scan_one;
use crate::{
    DEFAULT_DATABASE, MonitorError, MonitorResult, ScanError, ScanObserver, ScanOutcome, Scanner,
    SessionContext, TracingObserver,
};
use futures::future::join_all;
use sqlmon_core::{ConnectionFactory, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

type Slot<R> = (usize, Result<Vec<R>, ScanError>);

struct WorkerReport<R> {
    completed: Vec<Slot<R>>,
    connect_error: Option<String>,
}

/// Scanner that runs databases concurrently over independent connections
pub struct ParallelScanner {
    factory: Arc<dyn ConnectionFactory>,
    workers: usize,
    default_database: String,
    observer: Arc<dyn ScanObserver>,
    cancel: CancellationToken,
}

impl ParallelScanner {
    /// Create a scanner with at most `workers` concurrent connections
    pub fn new(factory: Arc<dyn ConnectionFactory>, workers: usize) -> Self {
        Self {
            factory,
            workers: workers.max(1),
            default_database: DEFAULT_DATABASE.to_string(),
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method: set the database each worker returns to
    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = database.into();
        self
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

    /// Maximum number of concurrent connections
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Enumerates the user databases on a fresh connection, then scans them
    #[tracing::instrument(skip(self, params), fields(workers = self.workers))]
    pub async fn scan<R: FromRow>(&self, sql: &str, params: &[Value]) -> MonitorResult<ScanOutcome<R>> {
        let conn = self
            .factory
            .create()
            .await
            .map_err(MonitorError::DatabaseEnumeration)?;
        let ctx = SessionContext::new(conn, self.default_database.clone())
            .with_observer(self.observer.clone());
        let databases = Scanner::new()
            .with_observer(self.observer.clone())
            .list_databases(&ctx)
            .await;
        close(&ctx).await;

        Ok(self.scan_databases(&databases?, sql, params).await)
    }

    /// Runs `sql` in each of `databases`, merging results in caller order
    pub async fn scan_databases<R: FromRow>(
        &self,
        databases: &[String],
        sql: &str,
        params: &[Value],
    ) -> ScanOutcome<R> {
        self.observer.scan_started(databases.len());

        let cursor = AtomicUsize::new(0);
        let worker_count = self.workers.min(databases.len());
        let reports = join_all(
            (0..worker_count).map(|worker| self.run_worker::<R>(worker, databases, &cursor, sql, params)),
        )
        .await;

        let mut connect_error = None;
        let mut slots: Vec<Slot<R>> = Vec::with_capacity(databases.len());
        for report in reports {
            slots.extend(report.completed);
            if connect_error.is_none() {
                connect_error = report.connect_error;
            }
        }
        slots.sort_by_key(|(index, _)| *index);

        let mut outcome = ScanOutcome::default();
        let mut visited = vec![false; databases.len()];
        for (index, slot) in slots {
            visited[index] = true;
            outcome.databases_scanned += 1;
            match slot {
                Ok(rows) => {
                    self.observer.database_succeeded(&databases[index], rows.len());
                    outcome.rows.extend(rows);
                }
                Err(error) => {
                    self.observer.database_failed(&error);
                    outcome.errors.push(error);
                }
            }
        }

        let remaining = visited.iter().filter(|v| !**v).count();
        if remaining > 0 {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                self.observer.scan_cancelled(remaining);
            } else {
                // Every worker failed to connect.
                let reason = connect_error.unwrap_or_else(|| "no worker available".to_string());
                for (database, _) in databases.iter().zip(&visited).filter(|(_, v)| !**v) {
                    let error = ScanError::new(
                        database.as_str(),
                        format!("No connection available: {}", reason),
                    );
                    self.observer.database_failed(&error);
                    outcome.errors.push(error);
                }
            }
        }

        self.observer
            .scan_finished(outcome.rows.len(), outcome.errors.len());
        outcome
    }

    async fn run_worker<R: FromRow>(
        &self,
        worker: usize,
        databases: &[String],
        cursor: &AtomicUsize,
        sql: &str,
        params: &[Value],
    ) -> WorkerReport<R> {
        let mut report = WorkerReport {
            completed: Vec::new(),
            connect_error: None,
        };

        if self.cancel.is_cancelled() {
            return report;
        }

        let conn = match self.factory.create().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(worker, error = %e, "scan worker could not connect");
                report.connect_error = Some(e.to_string());
                return report;
            }
        };
        let ctx = SessionContext::new(conn, self.default_database.clone())
            .with_observer(self.observer.clone());

        while !self.cancel.is_cancelled() {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(database) = databases.get(index) else {
                break;
            };

            self.observer.database_started(database);
            let slot = scan_one::<R>(&ctx, database, sql, params)
                .await
                .map_err(|e| ScanError::new(database.as_str(), e.to_string()));
            report.completed.push((index, slot));
        }

        close(&ctx).await;
        report
    }
}

async fn close(ctx: &SessionContext) {
    if let Err(e) = ctx.connection().close().await {
        tracing::debug!(error = %e, "failed to close scan connection");
    }
}

//! Server monitor facade
//!
//! Bundles a session, the scanners and the settings, and exposes one method
//! per built-in diagnostic plus [`ServerMonitor::snapshot`] for a full sweep.

use crate::diagnostics::{
    BlockingSession, DatabaseBufferUsage, Deadlock, DiagnosticQuery, DiagnosticScope,
    DuplicateIndex, ExpensiveQuery, FileIoStats, IndexColumn, IndexHealth, IndexUsageVerdict,
    LatencyVerdict, LongRunningQuery, MaintenanceAction, MemoryReport, MissingIndex,
    NetworkConnection, NetworkVerdict, ResourceIntensiveQuery, ResourceVerdict, ServerMemory,
    TableBufferUsage, UnusedIndex, analyze_plan, find_duplicate_indexes, head_blockers,
};
use crate::row::FromRow;
use crate::{
    MonitorError, MonitorResult, MonitorSettings, ParallelScanner, ScanObserver, ScanOutcome,
    Scanner, SessionContext, TracingObserver,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlmon_analyzer::PlanAnalysis;
use sqlmon_core::{Connection, ConnectionFactory, Result, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Result of one snapshot section
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Section<T> {
    /// The diagnostic ran; per-database failures live inside the value
    Completed(T),
    /// The diagnostic itself failed
    Failed(String),
    /// Cancellation arrived before the diagnostic started
    Skipped,
}

/// Status of a [`Section`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Completed,
    Failed,
    Skipped,
}

impl<T> Section<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn status(&self) -> SectionStatus {
        match self {
            Self::Completed(_) => SectionStatus::Completed,
            Self::Failed(_) => SectionStatus::Failed,
            Self::Skipped => SectionStatus::Skipped,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status() == SectionStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status() == SectionStatus::Skipped
    }

    fn describe(&self, completed: impl FnOnce(&T) -> String) -> String {
        match self {
            Self::Completed(value) => completed(value),
            Self::Failed(error) => format!("failed: {}", error),
            Self::Skipped => "skipped (cancelled)".to_string(),
        }
    }
}

/// Every diagnostic of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub taken_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub index_health: Section<ScanOutcome<IndexHealth>>,
    pub unused_indexes: Section<ScanOutcome<UnusedIndex>>,
    pub duplicate_indexes: Section<ScanOutcome<DuplicateIndex>>,
    pub missing_indexes: Section<Vec<MissingIndex>>,
    pub long_running_queries: Section<Vec<LongRunningQuery>>,
    pub blocking_sessions: Section<Vec<BlockingSession>>,
    pub deadlocks: Section<Vec<Deadlock>>,
    pub resource_intensive_queries: Section<Vec<ResourceIntensiveQuery>>,
    pub memory: Section<MemoryReport>,
    pub io_stats: Section<Vec<FileIoStats>>,
    pub network_connections: Section<Vec<NetworkConnection>>,
    pub expensive_queries: Section<Vec<ExpensiveQuery>>,
}

fn describe_outcome<R>(section: &Section<ScanOutcome<R>>) -> String {
    section.describe(ScanOutcome::summary)
}

fn describe_rows<R>(section: &Section<Vec<R>>) -> String {
    section.describe(|rows| format!("{} rows", rows.len()))
}

fn count<T>(rows: &[T], predicate: impl Fn(&T) -> bool) -> usize {
    rows.iter().filter(|row| predicate(row)).count()
}

impl MonitorSnapshot {
    /// One `(section, summary)` pair per section, in sweep order
    pub fn summaries(&self) -> Vec<(&'static str, String)> {
        let memory = self.memory.describe(|report| {
            format!(
                "server {}, {} databases, tables: {}",
                match &report.server {
                    Some(server) if server.is_under_pressure() => "under pressure",
                    Some(_) => "ok",
                    None => "unknown",
                },
                report.databases.len(),
                report.tables.summary()
            )
        });

        vec![
            ("index_health", describe_outcome(&self.index_health)),
            ("unused_indexes", describe_outcome(&self.unused_indexes)),
            ("duplicate_indexes", describe_outcome(&self.duplicate_indexes)),
            ("missing_indexes", describe_rows(&self.missing_indexes)),
            ("long_running_queries", describe_rows(&self.long_running_queries)),
            ("blocking_sessions", describe_rows(&self.blocking_sessions)),
            ("deadlocks", describe_rows(&self.deadlocks)),
            (
                "resource_intensive_queries",
                describe_rows(&self.resource_intensive_queries),
            ),
            ("memory", memory),
            ("io_stats", describe_rows(&self.io_stats)),
            ("network_connections", describe_rows(&self.network_connections)),
            ("expensive_queries", describe_rows(&self.expensive_queries)),
        ]
    }

    /// Findings worth an operator's attention, one line each
    pub fn highlights(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(outcome) = self.index_health.completed() {
            let rebuild = count(&outcome.rows, |i| i.maintenance_action == MaintenanceAction::Rebuild);
            let reorganize = count(&outcome.rows, |i| {
                i.maintenance_action == MaintenanceAction::Reorganize
            });
            if rebuild + reorganize > 0 {
                lines.push(format!(
                    "{} indexes need a rebuild, {} need a reorganize",
                    rebuild, reorganize
                ));
            }
        }
        if let Some(outcome) = self.unused_indexes.completed() {
            let unused = count(&outcome.rows, |i| i.recommendation == IndexUsageVerdict::Unused);
            if unused > 0 {
                lines.push(format!("{} indexes are never read", unused));
            }
        }
        if let Some(outcome) = self.duplicate_indexes.completed() {
            if !outcome.rows.is_empty() {
                lines.push(format!("{} duplicate or overlapping index pairs", outcome.rows.len()));
            }
        }
        if let Some(missing) = self.missing_indexes.completed() {
            if !missing.is_empty() {
                lines.push(format!("{} missing index suggestions", missing.len()));
            }
        }
        if let Some(queries) = self.long_running_queries.completed() {
            if !queries.is_empty() {
                lines.push(format!("{} long-running requests", queries.len()));
            }
        }
        if let Some(sessions) = self.blocking_sessions.completed() {
            let heads = head_blockers(sessions);
            if !heads.is_empty() {
                let heads: Vec<String> = heads.iter().map(|id| id.to_string()).collect();
                lines.push(format!(
                    "{} blocked sessions, head blockers: {}",
                    sessions.len(),
                    heads.join(", ")
                ));
            }
        }
        if let Some(deadlocks) = self.deadlocks.completed() {
            if !deadlocks.is_empty() {
                lines.push(format!("{} recent deadlocks", deadlocks.len()));
            }
        }
        if let Some(queries) = self.resource_intensive_queries.completed() {
            let heavy = count(queries, |q| q.analysis != ResourceVerdict::Normal);
            if heavy > 0 {
                lines.push(format!("{} resource-intensive statements", heavy));
            }
        }
        if let Some(memory) = self.memory.completed() {
            if memory.server.as_ref().is_some_and(ServerMemory::is_under_pressure) {
                lines.push("server reports low memory".to_string());
            }
        }
        if let Some(files) = self.io_stats.completed() {
            let slow = count(files, |f| f.analysis == LatencyVerdict::High);
            if slow > 0 {
                lines.push(format!("{} database files with high latency", slow));
            }
        }
        if let Some(connections) = self.network_connections.completed() {
            let busy = count(connections, |c| c.analysis == NetworkVerdict::High);
            if busy > 0 {
                lines.push(format!("{} connections with high network usage", busy));
            }
        }
        if let Some(queries) = self.expensive_queries.completed() {
            let findings: usize = queries
                .iter()
                .filter(|q| q.analysis.is_available())
                .map(|q| q.analysis.findings.len())
                .sum();
            if findings > 0 {
                lines.push(format!(
                    "{} plan findings across {} expensive statements",
                    findings,
                    queries.len()
                ));
            }
        }

        lines
    }

    fn statuses(&self) -> [SectionStatus; 12] {
        [
            self.index_health.status(),
            self.unused_indexes.status(),
            self.duplicate_indexes.status(),
            self.missing_indexes.status(),
            self.long_running_queries.status(),
            self.blocking_sessions.status(),
            self.deadlocks.status(),
            self.resource_intensive_queries.status(),
            self.memory.status(),
            self.io_stats.status(),
            self.network_connections.status(),
            self.expensive_queries.status(),
        ]
    }

    /// Number of sections whose diagnostic failed
    pub fn failed_sections(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|status| **status == SectionStatus::Failed)
            .count()
    }

    /// Number of sections skipped because the sweep was cancelled
    pub fn skipped_sections(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|status| **status == SectionStatus::Skipped)
            .count()
    }
}

/// Facade over one monitored SQL Server instance
pub struct ServerMonitor {
    session: SessionContext,
    settings: MonitorSettings,
    observer: Arc<dyn ScanObserver>,
    cancel: CancellationToken,
    factory: Option<Arc<dyn ConnectionFactory>>,
}

impl ServerMonitor {
    /// Create a monitor over a connection that is in the default database
    pub fn new(conn: Arc<dyn Connection>, settings: MonitorSettings) -> Self {
        let observer: Arc<dyn ScanObserver> = Arc::new(TracingObserver);
        Self {
            session: SessionContext::new(conn, settings.default_database.clone())
                .with_observer(observer.clone()),
            settings,
            observer,
            cancel: CancellationToken::new(),
            factory: None,
        }
    }

    /// Builder method: set the event observer
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.session = self.session.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    /// Builder method: set the cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builder method: open extra connections for parallel per-database scans
    ///
    /// Only used when `parallel_workers` is greater than one.
    pub fn with_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn scanner(&self) -> Scanner {
        Scanner::new()
            .with_observer(self.observer.clone())
            .with_cancellation(self.cancel.clone())
    }

    fn parallel_scanner(&self) -> Option<ParallelScanner> {
        let factory = self.factory.clone()?;
        (self.settings.parallel_workers > 1).then(|| {
            ParallelScanner::new(factory, self.settings.parallel_workers)
                .with_default_database(self.settings.default_database.clone())
                .with_observer(self.observer.clone())
                .with_cancellation(self.cancel.clone())
        })
    }

    /// Runs an arbitrary query in every user database
    pub async fn scan<R: FromRow>(&self, sql: &str, params: &[Value]) -> MonitorResult<ScanOutcome<R>> {
        match self.parallel_scanner() {
            Some(parallel) => parallel.scan(sql, params).await,
            None => self.scanner().scan(&self.session, sql, params).await,
        }
    }

    /// Runs a server-wide query once from the default database
    pub async fn query<R: FromRow>(&self, sql: &str, params: &[Value]) -> MonitorResult<Vec<R>> {
        let result = self
            .session
            .with_default_database(|conn| async move { conn.query(sql, params).await })
            .await?;
        let rows = result
            .rows
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Lists the online, writable user databases
    pub async fn list_databases(&self) -> MonitorResult<Vec<String>> {
        self.scanner().list_databases(&self.session).await
    }

    /// Runs a built-in diagnostic in the scope it declares
    ///
    /// Per-database diagnostics go through the scanner; server-wide ones run
    /// once from the default database and come back as a single-pass outcome.
    #[tracing::instrument(skip(self, params), fields(diagnostic = %query))]
    pub async fn run<R: FromRow>(
        &self,
        query: DiagnosticQuery,
        params: &[Value],
    ) -> MonitorResult<ScanOutcome<R>> {
        if params.len() != query.parameter_count() {
            return Err(MonitorError::ParameterCount {
                query: query.name(),
                expected: query.parameter_count(),
                actual: params.len(),
            });
        }
        match query.scope() {
            DiagnosticScope::PerDatabase => self.scan(query.sql(), params).await,
            DiagnosticScope::Server => Ok(ScanOutcome {
                rows: self.query(query.sql(), params).await?,
                ..ScanOutcome::default()
            }),
        }
    }

    async fn server_rows<R: FromRow>(
        &self,
        query: DiagnosticQuery,
        params: &[Value],
    ) -> MonitorResult<Vec<R>> {
        Ok(self.run(query, params).await?.rows)
    }

    #[tracing::instrument(skip(self))]
    pub async fn index_health(&self) -> MonitorResult<ScanOutcome<IndexHealth>> {
        self.run(DiagnosticQuery::IndexHealth, &[]).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn unused_indexes(&self) -> MonitorResult<ScanOutcome<UnusedIndex>> {
        self.run(DiagnosticQuery::UnusedIndexes, &[]).await
    }

    /// Reads every index's columns and pairs up duplicates per table
    #[tracing::instrument(skip(self))]
    pub async fn duplicate_indexes(&self) -> MonitorResult<ScanOutcome<DuplicateIndex>> {
        let columns: ScanOutcome<IndexColumn> = self.run(DiagnosticQuery::IndexColumns, &[]).await?;
        Ok(ScanOutcome {
            rows: find_duplicate_indexes(&columns.rows),
            errors: columns.errors,
            cancelled: columns.cancelled,
            databases_scanned: columns.databases_scanned,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn missing_indexes(&self) -> MonitorResult<Vec<MissingIndex>> {
        self.server_rows(DiagnosticQuery::MissingIndexes, &[]).await
    }

    /// Requests running longer than `threshold_secs`
    #[tracing::instrument(skip(self))]
    pub async fn long_running_queries(&self, threshold_secs: u64) -> MonitorResult<Vec<LongRunningQuery>> {
        let threshold = i64::try_from(threshold_secs).unwrap_or(i64::MAX);
        self.server_rows(DiagnosticQuery::LongRunningQueries, &[Value::Int64(threshold)])
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn blocking_sessions(&self) -> MonitorResult<Vec<BlockingSession>> {
        self.server_rows(DiagnosticQuery::BlockingSessions, &[]).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deadlocks(&self) -> MonitorResult<Vec<Deadlock>> {
        self.server_rows(DiagnosticQuery::Deadlocks, &[]).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn resource_intensive_queries(&self) -> MonitorResult<Vec<ResourceIntensiveQuery>> {
        self.server_rows(DiagnosticQuery::ResourceIntensiveQueries, &[]).await
    }

    /// Process memory, per-database buffer pool and per-table buffer pool
    #[tracing::instrument(skip(self))]
    pub async fn memory_usage(&self) -> MonitorResult<MemoryReport> {
        let server = self
            .server_rows::<ServerMemory>(DiagnosticQuery::ServerMemory, &[])
            .await?
            .into_iter()
            .next();
        let databases = self
            .server_rows::<DatabaseBufferUsage>(DiagnosticQuery::DatabaseBufferUsage, &[])
            .await?;
        let tables = self
            .run::<TableBufferUsage>(DiagnosticQuery::TableBufferUsage, &[])
            .await?;
        Ok(MemoryReport {
            server,
            databases,
            tables,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn io_stats(&self) -> MonitorResult<Vec<FileIoStats>> {
        self.server_rows(DiagnosticQuery::FileIoStats, &[]).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn network_connections(&self) -> MonitorResult<Vec<NetworkConnection>> {
        self.server_rows(DiagnosticQuery::NetworkConnections, &[]).await
    }

    /// Estimated plan of `query`, optionally compiled in `database`
    ///
    /// A plan that cannot be decoded comes back as an unavailable analysis,
    /// not as an error.
    #[tracing::instrument(skip(self, query))]
    pub async fn analyze_execution_plan(
        &self,
        query: &str,
        database: Option<&str>,
    ) -> MonitorResult<PlanAnalysis> {
        let analysis = match database {
            Some(database) => {
                self.session
                    .with_database(database, |conn| async move {
                        analyze_plan(conn.as_ref(), query).await
                    })
                    .await?
            }
            None => {
                self.session
                    .with_default_database(|conn| async move {
                        analyze_plan(conn.as_ref(), query).await
                    })
                    .await?
            }
        };
        Ok(analysis)
    }

    /// Most CPU-expensive cached statements with their cached plans analyzed
    #[tracing::instrument(skip(self))]
    pub async fn expensive_queries(&self) -> MonitorResult<Vec<ExpensiveQuery>> {
        let limit = Value::Int64(i64::from(self.settings.expensive_query_limit));
        self.server_rows(DiagnosticQuery::ExpensiveQueries, &[limit]).await
    }

    async fn section<T>(
        &self,
        name: &'static str,
        run: impl Future<Output = MonitorResult<T>>,
    ) -> Section<T> {
        if self.cancel.is_cancelled() {
            return Section::Skipped;
        }
        match run.await {
            Ok(value) => Section::Completed(value),
            Err(e) => {
                tracing::warn!(section = name, error = %e, "diagnostic section failed");
                Section::Failed(e.to_string())
            }
        }
    }

    /// Runs every diagnostic once
    ///
    /// Sections run one after another; a failing section is recorded and the
    /// sweep goes on. Sections not started before cancellation are recorded
    /// as cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self) -> MonitorSnapshot {
        let started = Instant::now();
        let taken_at = Utc::now();
        let threshold = self.settings.long_running_threshold_secs;

        let index_health = self.section("index_health", self.index_health()).await;
        let unused_indexes = self.section("unused_indexes", self.unused_indexes()).await;
        let duplicate_indexes = self
            .section("duplicate_indexes", self.duplicate_indexes())
            .await;
        let missing_indexes = self.section("missing_indexes", self.missing_indexes()).await;
        let long_running_queries = self
            .section("long_running_queries", self.long_running_queries(threshold))
            .await;
        let blocking_sessions = self
            .section("blocking_sessions", self.blocking_sessions())
            .await;
        let deadlocks = self.section("deadlocks", self.deadlocks()).await;
        let resource_intensive_queries = self
            .section("resource_intensive_queries", self.resource_intensive_queries())
            .await;
        let memory = self.section("memory", self.memory_usage()).await;
        let io_stats = self.section("io_stats", self.io_stats()).await;
        let network_connections = self
            .section("network_connections", self.network_connections())
            .await;
        let expensive_queries = self
            .section("expensive_queries", self.expensive_queries())
            .await;

        MonitorSnapshot {
            taken_at,
            elapsed: started.elapsed(),
            index_health,
            unused_indexes,
            duplicate_indexes,
            missing_indexes,
            long_running_queries,
            blocking_sessions,
            deadlocks,
            resource_intensive_queries,
            memory,
            io_stats,
            network_connections,
            expensive_queries,
        }
    }
}

//! Scripted in-memory connection used by the scanner, guard and monitor tests

use crate::{ScanError, ScanObserver, USER_DATABASES_QUERY};
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlmon_core::{
    Connection, ConnectionFactory, QueryResult, Result, SqlmonError, StatementResult, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) const SHOWPLAN_COLUMN: &str = "Microsoft SQL Server 2005 XML Showplan";

#[derive(Default)]
struct MockState {
    current_database: String,
    databases: Vec<String>,
    enumeration_error: Option<String>,
    failing: HashMap<String, String>,
    failing_statements: Vec<(String, String)>,
    unreachable: HashSet<String>,
    restore_fails: bool,
    showplan: bool,
    plan_xml: Option<String>,
    responses: Vec<(String, QueryResult)>,
    rows_per_database: HashMap<String, usize>,
    statements: Vec<String>,
    params: Vec<Vec<Value>>,
}

/// Connection that tracks `USE` and `SET SHOWPLAN_XML` and answers from a script
pub(crate) struct MockConnection {
    state: Mutex<MockState>,
    closed: AtomicBool,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                current_database: "master".to_string(),
                ..Default::default()
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_databases(self, databases: &[&str]) -> Self {
        self.state.lock().databases = databases.iter().map(|d| d.to_string()).collect();
        self
    }

    pub(crate) fn with_enumeration_error(self, message: &str) -> Self {
        self.state.lock().enumeration_error = Some(message.to_string());
        self
    }

    pub(crate) fn with_failing_database(self, database: &str, message: &str) -> Self {
        self.state
            .lock()
            .failing
            .insert(database.to_string(), message.to_string());
        self
    }

    pub(crate) fn with_failing_statement(self, pattern: &str, message: &str) -> Self {
        self.state
            .lock()
            .failing_statements
            .push((pattern.to_string(), message.to_string()));
        self
    }

    pub(crate) fn with_unreachable_database(self, database: &str) -> Self {
        self.state.lock().unreachable.insert(database.to_string());
        self
    }

    pub(crate) fn with_restore_failure(self) -> Self {
        self.state.lock().restore_fails = true;
        self
    }

    pub(crate) fn with_plan_xml(self, xml: &str) -> Self {
        self.state.lock().plan_xml = Some(xml.to_string());
        self
    }

    pub(crate) fn with_response(self, pattern: &str, result: QueryResult) -> Self {
        self.state
            .lock()
            .responses
            .push((pattern.to_string(), result));
        self
    }

    pub(crate) fn with_rows(self, database: &str, rows: usize) -> Self {
        self.state
            .lock()
            .rows_per_database
            .insert(database.to_string(), rows);
        self
    }

    pub(crate) fn current_database(&self) -> String {
        self.state.lock().current_database.clone()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    pub(crate) fn params(&self) -> Vec<Vec<Value>> {
        self.state.lock().params.clone()
    }

    pub(crate) fn showplan_enabled(&self) -> bool {
        self.state.lock().showplan
    }
}

fn target_database(sql: &str) -> Option<String> {
    let rest = sql.strip_prefix("USE ")?;
    let inner = rest.trim().strip_prefix('[')?.strip_suffix(']')?;
    Some(inner.replace("]]", "]"))
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());
        state.params.push(params.to_vec());

        if let Some(database) = target_database(sql) {
            if database == "master" && state.restore_fails {
                return Err(SqlmonError::Query("switch to master refused".into()));
            }
            if state.unreachable.contains(&database) {
                return Err(SqlmonError::Query(format!(
                    "Database '{}' cannot be opened",
                    database
                )));
            }
            state.current_database = database;
        } else if sql == "SET SHOWPLAN_XML ON" {
            state.showplan = true;
        } else if sql == "SET SHOWPLAN_XML OFF" {
            state.showplan = false;
        }

        Ok(StatementResult { affected_rows: 0 })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut state = self.state.lock();
        state.statements.push(sql.to_string());
        state.params.push(params.to_vec());

        if let Some((_, message)) = state
            .failing_statements
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(SqlmonError::Query(message.clone()));
        }

        if sql == USER_DATABASES_QUERY {
            if let Some(message) = &state.enumeration_error {
                return Err(SqlmonError::Query(message.clone()));
            }
            let rows = state
                .databases
                .iter()
                .map(|d| vec![Value::String(d.clone())])
                .collect();
            return Ok(QueryResult::from_rows(&["name"], rows));
        }

        if state.showplan {
            let rows = state
                .plan_xml
                .iter()
                .map(|xml| vec![Value::String(xml.clone())])
                .collect();
            return Ok(QueryResult::from_rows(&[SHOWPLAN_COLUMN], rows));
        }

        if let Some(message) = state.failing.get(&state.current_database) {
            return Err(SqlmonError::Query(message.clone()));
        }

        if let Some((_, result)) = state
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Ok(result.clone());
        }

        let current = state.current_database.clone();
        let count = state.rows_per_database.get(&current).copied().unwrap_or(1);
        let rows = (0..count)
            .map(|i| vec![Value::String(current.clone()), Value::Int64(i as i64)])
            .collect();
        Ok(QueryResult::from_rows(&["database_name", "n"], rows))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

type Script = Box<dyn Fn() -> MockConnection + Send + Sync>;

/// Factory that builds scripted connections and can refuse to connect
pub(crate) struct MockFactory {
    script: Script,
    created: AtomicUsize,
    refuse_after: Option<usize>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub(crate) fn new(script: impl Fn() -> MockConnection + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            created: AtomicUsize::new(0),
            refuse_after: None,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Refuses every connection after the first `count`
    pub(crate) fn refusing_after(mut self, count: usize) -> Self {
        self.refuse_after = Some(count);
        self
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let attempt = self.created.fetch_add(1, Ordering::SeqCst);
        if self.refuse_after.is_some_and(|limit| attempt >= limit) {
            return Err(SqlmonError::Connection("login timeout expired".into()));
        }
        let conn = Arc::new((self.script)());
        self.connections.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Observer that records events as strings
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl ScanObserver for RecordingObserver {
    fn scan_started(&self, databases: usize) {
        self.record(format!("started {}", databases));
    }

    fn database_succeeded(&self, database: &str, rows: usize) {
        self.record(format!("ok {} {}", database, rows));
    }

    fn database_failed(&self, error: &ScanError) {
        self.record(format!("failed {}", error.database));
    }

    fn restore_failed(&self, database: &str, _error: &SqlmonError) {
        self.record(format!("restore failed {}", database));
    }

    fn scan_cancelled(&self, remaining: usize) {
        self.record(format!("cancelled {}", remaining));
    }

    fn scan_finished(&self, rows: usize, errors: usize) {
        self.record(format!("finished {} {}", rows, errors));
    }
}

/// Observer that cancels a token once a given database has started or succeeded
pub(crate) struct CancellingObserver {
    token: tokio_util::sync::CancellationToken,
    database: String,
    on_start: bool,
}

impl CancellingObserver {
    pub(crate) fn after_success(token: tokio_util::sync::CancellationToken, database: &str) -> Self {
        Self {
            token,
            database: database.to_string(),
            on_start: false,
        }
    }

    pub(crate) fn on_start(token: tokio_util::sync::CancellationToken, database: &str) -> Self {
        Self {
            token,
            database: database.to_string(),
            on_start: true,
        }
    }
}

impl ScanObserver for CancellingObserver {
    fn database_started(&self, database: &str) {
        if self.on_start && database == self.database {
            self.token.cancel();
        }
    }

    fn database_succeeded(&self, database: &str, _rows: usize) {
        if !self.on_start && database == self.database {
            self.token.cancel();
        }
    }
}

//! Session activity: long-running requests, blocking and deadlocks

use crate::row::{FromRow, integer, number, opt_text, text, timestamp};
use chrono::NaiveDateTime;
use indexmap::IndexSet;
use serde::Serialize;
use sqlmon_core::{Result, Row};

/// Requests running longer than `@P1` seconds in user databases
pub const LONG_RUNNING_QUERIES_SQL: &str = r#"
SELECT
    s.session_id AS session_id,
    DB_NAME(r.database_id) AS database_name,
    s.login_name AS login_name,
    SUBSTRING(t.text, (r.statement_start_offset / 2) + 1,
        ((CASE r.statement_end_offset
            WHEN -1 THEN DATALENGTH(t.text)
            ELSE r.statement_end_offset
        END - r.statement_start_offset) / 2) + 1) AS query_text,
    r.start_time AS start_time,
    r.total_elapsed_time / 1000.0 AS duration_seconds,
    r.cpu_time / 1000.0 AS cpu_time_seconds,
    r.logical_reads AS logical_reads,
    r.writes AS writes,
    r.status AS status,
    r.wait_type AS wait_type,
    r.wait_time / 1000.0 AS wait_time_seconds,
    r.last_wait_type AS last_wait_type
FROM sys.dm_exec_requests r
CROSS APPLY sys.dm_exec_sql_text(r.sql_handle) t
JOIN sys.dm_exec_sessions s ON r.session_id = s.session_id
WHERE r.session_id <> @@SPID
    AND r.database_id > 4
    AND r.total_elapsed_time / 1000.0 > @P1
ORDER BY r.total_elapsed_time DESC
"#;

/// Waiting tasks that are blocked by another session
pub const BLOCKING_SESSIONS_SQL: &str = r#"
SELECT
    w.session_id AS session_id,
    w.blocking_session_id AS blocking_session_id,
    w.wait_duration_ms / 1000.0 AS wait_time_seconds,
    s.login_name AS login_name,
    DB_NAME(r.database_id) AS database_name,
    OBJECT_SCHEMA_NAME(t.objectid, t.dbid) AS schema_name,
    OBJECT_NAME(t.objectid, t.dbid) AS object_name,
    SUBSTRING(t.text, (r.statement_start_offset / 2) + 1,
        ((CASE r.statement_end_offset
            WHEN -1 THEN DATALENGTH(t.text)
            ELSE r.statement_end_offset
        END - r.statement_start_offset) / 2) + 1) AS query_text,
    r.start_time AS start_time,
    r.total_elapsed_time / 1000.0 AS duration_seconds,
    r.status AS status,
    w.wait_type AS wait_type,
    s.host_name AS host_name,
    s.program_name AS program_name
FROM sys.dm_os_waiting_tasks w
JOIN sys.dm_exec_sessions s ON w.session_id = s.session_id
JOIN sys.dm_exec_requests r ON w.session_id = r.session_id
CROSS APPLY sys.dm_exec_sql_text(r.sql_handle) t
WHERE w.blocking_session_id IS NOT NULL
    AND r.database_id > 4
ORDER BY w.wait_duration_ms DESC
"#;

/// Victim/blocker pairs of the deadlock reports kept in the `system_health` ring buffer
pub const DEADLOCKS_SQL: &str = r#"
WITH ring AS (
    SELECT CAST(st.target_data AS xml) AS target_xml
    FROM sys.dm_xe_session_targets st
    JOIN sys.dm_xe_sessions s ON s.address = st.event_session_address
    WHERE s.name = 'system_health'
        AND st.target_name = 'ring_buffer'
), reports AS (
    SELECT
        ev.value('@timestamp', 'datetime2') AS deadlock_time,
        ev.query('(data/value/deadlock)[1]') AS graph
    FROM ring
    CROSS APPLY target_xml.nodes('RingBufferTarget/event[@name="xml_deadlock_report"]') AS e(ev)
)
SELECT
    r.deadlock_time AS deadlock_time,
    victim.value('@id', 'varchar(50)') AS victim_process_id,
    CAST(victim.query('.') AS nvarchar(max)) AS victim_process,
    blocker.value('@id', 'varchar(50)') AS blocking_process_id,
    CAST(blocker.query('.') AS nvarchar(max)) AS blocking_process
FROM reports r
CROSS APPLY r.graph.nodes('deadlock/victim-list/victimProcess') AS v(victim_ref)
CROSS APPLY r.graph.nodes('deadlock/process-list/process') AS p(victim)
CROSS APPLY r.graph.nodes('deadlock/process-list/process') AS b(blocker)
WHERE victim.value('@id', 'varchar(50)') = victim_ref.value('@id', 'varchar(50)')
    AND blocker.value('@id', 'varchar(50)') <> victim.value('@id', 'varchar(50)')
ORDER BY r.deadlock_time DESC
"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRunningQuery {
    pub session_id: i64,
    pub database_name: Option<String>,
    pub login_name: Option<String>,
    pub query_text: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub duration_seconds: f64,
    pub cpu_time_seconds: f64,
    pub logical_reads: i64,
    pub writes: i64,
    pub status: Option<String>,
    pub wait_type: Option<String>,
    pub wait_time_seconds: f64,
    pub last_wait_type: Option<String>,
}

impl FromRow for LongRunningQuery {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            session_id: integer(row, "session_id")?,
            database_name: opt_text(row, "database_name")?,
            login_name: opt_text(row, "login_name")?,
            query_text: opt_text(row, "query_text")?,
            start_time: timestamp(row, "start_time")?,
            duration_seconds: number(row, "duration_seconds")?,
            cpu_time_seconds: number(row, "cpu_time_seconds")?,
            logical_reads: integer(row, "logical_reads")?,
            writes: integer(row, "writes")?,
            status: opt_text(row, "status")?,
            wait_type: opt_text(row, "wait_type")?,
            wait_time_seconds: number(row, "wait_time_seconds")?,
            last_wait_type: opt_text(row, "last_wait_type")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockingSession {
    pub session_id: i64,
    pub blocking_session_id: i64,
    pub wait_time_seconds: f64,
    pub login_name: Option<String>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub object_name: Option<String>,
    pub query_text: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub duration_seconds: f64,
    pub status: Option<String>,
    pub wait_type: Option<String>,
    pub host_name: Option<String>,
    pub program_name: Option<String>,
}

impl FromRow for BlockingSession {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            session_id: integer(row, "session_id")?,
            blocking_session_id: integer(row, "blocking_session_id")?,
            wait_time_seconds: number(row, "wait_time_seconds")?,
            login_name: opt_text(row, "login_name")?,
            database_name: opt_text(row, "database_name")?,
            schema_name: opt_text(row, "schema_name")?,
            object_name: opt_text(row, "object_name")?,
            query_text: opt_text(row, "query_text")?,
            start_time: timestamp(row, "start_time")?,
            duration_seconds: number(row, "duration_seconds")?,
            status: opt_text(row, "status")?,
            wait_type: opt_text(row, "wait_type")?,
            host_name: opt_text(row, "host_name")?,
            program_name: opt_text(row, "program_name")?,
        })
    }
}

/// Sessions at the head of a blocking chain
///
/// A head blocker blocks at least one session and is not itself waiting on
/// another session. Returned in order of first appearance.
pub fn head_blockers(sessions: &[BlockingSession]) -> Vec<i64> {
    let waiting: IndexSet<i64> = sessions.iter().map(|s| s.session_id).collect();
    let blockers: IndexSet<i64> = sessions
        .iter()
        .map(|s| s.blocking_session_id)
        .filter(|id| *id != 0)
        .collect();
    blockers
        .into_iter()
        .filter(|id| !waiting.contains(id))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deadlock {
    pub deadlock_time: Option<NaiveDateTime>,
    pub victim_process_id: String,
    pub victim_process: Option<String>,
    pub blocking_process_id: String,
    pub blocking_process: Option<String>,
}

impl FromRow for Deadlock {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            deadlock_time: timestamp(row, "deadlock_time")?,
            victim_process_id: text(row, "victim_process_id")?,
            victim_process: opt_text(row, "victim_process")?,
            blocking_process_id: text(row, "blocking_process_id")?,
            blocking_process: opt_text(row, "blocking_process")?,
        })
    }
}

//! Execution plan capture and the plan-cache sweep

use crate::row::{FromRow, integer, number, opt_text};
use serde::Serialize;
use sqlmon_analyzer::PlanAnalysis;
use sqlmon_core::{Connection, Result, Row};

/// Top `@P1` cached statements by total CPU time, with their cached plans
pub const EXPENSIVE_QUERIES_SQL: &str = r#"
SELECT TOP (@P1)
    st.text AS query_text,
    DB_NAME(st.dbid) AS database_name,
    qs.execution_count AS execution_count,
    qs.total_worker_time / 1000000.0 AS total_cpu_seconds,
    qs.total_elapsed_time / 1000000.0 AS total_duration_seconds,
    qs.total_logical_reads AS total_logical_reads,
    qs.total_physical_reads AS total_physical_reads,
    CAST(qp.query_plan AS nvarchar(max)) AS query_plan
FROM sys.dm_exec_query_stats qs
CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) st
CROSS APPLY sys.dm_exec_query_plan(qs.plan_handle) qp
WHERE st.dbid > 4
ORDER BY qs.total_worker_time DESC
"#;

const SHOWPLAN_ON: &str = "SET SHOWPLAN_XML ON";
const SHOWPLAN_OFF: &str = "SET SHOWPLAN_XML OFF";

/// A cached statement and the analysis of its plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpensiveQuery {
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub execution_count: i64,
    pub total_cpu_seconds: f64,
    pub total_duration_seconds: f64,
    pub total_logical_reads: i64,
    pub total_physical_reads: i64,
    pub analysis: PlanAnalysis,
}

impl FromRow for ExpensiveQuery {
    fn from_row(row: &Row) -> Result<Self> {
        let analysis = match opt_text(row, "query_plan")? {
            Some(xml) => PlanAnalysis::from_xml(&xml),
            None => PlanAnalysis::unavailable(),
        };
        Ok(Self {
            query_text: opt_text(row, "query_text")?,
            database_name: opt_text(row, "database_name")?,
            execution_count: integer(row, "execution_count")?,
            total_cpu_seconds: number(row, "total_cpu_seconds")?,
            total_duration_seconds: number(row, "total_duration_seconds")?,
            total_logical_reads: integer(row, "total_logical_reads")?,
            total_physical_reads: integer(row, "total_physical_reads")?,
            analysis,
        })
    }
}

/// Returns the estimated plan of `sql` without running it
///
/// Turns `SHOWPLAN_XML` on for the session, runs the statement, and always
/// turns it back off, even when the statement fails. Returns `None` if the
/// server produced no plan document.
#[tracing::instrument(level = "debug", skip(conn, sql))]
pub async fn capture_plan(conn: &dyn Connection, sql: &str) -> Result<Option<String>> {
    conn.execute(SHOWPLAN_ON, &[]).await?;

    let result = conn.query(sql, &[]).await;
    let reset = conn.execute(SHOWPLAN_OFF, &[]).await;

    let result = match (result, reset) {
        (Ok(result), Ok(_)) => result,
        (Ok(_), Err(e)) => return Err(e),
        (Err(e), Ok(_)) => return Err(e),
        (Err(e), Err(reset_err)) => {
            tracing::error!(error = %reset_err, "failed to turn SHOWPLAN_XML off");
            return Err(e);
        }
    };

    Ok(result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(|value| value.as_str())
        .map(str::to_string))
}

/// Captures and analyzes the estimated plan of `sql`
pub async fn analyze_plan(conn: &dyn Connection, sql: &str) -> Result<PlanAnalysis> {
    Ok(match capture_plan(conn, sql).await? {
        Some(xml) => PlanAnalysis::from_xml(&xml),
        None => {
            tracing::warn!("server returned no execution plan");
            PlanAnalysis::unavailable()
        }
    })
}

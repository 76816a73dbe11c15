//! Resource diagnostics: expensive statements, memory, file I/O and network

use crate::row::{FromRow, flag, integer, number, opt_text, text, timestamp};
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlmon_core::{Result, Row};

/// Top 50 cached statements by average CPU time
pub const RESOURCE_INTENSIVE_QUERIES_SQL: &str = r#"
SELECT TOP 50
    DB_NAME(qt.dbid) AS database_name,
    SUBSTRING(qt.text, (qs.statement_start_offset / 2) + 1,
        ((CASE qs.statement_end_offset
            WHEN -1 THEN DATALENGTH(qt.text)
            ELSE qs.statement_end_offset
        END - qs.statement_start_offset) / 2) + 1) AS query_text,
    qs.execution_count AS execution_count,
    qs.total_worker_time / 1000000.0 AS total_cpu_seconds,
    qs.total_worker_time / 1000000.0 / qs.execution_count AS avg_cpu_seconds,
    qs.total_physical_reads AS total_physical_reads,
    qs.total_physical_reads * 1.0 / qs.execution_count AS avg_physical_reads,
    qs.total_logical_reads AS total_logical_reads,
    qs.total_logical_reads * 1.0 / qs.execution_count AS avg_logical_reads,
    qs.total_logical_writes AS total_logical_writes,
    qs.total_logical_writes * 1.0 / qs.execution_count AS avg_logical_writes,
    qs.total_elapsed_time / 1000000.0 AS total_duration_seconds,
    qs.total_elapsed_time / 1000000.0 / qs.execution_count AS avg_duration_seconds,
    qs.last_execution_time AS last_executed
FROM sys.dm_exec_query_stats qs
CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) qt
WHERE qt.dbid > 4
ORDER BY qs.total_worker_time / qs.execution_count DESC
"#;

/// Machine and process memory of the instance
pub const SERVER_MEMORY_SQL: &str = r#"
SELECT
    CAST(ROUND(si.physical_memory_kb / 1024.0 / 1024, 2) AS decimal(10, 2)) AS total_server_memory_gb,
    CAST(ROUND(si.virtual_memory_kb / 1024.0 / 1024, 2) AS decimal(10, 2)) AS total_virtual_memory_gb,
    CAST(ROUND(si.committed_kb / 1024.0 / 1024, 2) AS decimal(10, 2)) AS committed_gb,
    CAST(ROUND(si.committed_target_kb / 1024.0 / 1024, 2) AS decimal(10, 2)) AS target_committed_gb,
    CAST(ROUND(pm.physical_memory_in_use_kb / 1024.0 / 1024, 2) AS decimal(10, 2)) AS process_memory_in_use_gb,
    pm.process_physical_memory_low AS low_physical_memory,
    pm.process_virtual_memory_low AS low_virtual_memory
FROM sys.dm_os_sys_info si
CROSS JOIN sys.dm_os_process_memory pm
"#;

/// Buffer pool pages held by each user database (top 10)
pub const DATABASE_BUFFER_USAGE_SQL: &str = r#"
SELECT TOP 10
    DB_NAME(database_id) AS database_name,
    CAST(ROUND(COUNT_BIG(*) * 8 / 1024.0 / 1024, 2) AS decimal(10, 2)) AS cache_usage_gb,
    COUNT_BIG(*) AS buffer_page_count,
    AVG(CAST(read_microsec AS float)) / 1000000.0 AS avg_read_time_seconds
FROM sys.dm_os_buffer_descriptors
WHERE database_id > 4
GROUP BY database_id
ORDER BY buffer_page_count DESC
"#;

/// Buffer pool pages held by each table and index of the current database (top 10)
pub const TABLE_BUFFER_USAGE_SQL: &str = r#"
SELECT TOP 10
    DB_NAME() AS database_name,
    OBJECT_NAME(p.object_id) AS table_name,
    i.name AS index_name,
    CAST(ROUND(COUNT_BIG(*) * 8 / 1024.0 / 1024, 2) AS decimal(10, 2)) AS cache_usage_gb,
    COUNT_BIG(*) AS buffer_page_count
FROM sys.dm_os_buffer_descriptors b
JOIN sys.allocation_units a ON a.allocation_unit_id = b.allocation_unit_id
JOIN sys.partitions p ON a.container_id = p.hobt_id
JOIN sys.indexes i ON p.index_id = i.index_id AND p.object_id = i.object_id
WHERE b.database_id = DB_ID()
    AND p.object_id > 100
GROUP BY p.object_id, i.name
ORDER BY buffer_page_count DESC
"#;

/// Read/write stalls per database file
pub const FILE_IO_STATS_SQL: &str = r#"
SELECT
    DB_NAME(vfs.database_id) AS database_name,
    vfs.file_id AS file_id,
    mf.name AS logical_file_name,
    mf.physical_name AS physical_file_name,
    vfs.sample_ms / 1000.0 AS sample_time_seconds,
    vfs.num_of_reads AS number_of_reads,
    vfs.num_of_writes AS number_of_writes,
    vfs.io_stall_read_ms / 1000.0 AS read_stall_seconds,
    vfs.io_stall_write_ms / 1000.0 AS write_stall_seconds,
    CAST(ROUND(vfs.size_on_disk_bytes / 1024.0 / 1024 / 1024, 2) AS decimal(10, 2)) AS size_gb,
    ISNULL(vfs.io_stall_read_ms * 1.0 / NULLIF(vfs.num_of_reads, 0), 0) AS avg_read_latency_ms,
    ISNULL(vfs.io_stall_write_ms * 1.0 / NULLIF(vfs.num_of_writes, 0), 0) AS avg_write_latency_ms
FROM sys.dm_io_virtual_file_stats(NULL, NULL) vfs
JOIN sys.master_files mf
    ON vfs.database_id = mf.database_id
    AND vfs.file_id = mf.file_id
WHERE vfs.database_id > 4
ORDER BY vfs.io_stall_read_ms + vfs.io_stall_write_ms DESC
"#;

/// Client connections to user databases, busiest first
pub const NETWORK_CONNECTIONS_SQL: &str = r#"
SELECT
    ec.session_id AS session_id,
    ec.client_net_address AS client_address,
    ec.local_net_address AS server_address,
    ec.local_tcp_port AS server_port,
    s.login_name AS login_name,
    DB_NAME(s.database_id) AS database_name,
    s.program_name AS application,
    ec.connect_time AS connection_start_time,
    ec.num_reads AS number_of_reads,
    ec.num_writes AS number_of_writes,
    ec.last_read AS last_read_time,
    ec.last_write AS last_write_time,
    s.reads AS total_reads,
    s.writes AS total_writes,
    s.logical_reads AS logical_reads,
    ec.net_packet_size AS net_packet_size
FROM sys.dm_exec_connections ec
JOIN sys.dm_exec_sessions s ON ec.session_id = s.session_id
WHERE ec.session_id <> @@SPID
    AND s.database_id > 4
ORDER BY ec.num_reads + ec.num_writes DESC
"#;

/// Average CPU seconds per execution above which a statement is CPU-heavy
pub const HIGH_CPU_SECONDS: f64 = 1.0;

/// Average physical reads or logical writes per execution considered heavy
pub const HIGH_IO_PER_EXECUTION: f64 = 1000.0;

/// Average file latency in milliseconds considered slow
pub const HIGH_LATENCY_MS: f64 = 20.0;

/// Estimated megabytes per connection considered heavy
pub const HIGH_NETWORK_MB: f64 = 100.0;

/// Dominant resource cost of a cached statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceVerdict {
    HighCpu,
    HighDiskReads,
    HighDiskWrites,
    Normal,
}

impl ResourceVerdict {
    /// Checks CPU first, then reads, then writes
    pub fn classify(avg_cpu_seconds: f64, avg_physical_reads: f64, avg_logical_writes: f64) -> Self {
        if avg_cpu_seconds > HIGH_CPU_SECONDS {
            Self::HighCpu
        } else if avg_physical_reads > HIGH_IO_PER_EXECUTION {
            Self::HighDiskReads
        } else if avg_logical_writes > HIGH_IO_PER_EXECUTION {
            Self::HighDiskWrites
        } else {
            Self::Normal
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::HighCpu => "High CPU usage",
            Self::HighDiskReads => "High disk reads",
            Self::HighDiskWrites => "High disk writes",
            Self::Normal => "Normal resource usage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceIntensiveQuery {
    pub database_name: Option<String>,
    pub query_text: Option<String>,
    pub execution_count: i64,
    pub total_cpu_seconds: f64,
    pub avg_cpu_seconds: f64,
    pub total_physical_reads: i64,
    pub avg_physical_reads: f64,
    pub total_logical_reads: i64,
    pub avg_logical_reads: f64,
    pub total_logical_writes: i64,
    pub avg_logical_writes: f64,
    pub total_duration_seconds: f64,
    pub avg_duration_seconds: f64,
    pub last_executed: Option<NaiveDateTime>,
    pub analysis: ResourceVerdict,
}

impl FromRow for ResourceIntensiveQuery {
    fn from_row(row: &Row) -> Result<Self> {
        let avg_cpu_seconds = number(row, "avg_cpu_seconds")?;
        let avg_physical_reads = number(row, "avg_physical_reads")?;
        let avg_logical_writes = number(row, "avg_logical_writes")?;
        Ok(Self {
            database_name: opt_text(row, "database_name")?,
            query_text: opt_text(row, "query_text")?,
            execution_count: integer(row, "execution_count")?,
            total_cpu_seconds: number(row, "total_cpu_seconds")?,
            avg_cpu_seconds,
            total_physical_reads: integer(row, "total_physical_reads")?,
            avg_physical_reads,
            total_logical_reads: integer(row, "total_logical_reads")?,
            avg_logical_reads: number(row, "avg_logical_reads")?,
            total_logical_writes: integer(row, "total_logical_writes")?,
            avg_logical_writes,
            total_duration_seconds: number(row, "total_duration_seconds")?,
            avg_duration_seconds: number(row, "avg_duration_seconds")?,
            last_executed: timestamp(row, "last_executed")?,
            analysis: ResourceVerdict::classify(avg_cpu_seconds, avg_physical_reads, avg_logical_writes),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMemory {
    pub total_server_memory_gb: f64,
    pub total_virtual_memory_gb: f64,
    pub committed_gb: f64,
    pub target_committed_gb: f64,
    pub process_memory_in_use_gb: f64,
    pub low_physical_memory: bool,
    pub low_virtual_memory: bool,
}

impl ServerMemory {
    /// True if the process reports either low-memory flag
    pub fn is_under_pressure(&self) -> bool {
        self.low_physical_memory || self.low_virtual_memory
    }
}

impl FromRow for ServerMemory {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            total_server_memory_gb: number(row, "total_server_memory_gb")?,
            total_virtual_memory_gb: number(row, "total_virtual_memory_gb")?,
            committed_gb: number(row, "committed_gb")?,
            target_committed_gb: number(row, "target_committed_gb")?,
            process_memory_in_use_gb: number(row, "process_memory_in_use_gb")?,
            low_physical_memory: flag(row, "low_physical_memory")?,
            low_virtual_memory: flag(row, "low_virtual_memory")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseBufferUsage {
    pub database_name: Option<String>,
    pub cache_usage_gb: f64,
    pub buffer_page_count: i64,
    pub avg_read_time_seconds: f64,
}

impl FromRow for DatabaseBufferUsage {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            database_name: opt_text(row, "database_name")?,
            cache_usage_gb: number(row, "cache_usage_gb")?,
            buffer_page_count: integer(row, "buffer_page_count")?,
            avg_read_time_seconds: number(row, "avg_read_time_seconds")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableBufferUsage {
    pub database_name: String,
    pub table_name: Option<String>,
    pub index_name: Option<String>,
    pub cache_usage_gb: f64,
    pub buffer_page_count: i64,
}

impl FromRow for TableBufferUsage {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            database_name: text(row, "database_name")?,
            table_name: opt_text(row, "table_name")?,
            index_name: opt_text(row, "index_name")?,
            cache_usage_gb: number(row, "cache_usage_gb")?,
            buffer_page_count: integer(row, "buffer_page_count")?,
        })
    }
}

/// Memory sections of one sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryReport {
    pub server: Option<ServerMemory>,
    pub databases: Vec<DatabaseBufferUsage>,
    pub tables: crate::ScanOutcome<TableBufferUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyVerdict {
    High,
    Normal,
}

impl LatencyVerdict {
    pub fn classify(avg_read_latency_ms: f64, avg_write_latency_ms: f64) -> Self {
        if avg_read_latency_ms > HIGH_LATENCY_MS || avg_write_latency_ms > HIGH_LATENCY_MS {
            Self::High
        } else {
            Self::Normal
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::High => "High latency - Check disk performance",
            Self::Normal => "Normal latency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileIoStats {
    pub database_name: Option<String>,
    pub file_id: i64,
    pub logical_file_name: String,
    pub physical_file_name: String,
    pub sample_time_seconds: f64,
    pub number_of_reads: i64,
    pub number_of_writes: i64,
    pub read_stall_seconds: f64,
    pub write_stall_seconds: f64,
    pub size_gb: f64,
    pub avg_read_latency_ms: f64,
    pub avg_write_latency_ms: f64,
    pub analysis: LatencyVerdict,
}

impl FromRow for FileIoStats {
    fn from_row(row: &Row) -> Result<Self> {
        let avg_read_latency_ms = number(row, "avg_read_latency_ms")?;
        let avg_write_latency_ms = number(row, "avg_write_latency_ms")?;
        Ok(Self {
            database_name: opt_text(row, "database_name")?,
            file_id: integer(row, "file_id")?,
            logical_file_name: text(row, "logical_file_name")?,
            physical_file_name: text(row, "physical_file_name")?,
            sample_time_seconds: number(row, "sample_time_seconds")?,
            number_of_reads: integer(row, "number_of_reads")?,
            number_of_writes: integer(row, "number_of_writes")?,
            read_stall_seconds: number(row, "read_stall_seconds")?,
            write_stall_seconds: number(row, "write_stall_seconds")?,
            size_gb: number(row, "size_gb")?,
            avg_read_latency_ms,
            avg_write_latency_ms,
            analysis: LatencyVerdict::classify(avg_read_latency_ms, avg_write_latency_ms),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkVerdict {
    High,
    Normal,
}

impl NetworkVerdict {
    pub fn classify(megabytes: f64) -> Self {
        if megabytes > HIGH_NETWORK_MB {
            Self::High
        } else {
            Self::Normal
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::High => "High network usage",
            Self::Normal => "Normal network usage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkConnection {
    pub session_id: i64,
    pub client_address: Option<String>,
    pub server_address: Option<String>,
    pub server_port: Option<i64>,
    pub login_name: Option<String>,
    pub database_name: Option<String>,
    pub application: Option<String>,
    pub connection_start_time: Option<NaiveDateTime>,
    pub number_of_reads: i64,
    pub number_of_writes: i64,
    pub last_read_time: Option<NaiveDateTime>,
    pub last_write_time: Option<NaiveDateTime>,
    pub total_reads: i64,
    pub total_writes: i64,
    pub logical_reads: i64,
    pub net_packet_size: i64,
    /// Packets exchanged times the negotiated packet size, in MiB
    pub estimated_mb_transferred: f64,
    pub analysis: NetworkVerdict,
}

impl FromRow for NetworkConnection {
    fn from_row(row: &Row) -> Result<Self> {
        let number_of_reads = integer(row, "number_of_reads")?;
        let number_of_writes = integer(row, "number_of_writes")?;
        let net_packet_size = integer(row, "net_packet_size")?;
        let estimated_mb_transferred =
            (number_of_reads + number_of_writes) as f64 * net_packet_size as f64 / (1024.0 * 1024.0);
        let server_port = match row.get_by_name("server_port") {
            Some(value) if !value.is_null() => Some(integer(row, "server_port")?),
            _ => None,
        };

        Ok(Self {
            session_id: integer(row, "session_id")?,
            client_address: opt_text(row, "client_address")?,
            server_address: opt_text(row, "server_address")?,
            server_port,
            login_name: opt_text(row, "login_name")?,
            database_name: opt_text(row, "database_name")?,
            application: opt_text(row, "application")?,
            connection_start_time: timestamp(row, "connection_start_time")?,
            number_of_reads,
            number_of_writes,
            last_read_time: timestamp(row, "last_read_time")?,
            last_write_time: timestamp(row, "last_write_time")?,
            total_reads: integer(row, "total_reads")?,
            total_writes: integer(row, "total_writes")?,
            logical_reads: integer(row, "logical_reads")?,
            net_packet_size,
            estimated_mb_transferred,
            analysis: NetworkVerdict::classify(estimated_mb_transferred),
        })
    }
}

//! Built-in SQL Server diagnostics
//!
//! Each diagnostic is a query constant plus a typed row implementing
//! [`crate::FromRow`]. Classification thresholds are applied in Rust when a
//! row is decoded, not in SQL.

mod activity;
mod indexes;
mod plans;
mod resources;


pub use activity::*;
pub use indexes::*;
pub use plans::*;
pub use resources::*;

/// Where a diagnostic query has to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticScope {
    /// Once in every user database, through the scanner
    PerDatabase,
    /// Once, from the default database
    Server,
}

/// The built-in diagnostic queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticQuery {
    IndexHealth,
    UnusedIndexes,
    IndexColumns,
    MissingIndexes,
    LongRunningQueries,
    BlockingSessions,
    Deadlocks,
    ResourceIntensiveQueries,
    ServerMemory,
    DatabaseBufferUsage,
    TableBufferUsage,
    FileIoStats,
    NetworkConnections,
    ExpensiveQueries,
}

impl DiagnosticQuery {
    pub const ALL: [DiagnosticQuery; 14] = [
        Self::IndexHealth,
        Self::UnusedIndexes,
        Self::IndexColumns,
        Self::MissingIndexes,
        Self::LongRunningQueries,
        Self::BlockingSessions,
        Self::Deadlocks,
        Self::ResourceIntensiveQueries,
        Self::ServerMemory,
        Self::DatabaseBufferUsage,
        Self::TableBufferUsage,
        Self::FileIoStats,
        Self::NetworkConnections,
        Self::ExpensiveQueries,
    ];

    /// SQL text of the query
    pub fn sql(&self) -> &'static str {
        match self {
            Self::IndexHealth => INDEX_HEALTH_SQL,
            Self::UnusedIndexes => UNUSED_INDEXES_SQL,
            Self::IndexColumns => INDEX_COLUMNS_SQL,
            Self::MissingIndexes => MISSING_INDEXES_SQL,
            Self::LongRunningQueries => LONG_RUNNING_QUERIES_SQL,
            Self::BlockingSessions => BLOCKING_SESSIONS_SQL,
            Self::Deadlocks => DEADLOCKS_SQL,
            Self::ResourceIntensiveQueries => RESOURCE_INTENSIVE_QUERIES_SQL,
            Self::ServerMemory => SERVER_MEMORY_SQL,
            Self::DatabaseBufferUsage => DATABASE_BUFFER_USAGE_SQL,
            Self::TableBufferUsage => TABLE_BUFFER_USAGE_SQL,
            Self::FileIoStats => FILE_IO_STATS_SQL,
            Self::NetworkConnections => NETWORK_CONNECTIONS_SQL,
            Self::ExpensiveQueries => EXPENSIVE_QUERIES_SQL,
        }
    }

    pub fn scope(&self) -> DiagnosticScope {
        match self {
            Self::IndexHealth | Self::UnusedIndexes | Self::IndexColumns | Self::TableBufferUsage => {
                DiagnosticScope::PerDatabase
            }
            _ => DiagnosticScope::Server,
        }
    }

    /// Short name used in logs and snapshot summaries
    pub fn name(&self) -> &'static str {
        match self {
            Self::IndexHealth => "index_health",
            Self::UnusedIndexes => "unused_indexes",
            Self::IndexColumns => "index_columns",
            Self::MissingIndexes => "missing_indexes",
            Self::LongRunningQueries => "long_running_queries",
            Self::BlockingSessions => "blocking_sessions",
            Self::Deadlocks => "deadlocks",
            Self::ResourceIntensiveQueries => "resource_intensive_queries",
            Self::ServerMemory => "server_memory",
            Self::DatabaseBufferUsage => "database_buffer_usage",
            Self::TableBufferUsage => "table_buffer_usage",
            Self::FileIoStats => "file_io_stats",
            Self::NetworkConnections => "network_connections",
            Self::ExpensiveQueries => "expensive_queries",
        }
    }

    /// Number of `@P` parameters the query expects
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::LongRunningQueries | Self::ExpensiveQueries => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for DiagnosticQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

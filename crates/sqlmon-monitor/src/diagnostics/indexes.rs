//! Index diagnostics: fragmentation, usage, duplicates and missing indexes

use crate::quote_identifier;
use crate::row::{FromRow, flag, integer, number, opt_text, text, timestamp};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use sqlmon_core::{Result, Row};

/// Fragmentation and read/write counts per index (per database)
pub const INDEX_HEALTH_SQL: &str = r#"
SELECT
    DB_NAME() AS database_name,
    OBJECT_SCHEMA_NAME(i.object_id) AS schema_name,
    OBJECT_NAME(i.object_id) AS table_name,
    i.name AS index_name,
    ips.avg_fragmentation_in_percent AS fragmentation_percent,
    ips.page_count AS page_count,
    ISNULL(ius.user_seeks, 0) + ISNULL(ius.user_scans, 0) + ISNULL(ius.user_lookups, 0) AS total_reads,
    ISNULL(ius.user_updates, 0) AS total_writes,
    ius.last_user_seek AS last_seek
FROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, 'LIMITED') ips
JOIN sys.indexes i ON ips.object_id = i.object_id AND ips.index_id = i.index_id
LEFT JOIN sys.dm_db_index_usage_stats ius
    ON ius.database_id = DB_ID()
    AND ius.object_id = i.object_id
    AND ius.index_id = i.index_id
WHERE i.type_desc <> 'HEAP'
ORDER BY ips.avg_fragmentation_in_percent DESC
"#;

/// Usage counters of non-key indexes (per database)
pub const UNUSED_INDEXES_SQL: &str = r#"
SELECT
    DB_NAME() AS database_name,
    OBJECT_SCHEMA_NAME(i.object_id) AS schema_name,
    OBJECT_NAME(i.object_id) AS table_name,
    i.name AS index_name,
    i.type_desc AS index_type,
    ISNULL(us.user_seeks, 0) AS user_seeks,
    ISNULL(us.user_scans, 0) AS user_scans,
    ISNULL(us.user_lookups, 0) AS user_lookups,
    ISNULL(us.user_updates, 0) AS user_updates
FROM sys.indexes i
LEFT JOIN sys.dm_db_index_usage_stats us
    ON us.object_id = i.object_id
    AND us.index_id = i.index_id
    AND us.database_id = DB_ID()
WHERE i.type_desc <> 'HEAP'
    AND i.is_primary_key = 0
    AND i.is_unique_constraint = 0
    AND OBJECTPROPERTY(i.object_id, 'IsUserTable') = 1
ORDER BY ISNULL(us.user_seeks, 0) + ISNULL(us.user_scans, 0) + ISNULL(us.user_lookups, 0)
"#;

/// One row per index column, keys in key order then included columns (per database)
pub const INDEX_COLUMNS_SQL: &str = r#"
SELECT
    DB_NAME() AS database_name,
    OBJECT_SCHEMA_NAME(i.object_id) AS schema_name,
    OBJECT_NAME(i.object_id) AS table_name,
    i.object_id AS object_id,
    i.index_id AS index_id,
    i.name AS index_name,
    COL_NAME(ic.object_id, ic.column_id) AS column_name,
    ic.key_ordinal AS key_ordinal,
    ic.is_included_column AS is_included
FROM sys.indexes i
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
WHERE i.name IS NOT NULL
    AND OBJECTPROPERTY(i.object_id, 'IsUserTable') = 1
ORDER BY i.object_id, i.index_id, ic.is_included_column, ic.key_ordinal, ic.index_column_id
"#;

/// Missing-index suggestions for every user database (server-wide)
pub const MISSING_INDEXES_SQL: &str = r#"
SELECT
    DB_NAME(d.database_id) AS database_name,
    OBJECT_NAME(d.object_id, d.database_id) AS table_name,
    d.statement AS table_reference,
    d.equality_columns AS equality_columns,
    d.inequality_columns AS inequality_columns,
    d.included_columns AS included_columns,
    s.unique_compiles AS number_of_compiles,
    s.user_seeks + s.user_scans AS number_of_scans,
    CAST(s.avg_total_user_cost AS decimal(18, 2)) AS avg_query_cost_reduction,
    CAST(s.avg_user_impact AS decimal(18, 2)) AS avg_pct_benefit,
    CAST((s.user_seeks + s.user_scans) * s.avg_total_user_cost * (s.avg_user_impact / 100.0) AS decimal(18, 2)) AS index_advantage,
    ROW_NUMBER() OVER (
        PARTITION BY d.database_id, d.object_id
        ORDER BY (s.user_seeks + s.user_scans) * s.avg_total_user_cost * (s.avg_user_impact / 100.0) DESC
    ) AS index_rank
FROM sys.dm_db_missing_index_details d
JOIN sys.dm_db_missing_index_groups g ON d.index_handle = g.index_handle
JOIN sys.dm_db_missing_index_group_stats s ON g.index_group_handle = s.group_handle
WHERE d.database_id > 4
ORDER BY index_advantage DESC
"#;

/// Fragmentation above which an index should be rebuilt
pub const REBUILD_THRESHOLD_PERCENT: f64 = 30.0;

/// Fragmentation above which an index should be reorganized
pub const REORGANIZE_THRESHOLD_PERCENT: f64 = 10.0;

/// Suggested maintenance for a fragmented index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceAction {
    Rebuild,
    Reorganize,
    None,
}

impl MaintenanceAction {
    pub fn from_fragmentation(percent: f64) -> Self {
        if percent >= REBUILD_THRESHOLD_PERCENT {
            Self::Rebuild
        } else if percent >= REORGANIZE_THRESHOLD_PERCENT {
            Self::Reorganize
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rebuild => "REBUILD INDEX",
            Self::Reorganize => "REORGANIZE INDEX",
            Self::None => "No action needed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexHealth {
    pub database_name: String,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub index_name: Option<String>,
    pub fragmentation_percent: f64,
    pub page_count: i64,
    pub total_reads: i64,
    pub total_writes: i64,
    pub last_seek: Option<NaiveDateTime>,
    pub maintenance_action: MaintenanceAction,
}

impl IndexHealth {
    /// `ALTER INDEX` statement for the suggested action, if any
    pub fn maintenance_statement(&self) -> Option<String> {
        let verb = match self.maintenance_action {
            MaintenanceAction::Rebuild => "REBUILD",
            MaintenanceAction::Reorganize => "REORGANIZE",
            MaintenanceAction::None => return None,
        };
        Some(format!(
            "ALTER INDEX {} ON {}.{} {}",
            quote_identifier(self.index_name.as_deref()?),
            quote_identifier(self.schema_name.as_deref()?),
            quote_identifier(self.table_name.as_deref()?),
            verb
        ))
    }
}

impl FromRow for IndexHealth {
    fn from_row(row: &Row) -> Result<Self> {
        let fragmentation_percent = number(row, "fragmentation_percent")?;
        Ok(Self {
            database_name: text(row, "database_name")?,
            schema_name: opt_text(row, "schema_name")?,
            table_name: opt_text(row, "table_name")?,
            index_name: opt_text(row, "index_name")?,
            fragmentation_percent,
            page_count: integer(row, "page_count")?,
            total_reads: integer(row, "total_reads")?,
            total_writes: integer(row, "total_writes")?,
            last_seek: timestamp(row, "last_seek")?,
            maintenance_action: MaintenanceAction::from_fragmentation(fragmentation_percent),
        })
    }
}

/// How well an index earns its maintenance cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexUsageVerdict {
    Unused,
    ScanOnly,
    HighUpdateCost,
    Effective,
}

impl IndexUsageVerdict {
    /// Classifies user-access counters; an index with no usage entry counts as unused
    pub fn classify(seeks: i64, scans: i64, lookups: i64, updates: i64) -> Self {
        if seeks == 0 && scans == 0 && lookups == 0 {
            Self::Unused
        } else if seeks == 0 && scans > 0 {
            Self::ScanOnly
        } else if updates > (seeks + scans + lookups).saturating_mul(10) {
            Self::HighUpdateCost
        } else {
            Self::Effective
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Unused => "Consider dropping this unused index",
            Self::ScanOnly => "Index is only being scanned, might need optimization",
            Self::HighUpdateCost => "High update cost relative to reads, consider redesigning",
            Self::Effective => "Index is being used effectively",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnusedIndex {
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub index_type: String,
    pub user_seeks: i64,
    pub user_scans: i64,
    pub user_lookups: i64,
    pub user_updates: i64,
    pub recommendation: IndexUsageVerdict,
    pub drop_statement: String,
}

impl FromRow for UnusedIndex {
    fn from_row(row: &Row) -> Result<Self> {
        let schema_name = text(row, "schema_name")?;
        let table_name = text(row, "table_name")?;
        let index_name = text(row, "index_name")?;
        let user_seeks = integer(row, "user_seeks")?;
        let user_scans = integer(row, "user_scans")?;
        let user_lookups = integer(row, "user_lookups")?;
        let user_updates = integer(row, "user_updates")?;

        Ok(Self {
            database_name: text(row, "database_name")?,
            index_type: text(row, "index_type")?,
            drop_statement: format!(
                "DROP INDEX {} ON {}.{}",
                quote_identifier(&index_name),
                quote_identifier(&schema_name),
                quote_identifier(&table_name)
            ),
            recommendation: IndexUsageVerdict::classify(
                user_seeks,
                user_scans,
                user_lookups,
                user_updates,
            ),
            schema_name,
            table_name,
            index_name,
            user_seeks,
            user_scans,
            user_lookups,
            user_updates,
        })
    }
}

/// One column of one index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexColumn {
    pub database_name: String,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub object_id: i64,
    pub index_id: i64,
    pub index_name: String,
    pub column_name: String,
    pub key_ordinal: i64,
    pub is_included: bool,
}

impl FromRow for IndexColumn {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            database_name: text(row, "database_name")?,
            schema_name: opt_text(row, "schema_name")?,
            table_name: text(row, "table_name")?,
            object_id: integer(row, "object_id")?,
            index_id: integer(row, "index_id")?,
            index_name: text(row, "index_name")?,
            column_name: text(row, "column_name")?,
            key_ordinal: integer(row, "key_ordinal")?,
            is_included: flag(row, "is_included")?,
        })
    }
}

/// How two indexes on the same table relate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// Same key columns in the same order
    Exact,
    /// One index's keys are a leading prefix of the other's
    Overlapping,
}

impl DuplicateKind {
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Exact => "Duplicate indexes - identical key columns",
            Self::Overlapping => "Potential duplicate or overlapping indexes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateIndex {
    pub database_name: String,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub index1: String,
    pub index2: String,
    pub index1_columns: String,
    pub index1_included: String,
    pub index2_columns: String,
    pub index2_included: String,
    pub kind: DuplicateKind,
    pub suggestion: String,
}

struct IndexShape<'a> {
    name: &'a str,
    keys: Vec<(i64, &'a str)>,
    included: Vec<&'a str>,
}

impl IndexShape<'_> {
    fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|(_, name)| *name).collect()
    }
}

/// Finds index pairs whose ordered key columns are equal or a leading prefix
///
/// Pairs are reported once, lower `index_id` first, in input order of the
/// tables. Indexes without key columns never match.
pub fn find_duplicate_indexes(columns: &[IndexColumn]) -> Vec<DuplicateIndex> {
    // (database, object_id) -> index_id -> shape
    let mut tables: IndexMap<(&str, i64), IndexMap<i64, IndexShape<'_>>> = IndexMap::new();
    let mut owners: IndexMap<(&str, i64), &IndexColumn> = IndexMap::new();

    for column in columns {
        let key = (column.database_name.as_str(), column.object_id);
        owners.entry(key).or_insert(column);
        let shape = tables
            .entry(key)
            .or_default()
            .entry(column.index_id)
            .or_insert_with(|| IndexShape {
                name: column.index_name.as_str(),
                keys: Vec::new(),
                included: Vec::new(),
            });
        if column.is_included {
            shape.included.push(column.column_name.as_str());
        } else if column.key_ordinal > 0 {
            shape.keys.push((column.key_ordinal, column.column_name.as_str()));
        }
    }

    let mut duplicates = Vec::new();
    for (key, indexes) in &mut tables {
        let Some(owner) = owners.get(key) else {
            continue;
        };
        indexes.sort_keys();
        for shape in indexes.values_mut() {
            shape.keys.sort_by_key(|(ordinal, _)| *ordinal);
        }

        let shapes: Vec<&IndexShape<'_>> = indexes.values().collect();
        for (i, first) in shapes.iter().enumerate() {
            for second in &shapes[i + 1..] {
                let (a, b) = (first.key_names(), second.key_names());
                if a.is_empty() || b.is_empty() {
                    continue;
                }
                let kind = if a == b {
                    DuplicateKind::Exact
                } else if a.starts_with(&b) || b.starts_with(&a) {
                    DuplicateKind::Overlapping
                } else {
                    continue;
                };

                duplicates.push(DuplicateIndex {
                    database_name: owner.database_name.clone(),
                    schema_name: owner.schema_name.clone(),
                    table_name: owner.table_name.clone(),
                    index1: first.name.to_string(),
                    index2: second.name.to_string(),
                    index1_columns: a.join(", "),
                    index1_included: first.included.join(", "),
                    index2_columns: b.join(", "),
                    index2_included: second.included.join(", "),
                    kind,
                    suggestion: kind.suggestion().to_string(),
                });
            }
        }
    }

    duplicates
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingIndex {
    pub database_name: String,
    pub table_name: String,
    pub table_reference: String,
    pub equality_columns: Option<String>,
    pub inequality_columns: Option<String>,
    pub included_columns: Option<String>,
    pub number_of_compiles: i64,
    pub number_of_scans: i64,
    pub avg_query_cost_reduction: f64,
    pub avg_pct_benefit: f64,
    pub index_advantage: f64,
    pub create_index_statement: String,
}

impl MissingIndex {
    fn create_statement(
        table_name: &str,
        table_reference: &str,
        rank: i64,
        equality: Option<&str>,
        inequality: Option<&str>,
        included: Option<&str>,
    ) -> String {
        let keys: Vec<&str> = [equality, inequality].into_iter().flatten().collect();
        let mut statement = format!(
            "CREATE INDEX {} ON {} ({})",
            quote_identifier(&format!("IX_{}_Missing_{}", table_name, rank)),
            table_reference,
            keys.join(", ")
        );
        if let Some(included) = included {
            statement.push_str(&format!(" INCLUDE ({})", included));
        }
        statement
    }
}

impl FromRow for MissingIndex {
    fn from_row(row: &Row) -> Result<Self> {
        let table_name = text(row, "table_name")?;
        let table_reference = text(row, "table_reference")?;
        let equality_columns = opt_text(row, "equality_columns")?;
        let inequality_columns = opt_text(row, "inequality_columns")?;
        let included_columns = opt_text(row, "included_columns")?;
        let create_index_statement = Self::create_statement(
            &table_name,
            &table_reference,
            integer(row, "index_rank")?,
            equality_columns.as_deref(),
            inequality_columns.as_deref(),
            included_columns.as_deref(),
        );

        Ok(Self {
            database_name: text(row, "database_name")?,
            table_name,
            table_reference,
            equality_columns,
            inequality_columns,
            included_columns,
            number_of_compiles: integer(row, "number_of_compiles")?,
            number_of_scans: integer(row, "number_of_scans")?,
            avg_query_cost_reduction: number(row, "avg_query_cost_reduction")?,
            avg_pct_benefit: number(row, "avg_pct_benefit")?,
            index_advantage: number(row, "index_advantage")?,
            create_index_statement,
        })
    }
}

//! Core value and row types

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use uuid::Uuid;

/// A value read from or bound to a SQL Server column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (BIT)
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// Character data, including XML columns
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UNIQUEIDENTIFIER
    Uuid(Uuid),
    /// Date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (normalised to UTC)
    DateTimeUtc(DateTime<Utc>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    ///
    /// Integer and decimal columns widen; DMV arithmetic often comes back as
    /// NUMERIC even when the query divides by a float literal.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int16(v) => Some(*v != 0),
            Value::Int32(v) => Some(*v != 0),
            Value::Int64(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to get as a naive timestamp
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(v) => Some(*v),
            Value::DateTimeUtc(v) => Some(v.naive_utc()),
            Value::Date(v) => v.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
        }
    }
}

/// A row from a query result
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names
    columns: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Non-null string value of a column, if any
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get_by_name(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Numeric value of a column widened to f64
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get_by_name(name).and_then(Value::as_f64)
    }

    /// Integer value of a column
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get_by_name(name).and_then(Value::as_i64)
    }

    /// Boolean value of a column
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_by_name(name).and_then(Value::as_bool)
    }

    /// Timestamp value of a column
    pub fn get_datetime(&self, name: &str) -> Option<NaiveDateTime> {
        self.get_by_name(name).and_then(Value::as_datetime)
    }

    /// Convert to a HashMap
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(self.values.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    /// Column name
    #[serde(default)]
    pub name: String,
    /// Data type (driver-specific string)
    #[serde(default)]
    pub data_type: String,
    /// Whether the column can be NULL
    #[serde(default)]
    pub nullable: bool,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

/// Query result
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Unique query ID
    pub id: Uuid,
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows affected (for DML statements)
    pub affected_rows: u64,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            execution_time_ms: 0,
        }
    }

    /// Build a result from column names and row values
    pub fn from_rows(column_names: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = column_names.iter().map(|c| c.to_string()).collect();
        let columns = names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| ColumnMeta {
                name: name.clone(),
                nullable: true,
                ordinal,
                ..Default::default()
            })
            .collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(names.clone(), values))
            .collect();
        Self {
            columns,
            rows,
            ..Self::empty()
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Result of a statement that does not return rows
#[derive(Debug, Clone)]
pub struct StatementResult {
    /// Rows affected
    pub affected_rows: u64,
}

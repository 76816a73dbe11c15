//! Typed decoding of result rows

use chrono::NaiveDateTime;
use sqlmon_core::{Result, Row, SqlmonError, Value};

/// Decodes one result row into a typed value
///
/// Every built-in diagnostic has a row struct implementing this trait. The
/// untyped [`Row`] implements it too, for ad hoc queries.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

fn column<'a>(row: &'a Row, name: &str) -> Result<&'a Value> {
    row.get_by_name(name)
        .ok_or_else(|| SqlmonError::Decode(format!("missing column '{}'", name)))
}

fn mismatch(name: &str, expected: &str, value: &Value) -> SqlmonError {
    SqlmonError::Decode(format!(
        "column '{}' is not {}: {}",
        name, expected, value
    ))
}

/// Reads a non-null column as text
pub fn text(row: &Row, name: &str) -> Result<String> {
    opt_text(row, name)?
        .ok_or_else(|| SqlmonError::Decode(format!("column '{}' is NULL", name)))
}

/// Reads a nullable column as text
pub fn opt_text(row: &Row, name: &str) -> Result<Option<String>> {
    Ok(match column(row, name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

/// Reads a numeric column, treating NULL as zero
pub fn number(row: &Row, name: &str) -> Result<f64> {
    let value = column(row, name)?;
    if value.is_null() {
        return Ok(0.0);
    }
    value
        .as_f64()
        .ok_or_else(|| mismatch(name, "numeric", value))
}

/// Reads an integer column, treating NULL as zero
pub fn integer(row: &Row, name: &str) -> Result<i64> {
    let value = column(row, name)?;
    if value.is_null() {
        return Ok(0);
    }
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|v| v as i64))
        .ok_or_else(|| mismatch(name, "an integer", value))
}

/// Reads a bit column, treating NULL as false
pub fn flag(row: &Row, name: &str) -> Result<bool> {
    let value = column(row, name)?;
    if value.is_null() {
        return Ok(false);
    }
    value
        .as_bool()
        .ok_or_else(|| mismatch(name, "a bit", value))
}

/// Reads a nullable timestamp column
pub fn timestamp(row: &Row, name: &str) -> Result<Option<NaiveDateTime>> {
    let value = column(row, name)?;
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_datetime()
        .map(Some)
        .ok_or_else(|| mismatch(name, "a timestamp", value))
}

#[cfg(test)]
mod tests;

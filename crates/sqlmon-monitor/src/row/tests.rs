//! Tests for typed row decoding

use super::*;
use chrono::NaiveDate;
use sqlmon_core::QueryResult;

fn sample() -> Row {
    let result = QueryResult::from_rows(
        &["name", "note", "reads", "ratio", "enabled", "seen_at", "empty"],
        vec![vec![
            Value::String("Orders".into()),
            Value::Null,
            Value::Int64(42),
            Value::Decimal("12.50".into()),
            Value::Bool(true),
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(8, 30, 0)
                    .unwrap(),
            ),
            Value::Null,
        ]],
    );
    result.rows.into_iter().next().unwrap()
}

#[test]
fn test_text_reads_strings() {
    let row = sample();
    assert_eq!(text(&row, "name").unwrap(), "Orders");
    assert_eq!(text(&row, "reads").unwrap(), "42");
}

#[test]
fn test_text_rejects_null() {
    let err = text(&sample(), "note").unwrap_err();
    assert!(matches!(err, SqlmonError::Decode(_)));
    assert!(err.to_string().contains("note"));
}

#[test]
fn test_missing_column_is_decode_error() {
    let row = sample();
    assert!(matches!(opt_text(&row, "nope"), Err(SqlmonError::Decode(_))));
    assert!(matches!(number(&row, "nope"), Err(SqlmonError::Decode(_))));
    assert!(matches!(timestamp(&row, "nope"), Err(SqlmonError::Decode(_))));
}

#[test]
fn test_nullable_helpers_default() {
    let row = sample();
    assert_eq!(opt_text(&row, "note").unwrap(), None);
    assert_eq!(number(&row, "empty").unwrap(), 0.0);
    assert_eq!(integer(&row, "empty").unwrap(), 0);
    assert!(!flag(&row, "empty").unwrap());
    assert_eq!(timestamp(&row, "empty").unwrap(), None);
}

#[test]
fn test_numeric_widening() {
    let row = sample();
    assert_eq!(number(&row, "reads").unwrap(), 42.0);
    assert_eq!(number(&row, "ratio").unwrap(), 12.5);
    assert_eq!(integer(&row, "ratio").unwrap(), 12);
    assert!(flag(&row, "enabled").unwrap());
}

#[test]
fn test_type_mismatch() {
    let err = number(&sample(), "name").unwrap_err();
    assert!(err.to_string().contains("not numeric"));
}

#[test]
fn test_timestamp() {
    let seen = timestamp(&sample(), "seen_at").unwrap().unwrap();
    assert_eq!(seen.to_string(), "2024-03-01 08:30:00");
}

#[test]
fn test_untyped_row_passthrough() {
    let row = sample();
    assert_eq!(Row::from_row(&row).unwrap(), row);
}

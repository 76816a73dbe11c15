//! Tests for SQL Server connection module

use crate::connection::{
    column_data_to_value, values_to_tiberius_params, MssqlConnectionError, TiberiusParam,
};
use chrono::{NaiveDate, NaiveTime};
use sqlmon_core::{SqlmonError, Value};
use std::borrow::Cow;
use std::time::Duration;
use tiberius::{ColumnData, ToSql};

// Value conversion tests

#[test]
fn test_values_to_tiberius_params_keeps_order_and_length() {
    let params = values_to_tiberius_params(&[
        Value::Null,
        Value::Bool(true),
        Value::Int16(1000),
        Value::Int32(100000),
        Value::Int64(30),
        Value::Float64(std::f64::consts::PI),
        Value::String("Sales".to_string()),
    ]);
    assert_eq!(params.len(), 7);
    assert!(matches!(params[4], TiberiusParam::I64(30)));
    assert!(matches!(&params[6], TiberiusParam::String(s) if s == "Sales"));
}

#[test]
fn test_temporal_values_bind_as_strings() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let params = values_to_tiberius_params(&[
        Value::Date(date),
        Value::Decimal("123.456".to_string()),
    ]);
    assert!(matches!(&params[0], TiberiusParam::String(s) if s == "2024-01-15"));
    assert!(matches!(&params[1], TiberiusParam::String(s) if s == "123.456"));
}

#[test]
fn test_tiberius_param_to_sql() {
    assert!(matches!(TiberiusParam::Null.to_sql(), ColumnData::I32(None)));
    assert!(matches!(
        TiberiusParam::I64(1234567890).to_sql(),
        ColumnData::I64(Some(1234567890))
    ));
    assert!(matches!(
        TiberiusParam::Bool(true).to_sql(),
        ColumnData::Bit(Some(true))
    ));
    match TiberiusParam::String("hello".to_string()).to_sql() {
        ColumnData::String(Some(s)) => assert_eq!(s, "hello"),
        other => panic!("unexpected column data: {other:?}"),
    }
}

// Column data conversion tests

#[test]
fn test_column_data_nulls_map_to_null() {
    for data in [
        ColumnData::I32(None),
        ColumnData::String(None),
        ColumnData::F64(None),
        ColumnData::Numeric(None),
        ColumnData::Xml(None),
    ] {
        assert_eq!(column_data_to_value(data).unwrap(), Value::Null);
    }
}

#[test]
fn test_column_data_scalars() {
    assert_eq!(
        column_data_to_value(ColumnData::I32(Some(42))).unwrap(),
        Value::Int32(42)
    );
    assert_eq!(
        column_data_to_value(ColumnData::U8(Some(7))).unwrap(),
        Value::Int32(7)
    );
    assert_eq!(
        column_data_to_value(ColumnData::Bit(Some(true))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        column_data_to_value(ColumnData::String(Some(Cow::Owned("hello".to_string())))).unwrap(),
        Value::String("hello".to_string())
    );
}

#[test]
fn test_column_data_date() {
    // 738_899 days after 0001-01-01
    let value = column_data_to_value(ColumnData::Date(Some(tiberius::time::Date::new(738_899))))
        .unwrap();
    let expected = NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .checked_add_signed(chrono::Duration::days(738_899))
        .unwrap();
    assert_eq!(value, Value::Date(expected));
}

#[test]
fn test_column_data_time_respects_scale() {
    // 12:30:15.5 at scale 7 (100ns increments)
    let increments = (12 * 3600 + 30 * 60 + 15) * 10_000_000 + 5_000_000;
    let value =
        column_data_to_value(ColumnData::Time(Some(tiberius::time::Time::new(increments, 7))))
            .unwrap();
    assert_eq!(
        value,
        Value::Time(NaiveTime::from_hms_milli_opt(12, 30, 15, 500).unwrap())
    );

    // Same instant at scale 3 (millisecond increments)
    let increments = (12 * 3600 + 30 * 60 + 15) * 1_000 + 500;
    let value =
        column_data_to_value(ColumnData::Time(Some(tiberius::time::Time::new(increments, 3))))
            .unwrap();
    assert_eq!(
        value,
        Value::Time(NaiveTime::from_hms_milli_opt(12, 30, 15, 500).unwrap())
    );
}

// Error conversion tests

#[test]
fn test_mssql_error_conversion() {
    let err: SqlmonError = MssqlConnectionError::ConnectionClosed.into();
    assert!(matches!(err, SqlmonError::Driver(_)));

    let err: SqlmonError = MssqlConnectionError::QueryFailed("Invalid object name".into()).into();
    assert!(matches!(err, SqlmonError::Query(_)));

    let err: SqlmonError = MssqlConnectionError::ConnectionFailed("refused".into()).into();
    assert!(matches!(err, SqlmonError::Connection(msg) if msg.contains("refused")));

    let err: SqlmonError = MssqlConnectionError::Timeout(Duration::from_secs(5)).into();
    assert!(matches!(err, SqlmonError::Timeout(_)));

    let err: SqlmonError = MssqlConnectionError::TypeConversion("bad date".into()).into();
    assert!(matches!(err, SqlmonError::Decode(_)));
}

#[test]
fn test_mssql_error_display() {
    let err = MssqlConnectionError::ConnectionFailed("test".to_string());
    assert!(err.to_string().contains("Connection failed"));

    let err = MssqlConnectionError::AuthenticationFailed("bad password".to_string());
    assert!(err.to_string().contains("Authentication failed"));

    let err = MssqlConnectionError::ConnectionClosed;
    assert!(err.to_string().contains("closed"));
}

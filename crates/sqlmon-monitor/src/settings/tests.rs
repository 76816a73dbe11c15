//! Tests for monitor settings

use super::*;
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_defaults() {
    let settings = MonitorSettings::default();
    assert_eq!(settings.long_running_threshold_secs, 30);
    assert_eq!(settings.refresh_interval(), Duration::from_secs(60));
    assert_eq!(settings.default_database, "master");
    assert_eq!(settings.parallel_workers, 1);
    assert_eq!(settings.expensive_query_limit, 10);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let settings = MonitorSettings::from_toml_str(
        r#"
        long_running_threshold_secs = 120
        parallel_workers = 4
        "#,
    )
    .unwrap();

    assert_eq!(settings.long_running_threshold(), Duration::from_secs(120));
    assert_eq!(settings.parallel_workers, 4);
    assert_eq!(settings.refresh_interval_secs, 60);
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = MonitorSettings::from_toml_str("refresh_interval_secs = 0").unwrap_err();
    assert!(matches!(err, MonitorError::Settings(_)));

    let err = MonitorSettings::from_toml_str("default_database = \"  \"").unwrap_err();
    assert!(err.to_string().contains("default_database"));
}

#[test]
fn test_malformed_toml() {
    let err = MonitorSettings::from_toml_str("parallel_workers = \"many\"").unwrap_err();
    assert!(matches!(err, MonitorError::Settings(_)));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "expensive_query_limit = 25").unwrap();

    let settings = MonitorSettings::load(file.path()).unwrap();
    assert_eq!(settings.expensive_query_limit, 25);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = MonitorSettings::load(&dir.path().join("monitor.toml")).unwrap();
    assert_eq!(settings, MonitorSettings::default());
}

#[test]
fn test_round_trip_through_toml() {
    let settings = MonitorSettings::default().with_parallel_workers(3);
    let text = toml::to_string(&settings).unwrap();
    assert_eq!(MonitorSettings::from_toml_str(&text).unwrap(), settings);
}

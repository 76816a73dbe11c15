use super::*;
use clap::CommandFactory;
use pretty_assertions::assert_eq;

fn parse(args: &[&str]) -> Args {
    let mut argv = vec!["sqlmon"];
    argv.extend_from_slice(args);
    Args::try_parse_from(argv).unwrap()
}

#[test]
fn test_command_definition_is_valid() {
    Args::command().debug_assert();
}

#[test]
fn test_connection_config_from_flags() {
    let args = parse(&[
        "--server",
        "db01",
        "--port",
        "14330",
        "--user",
        "monitor",
        "--password",
        "secret",
        "--trust-cert",
        "--query-timeout-secs",
        "30",
    ]);

    let config = args.connection_config("master");

    assert_eq!(config.host, "db01");
    assert_eq!(config.get_port(), 14330);
    assert_eq!(config.database.as_deref(), Some("master"));
    assert_eq!(config.username.as_deref(), Some("monitor"));
    assert_eq!(config.password.as_deref(), Some("secret"));
    assert_eq!(config.get_bool("trust_cert"), Some(true));
    assert_eq!(config.get_string("query_timeout_secs").as_deref(), Some("30"));
}

#[test]
fn test_without_credentials_or_trust() {
    let args = parse(&["--server", "db01"]);

    let config = args.connection_config("ops");

    assert_eq!(config.username, None);
    assert_eq!(config.get_bool("trust_cert"), None);
    assert_eq!(config.database.as_deref(), Some("ops"));
}

#[test]
fn test_overrides_replace_file_settings() {
    let args = parse(&["--database", "ops", "--workers", "4", "--threshold-secs", "90"]);

    let settings = args.apply_overrides(MonitorSettings::default()).unwrap();

    assert_eq!(settings.default_database, "ops");
    assert_eq!(settings.parallel_workers, 4);
    assert_eq!(settings.long_running_threshold_secs, 90);
}

#[test]
fn test_no_overrides_keep_file_settings() {
    let args = parse(&[]);
    let file_settings = MonitorSettings::default().with_default_database("reporting");

    let settings = args.apply_overrides(file_settings.clone()).unwrap();

    assert_eq!(settings, file_settings);
}

#[test]
fn test_zero_workers_rejected() {
    let args = parse(&["--workers", "0"]);

    assert!(args.apply_overrides(MonitorSettings::default()).is_err());
}

#[test]
fn test_plan_database_requires_plan() {
    let result = Args::try_parse_from(["sqlmon", "--plan-database", "sales"]);

    assert!(result.is_err());
}

#[test]
fn test_explicit_settings_path() {
    let args = parse(&["--config", "/etc/sqlmon.toml"]);

    assert_eq!(args.settings_path(), PathBuf::from("/etc/sqlmon.toml"));
}

//! Logging setup for the sqlmon binary
//!
//! Console output is always on. A JSON file layer with daily rotation can be
//! added for unattended runs. `RUST_LOG` takes precedence over the default
//! filter.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "sqlmon.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files; `None` disables the file layer
    pub json_log_dir: Option<PathBuf>,

    /// Whether to include file/line information in console output
    pub include_location: bool,

    /// Whether to log span open/close events
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_log_dir: None,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "info,sqlmon_monitor=info,sqlmon_driver_mssql=info,tiberius=warn"
                .to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration with span events
    pub fn verbose() -> Self {
        Self {
            enable_spans: true,
            default_filter: "debug,tiberius=info".to_string(),
            ..Self::default()
        }
    }

    /// Builder method: also write JSON logs into `dir`
    pub fn with_json_logs(mut self, dir: Option<PathBuf>) -> Self {
        self.json_log_dir = dir;
        self
    }
}

/// Default directory for JSON log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqlmon")
        .join("logs")
}

/// Installs the global subscriber
///
/// The returned guard flushes the JSON writer when dropped and must be kept
/// alive for as long as the program logs.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW rather than ENTER: ENTER fires on every re-poll of an awaited future.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if let Some(dir) = &config.json_log_dir {
        std::fs::create_dir_all(dir)?;
        let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        json_log_dir = ?config.json_log_dir,
        "logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_file_layer() {
        let config = LoggingConfig::default();
        assert!(config.json_log_dir.is_none());
        assert!(!config.enable_spans);
        assert!(config.default_filter.starts_with("info"));
    }

    #[test]
    fn test_verbose_config() {
        let config = LoggingConfig::verbose().with_json_logs(Some(PathBuf::from("/tmp/sqlmon")));
        assert!(config.enable_spans);
        assert!(config.default_filter.starts_with("debug"));
        assert_eq!(config.json_log_dir, Some(PathBuf::from("/tmp/sqlmon")));
    }

    #[test]
    fn test_log_directory_ends_with_app_name() {
        assert!(log_directory().ends_with("sqlmon/logs"));
    }
}

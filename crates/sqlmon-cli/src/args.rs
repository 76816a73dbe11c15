//! Command-line arguments
//!
//! Connection flags fall back to the `DB_*` environment variables.

use clap::Parser;
use sqlmon_core::ConnectionConfig;
use sqlmon_monitor::{MonitorResult, MonitorSettings};
use std::path::PathBuf;

/// SQL Server health monitor
#[derive(Debug, Parser)]
#[command(name = "sqlmon", version, about)]
pub struct Args {
    /// Server host name or address
    #[arg(long, env = "DB_SERVER", default_value = "localhost")]
    pub server: String,

    /// Server port
    #[arg(long, env = "DB_PORT", default_value_t = 1433)]
    pub port: u16,

    /// Database the connection starts in and returns to after each scan
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,

    /// SQL authentication login
    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    /// SQL authentication password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Accept the server certificate without validation
    #[arg(long, env = "DB_TRUST_CERT")]
    pub trust_cert: bool,

    /// Abort any single statement after this many seconds
    #[arg(long)]
    pub query_timeout_secs: Option<u64>,

    /// Monitor settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of connections used for per-database scans
    #[arg(long)]
    pub workers: Option<usize>,

    /// Long-running query threshold in seconds
    #[arg(long)]
    pub threshold_secs: Option<u64>,

    /// Take one snapshot and exit
    #[arg(long)]
    pub once: bool,

    /// Print each snapshot to stdout as JSON
    #[arg(long)]
    pub json: bool,

    /// Analyze the estimated plan of this query and exit
    #[arg(long, value_name = "SQL")]
    pub plan: Option<String>,

    /// Database to compile `--plan` in
    #[arg(long, requires = "plan")]
    pub plan_database: Option<String>,

    /// Write the plan graph as Graphviz DOT to this file
    #[arg(long, requires = "plan")]
    pub dot: Option<PathBuf>,

    /// Also write JSON logs with daily rotation into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Debug logging with span events
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Settings file path: `--config`, else `<config dir>/sqlmon/monitor.toml`
    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sqlmon")
                .join("monitor.toml")
        })
    }

    /// Applies command-line overrides to settings loaded from file
    pub fn apply_overrides(&self, mut settings: MonitorSettings) -> MonitorResult<MonitorSettings> {
        if let Some(database) = &self.database {
            settings = settings.with_default_database(database.clone());
        }
        if let Some(workers) = self.workers {
            settings = settings.with_parallel_workers(workers);
        }
        if let Some(threshold) = self.threshold_secs {
            settings = settings.with_long_running_threshold_secs(threshold);
        }
        settings.validate()
    }

    /// Connection configuration that opens in `default_database`
    pub fn connection_config(&self, default_database: &str) -> ConnectionConfig {
        let mut config =
            ConnectionConfig::new(&self.server, self.port).with_database(default_database);
        if let Some(user) = &self.user {
            config = config.with_credentials(user.clone(), self.password.clone().unwrap_or_default());
        }
        if self.trust_cert {
            config = config.with_param("trust_cert", true);
        }
        if let Some(secs) = self.query_timeout_secs {
            config = config.with_param("query_timeout_secs", secs);
        }
        config
    }
}

#[cfg(test)]
mod tests;

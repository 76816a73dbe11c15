//! sqlmon - SQL Server health monitor
//!
//! Takes diagnostic snapshots of one SQL Server instance, either once or on
//! an interval, and logs a summary of every section.

mod args;
mod logging;

use anyhow::Context;
use args::Args;
use clap::Parser;
use logging::LoggingConfig;
use sqlmon_core::ConnectionFactory;
use sqlmon_driver_mssql::MssqlConnectionFactory;
use sqlmon_monitor::{MonitorSettings, MonitorSnapshot, ServerMonitor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logging = if args.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    let _log_guard = logging::init(&logging.with_json_logs(args.log_dir.clone()))?;

    let settings_path = args.settings_path();
    let settings = MonitorSettings::load(&settings_path)
        .with_context(|| format!("Failed to load {}", settings_path.display()))?;
    let settings = args.apply_overrides(settings)?;
    tracing::debug!(?settings, "monitor settings");

    let factory = Arc::new(MssqlConnectionFactory::new(
        args.connection_config(&settings.default_database),
    ));
    let connection = factory
        .create()
        .await
        .with_context(|| format!("Failed to connect to {}:{}", args.server, args.port))?;
    tracing::info!(server = %args.server, database = %settings.default_database, "connected");

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let monitor = ServerMonitor::new(connection.clone(), settings)
        .with_factory(factory)
        .with_cancellation(cancel.clone());

    let result = match &args.plan {
        Some(query) => analyze_plan(&monitor, query, &args).await,
        None => run_sweeps(&monitor, &args, &cancel).await,
    };

    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
    result
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current diagnostic");
            cancel.cancel();
        }
    });
}

async fn analyze_plan(monitor: &ServerMonitor, query: &str, args: &Args) -> anyhow::Result<()> {
    let analysis = monitor
        .analyze_execution_plan(query, args.plan_database.as_deref())
        .await?;

    if let Some(error) = &analysis.parse_error {
        tracing::warn!(%error, "plan could not be decoded");
    }
    tracing::info!(
        operators = analysis.metrics.len(),
        max_cost = analysis.max_cost(),
        "plan analyzed"
    );
    for row in &analysis.metrics {
        tracing::info!(
            operation = %row.operation,
            estimated_cost = row.estimated_cost,
            estimated_rows = row.estimated_rows,
            "plan operator"
        );
    }
    for finding in &analysis.findings {
        tracing::info!(kind = ?finding.kind, "{}", finding);
    }

    if let (Some(path), Some(graph)) = (&args.dot, &analysis.graph) {
        std::fs::write(path, graph.to_dot())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), nodes = graph.node_count(), "plan graph written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    }
    Ok(())
}

async fn run_sweeps(
    monitor: &ServerMonitor,
    args: &Args,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let interval = monitor.settings().refresh_interval();

    loop {
        let snapshot = monitor.snapshot().await;
        report(&snapshot);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        if args.once || cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("monitor stopped");
    Ok(())
}

fn report(snapshot: &MonitorSnapshot) {
    tracing::info!(
        taken_at = %snapshot.taken_at,
        elapsed_ms = snapshot.elapsed.as_millis() as u64,
        failed_sections = snapshot.failed_sections(),
        skipped_sections = snapshot.skipped_sections(),
        "snapshot complete"
    );
    for (section, summary) in snapshot.summaries() {
        tracing::info!(section, "{}", summary);
    }
    for highlight in snapshot.highlights() {
        tracing::warn!("{}", highlight);
    }
}

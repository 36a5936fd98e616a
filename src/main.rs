use anyhow::{Context, Result};
use clap::Parser;
use safetytwin_agent::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "safetytwin-agent", version, about = "Host telemetry agent")]
struct Cli {
    /// Config file (default: $CONFIG_FILE, then ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collect one snapshot, write it to this path and exit
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indent JSON written with --output
    #[arg(long, requires = "output")]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = config::AppConfig::load(cli.config.as_deref())?;

    let default_level = if app_config.logging.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    tracing::info!(version = version::VERSION, "{} starting", version::NAME);

    if let Some(output) = cli.output {
        return run_single(&app_config, output, cli.pretty).await;
    }

    let pipeline = pipeline::build_pipeline(&app_config)?;
    tracing::info!(
        endpoint = %app_config.delivery.endpoint,
        interval_secs = app_config.agent.interval_secs,
        state_dir = %app_config.retention.state_dir.display(),
        "agent running"
    );

    let handle = worker::spawn(
        pipeline,
        worker::WorkerConfig {
            interval: app_config.agent.interval(),
            shutdown_grace: app_config.agent.shutdown_grace(),
            stats_log_interval: app_config.agent.stats_log_interval(),
        },
    );

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    let stats = handle.stop().await.context("scheduler task failed")?;
    tracing::info!(
        cycles = stats.cycles,
        persisted = stats.persisted,
        delivered = stats.delivered,
        "agent exited"
    );
    Ok(())
}

async fn run_single(app_config: &config::AppConfig, output: PathBuf, pretty: bool) -> Result<()> {
    let aggregator = pipeline::build_aggregator(app_config)?;
    let (snapshot, failures) = aggregator.build_snapshot().await;
    for f in &failures {
        tracing::warn!(source = f.source, error = %f.error, "source failed");
    }
    let body = if pretty {
        serde_json::to_vec_pretty(&snapshot)?
    } else {
        serde_json::to_vec(&snapshot)?
    };
    tokio::fs::write(&output, body)
        .await
        .map_err(|e| anyhow::anyhow!("write {}: {}", output.display(), e))?;
    tracing::info!(
        path = %output.display(),
        processes = snapshot.processes.len(),
        related_processes = snapshot.related_process_count(),
        services = snapshot.services.len(),
        related_services = snapshot.related_service_count(),
        "snapshot written"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

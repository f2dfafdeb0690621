use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use deal_watcher::config::{AppConfig, LoggingConfig, MetricsConfig};
use deal_watcher::scheduler::WatchScheduler;
use deal_watcher::RunOrchestrator;

#[derive(Parser)]
#[command(name = "deal-watcher", version)]
#[command(about = "Track clearance listings and report new items and price changes")]
struct Cli {
    /// Configuration file to use instead of the config/ directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one run and exit
    Run,

    /// Run on the configured cron schedule until interrupted
    Watch {
        /// Also run once right away
        #[arg(long)]
        now: bool,
    },

    /// List configured sources
    Sources,

    /// Load and validate the configuration
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deal_watcher=info"));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config.listen.parse().context("invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

async fn run_once(config: &AppConfig) -> Result<()> {
    let orchestrator = RunOrchestrator::from_config(config).await?;

    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let summary = orchestrator.run_until(interrupted).await?;

    info!(
        "Done: {} new, {} updated, {}/{} sources failed",
        summary.new_count, summary.updated_count, summary.sources_failed, summary.sources_attempted
    );
    Ok(())
}

async fn watch(config: &AppConfig, now: bool) -> Result<()> {
    let orchestrator = Arc::new(RunOrchestrator::from_config(config).await?);
    info!("Watching sources: {}", orchestrator.source_ids().join(", "));
    let mut scheduler = WatchScheduler::new(Arc::clone(&orchestrator), config.scheduler.clone()).await?;
    scheduler.start().await?;

    if now {
        if let Some(Err(e)) = scheduler.run_now().await {
            warn!("Initial run failed: {}", e);
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.shutdown().await?;

    let stats = scheduler.stats().await;
    info!(
        "Watched {} runs ({} failed, {} skipped)",
        stats.completed_runs + stats.failed_runs,
        stats.failed_runs,
        stats.skipped_runs
    );
    Ok(())
}

fn list_sources(config: &AppConfig) {
    if config.sources.is_empty() {
        println!("No sources configured");
        return;
    }

    for source in &config.sources {
        let state = if source.enabled { "enabled" } else { "disabled" };
        println!("{:<20} {:<9} {}", source.id, state, source.page_url);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_tracing(&config.logging);

    match cli.command {
        Commands::Run => {
            init_metrics(&config.metrics)?;
            run_once(&config).await?;
        }
        Commands::Watch { now } => {
            init_metrics(&config.metrics)?;
            info!("Starting Deal Watcher...");
            watch(&config, now).await?;
        }
        Commands::Sources => list_sources(&config),
        Commands::CheckConfig { print } => {
            if print {
                println!("{}", toml::to_string_pretty(&config).context("failed to render configuration")?);
            }
            println!(
                "Configuration OK: {} sources ({} enabled), {:?} storage, schedule '{}'",
                config.sources.len(),
                config.enabled_sources().count(),
                config.storage.backend,
                config.scheduler.schedule
            );
        }
    }

    Ok(())
}

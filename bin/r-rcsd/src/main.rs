//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "binary"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Binary entrypoint for the R-RCS daemon."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use r_rcs_common::config::{AppConfig, ConfigError};
use r_rcs_common::logging::init_tracing;
use r_rcs_core::CommandScheduler;
use r_rcs_device::ExecDeviceClient;
use r_rcs_metrics::{
    new_registry, spawn_http_server, write_textfile, DaemonMetrics, SchedulerMetrics,
    SharedRegistry,
};
use tokio::signal;
use tracing::{info, warn};

const CONFIG_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "R-RCS daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the command scheduler")]
    Run,
    #[command(about = "Load and validate configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let load_started = Instant::now();
    let loaded_config = match AppConfig::load_with_source(&candidates) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };
    let config = loaded_config.config;
    let config_path = loaded_config.source;
    let load_duration = load_started.elapsed();

    init_tracing("r-rcsd", &config.logging)?;
    info!(config_path = %config_path.display(), adapters = config.adapters.len(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let metrics_registry = new_registry();
            let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
            daemon_metrics.observe_config_load(load_duration.as_secs_f64());
            daemon_metrics.inc_start();
            daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"));

            run_daemon(config, metrics_registry).await?;
        }
        Commands::CheckConfig => {
            println!(
                "Config: {}\nAdapters: {}\nSetpoint: {:.1} V / {:.1} %\nCycle interval: {} s",
                config_path.display(),
                config
                    .adapters
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                config.setpoint.voltage,
                config.setpoint.current_percent,
                config.scheduler.cycle_interval.as_secs(),
            );
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig, metrics_registry: SharedRegistry) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let require_configured = config.scheduler.require_configured;

    let metrics_server = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(
            metrics_registry.clone(),
            metrics_settings.listen,
        )?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let client = Arc::new(ExecDeviceClient::new(config.device.clone()));
    let scheduler_metrics = SchedulerMetrics::new(metrics_registry.clone())?;
    let scheduler = match CommandScheduler::from_config(&config, client) {
        Ok(scheduler) => scheduler.with_metrics(scheduler_metrics),
        Err(err @ ConfigError::NoAdapters) | Err(err @ ConfigError::ZeroInterval) => {
            eprintln!("configuration error: {err}");
            std::process::exit(CONFIG_EXIT_CODE);
        }
        Err(err) => return Err(err.into()),
    };

    match scheduler.initialize().await {
        Ok(()) => info!("initialization pass complete"),
        Err(faults) => {
            for fault in &faults {
                warn!(adapter = %fault.adapter, error = %fault.error, "adapter failed initialization");
            }
            if require_configured {
                bail!(
                    "{} adapter(s) failed configuration and require_configured is set",
                    faults.len()
                );
            }
        }
    }

    let handle = scheduler.start();

    let textfile_task = metrics_settings.textfile_path.clone().map(|path| {
        let registry = metrics_registry.clone();
        let mut reports = handle.reports();
        tokio::spawn(async move {
            while reports.changed().await.is_ok() {
                if let Err(err) = write_textfile(&registry, &path) {
                    warn!(error = %err, path = %path.display(), "textfile export failed");
                }
            }
        })
    });

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;

    if let Some(task) = textfile_task {
        // The watch sender is gone once the loop stopped; the task unblocks.
        let _ = task.await;
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

//! ---
//! rcs_section: "03-persistence-logging"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Metrics collection and export utilities."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub mod textfile;

pub use textfile::write_textfile;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "r_rcsd_starts_total",
            "Total number of times the R-RCS daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "r_rcsd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("r_rcsd_build_info", "Build metadata for the daemon"),
            &["version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str) {
        self.build_info.with_label_values(&[version]).set(1.0);
    }
}

/// Metrics emitted by the command scheduler: cycle counts, per-adapter
/// command outcomes, and the current degraded-adapter gauge an operator
/// watches to detect total device loss.
#[derive(Clone)]
pub struct SchedulerMetrics {
    cycles_total: IntCounter,
    commands_total: IntCounterVec,
    command_attempts_total: IntCounterVec,
    configure_failures_total: IntCounterVec,
    degraded_adapters: IntGauge,
}

impl SchedulerMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let cycles_total = IntCounter::with_opts(Opts::new(
            "r_rcs_cycles_total",
            "Completed setpoint cycles over all adapters",
        ))?;
        registry.register(Box::new(cycles_total.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new(
                "r_rcs_commands_total",
                "Per-adapter cycle outcomes for setpoint commands",
            ),
            &["adapter", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_attempts_total = IntCounterVec::new(
            Opts::new(
                "r_rcs_command_attempts_total",
                "Apply attempts issued per adapter, including retries",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(command_attempts_total.clone()))?;

        let configure_failures_total = IntCounterVec::new(
            Opts::new(
                "r_rcs_configure_failures_total",
                "Configure failures recorded during the initialization pass",
            ),
            &["adapter"],
        )?;
        registry.register(Box::new(configure_failures_total.clone()))?;

        let degraded_adapters = IntGauge::with_opts(Opts::new(
            "r_rcs_degraded_adapters",
            "Adapters degraded in the most recent cycle",
        ))?;
        registry.register(Box::new(degraded_adapters.clone()))?;

        Ok(Self {
            cycles_total,
            commands_total,
            command_attempts_total,
            configure_failures_total,
            degraded_adapters,
        })
    }

    pub fn record_cycle(&self) {
        self.cycles_total.inc();
    }

    pub fn record_command(&self, adapter: &str, outcome: &str, attempts: usize) {
        self.commands_total
            .with_label_values(&[adapter, outcome])
            .inc();
        self.command_attempts_total
            .with_label_values(&[adapter])
            .inc_by(attempts as u64);
    }

    pub fn record_configure_failure(&self, adapter: &str) {
        self.configure_failures_total
            .with_label_values(&[adapter])
            .inc();
    }

    pub fn set_degraded(&self, count: usize) {
        self.degraded_adapters.set(count as i64);
    }
}

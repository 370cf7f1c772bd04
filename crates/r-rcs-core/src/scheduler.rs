//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Primary command scheduling and lifecycle management."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use r_rcs_common::config::{AppConfig, ConfigError};
use r_rcs_metrics::SchedulerMetrics;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::device::{DeviceClient, DeviceError};
use crate::policy::RetryPolicy;
use crate::registry::{Adapter, AdapterRegistry};
use crate::report::{AdapterFault, CycleOutcome, CycleReport, CycleResult};
use crate::setpoint::SetpointCommand;

/// Drives the initialization pass and the steady-state setpoint loop over
/// every adapter in the registry.
///
/// Adapters are processed sequentially in registry order; the bus behind each
/// adapter is half-duplex and a command is never in flight for the same
/// adapter twice. Cycle N+1 does not start before cycle N has finished or
/// been cancelled, bounding setpoint staleness to one cycle plus retry time.
pub struct CommandScheduler {
    client: Arc<dyn DeviceClient>,
    registry: AdapterRegistry,
    setpoint: SetpointCommand,
    overrides: HashMap<String, SetpointCommand>,
    policy: RetryPolicy,
    cycle_interval: Duration,
    metrics: Option<SchedulerMetrics>,
    rng_seed: Option<u64>,
}

impl std::fmt::Debug for CommandScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandScheduler")
            .field("setpoint", &self.setpoint)
            .field("overrides", &self.overrides)
            .field("policy", &self.policy)
            .field("cycle_interval", &self.cycle_interval)
            .field("rng_seed", &self.rng_seed)
            .finish_non_exhaustive()
    }
}

impl CommandScheduler {
    pub fn new(
        registry: AdapterRegistry,
        setpoint: SetpointCommand,
        policy: RetryPolicy,
        cycle_interval: Duration,
        client: Arc<dyn DeviceClient>,
    ) -> Result<Self, ConfigError> {
        if registry.is_empty() {
            return Err(ConfigError::NoAdapters);
        }
        if cycle_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self {
            client,
            registry,
            setpoint,
            overrides: HashMap::new(),
            policy,
            cycle_interval,
            metrics: None,
            rng_seed: None,
        })
    }

    /// Assemble a scheduler from loaded configuration, resolving per-adapter
    /// setpoint overrides.
    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn DeviceClient>,
    ) -> Result<Self, ConfigError> {
        let registry = AdapterRegistry::from_config(config)?;
        let setpoint = SetpointCommand::try_from(&config.setpoint)?;
        let policy = RetryPolicy::from_config(&config.scheduler);
        let mut scheduler = Self::new(
            registry,
            setpoint,
            policy,
            config.scheduler.cycle_interval,
            client,
        )?;
        for (adapter_id, adapter_cfg) in &config.adapters {
            if let Some(override_cfg) = &adapter_cfg.setpoint {
                scheduler
                    .overrides
                    .insert(adapter_id.clone(), SetpointCommand::try_from(override_cfg)?);
            }
        }
        Ok(scheduler)
    }

    pub fn with_metrics(mut self, metrics: SchedulerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Seed the backoff jitter RNG for deterministic testing.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    fn setpoint_for(&self, adapter_id: &str) -> SetpointCommand {
        self.overrides
            .get(adapter_id)
            .copied()
            .unwrap_or(self.setpoint)
    }

    /// One-time reconfiguration pass: exactly one configure call per adapter
    /// in registry order. A failing adapter never stops processing of the
    /// remaining ones; the aggregate fault list is returned to the caller.
    pub async fn initialize(&self) -> Result<(), Vec<AdapterFault>> {
        let mut faults = Vec::new();
        for adapter in self.registry.adapters() {
            match self.client.configure(adapter).await {
                Ok(()) => {
                    info!(adapter = %adapter, "adapter configured");
                }
                Err(err) => {
                    warn!(adapter = %adapter, error = %err, "adapter configure failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_configure_failure(adapter.id());
                    }
                    faults.push(AdapterFault {
                        adapter: adapter.id().to_owned(),
                        error: err,
                    });
                }
            }
        }
        if faults.is_empty() {
            Ok(())
        } else {
            Err(faults)
        }
    }

    /// Spawn the steady-state loop and return a handle for lifecycle control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let (report_tx, report_rx) = watch::channel(CycleReport::default());
        let task = tokio::spawn(self.run_loop(shutdown_rx, report_tx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            reports: report_rx,
        }
    }

    /// The steady-state loop: one pass over all adapters, publish the cycle
    /// report, pause, repeat. Shutdown is honoured between adapters and
    /// inside every sleep; an in-flight device command always runs to
    /// completion or failure.
    async fn run_loop(
        self,
        mut shutdown: broadcast::Receiver<()>,
        reports: watch::Sender<CycleReport>,
    ) {
        let mut rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut cycle: u64 = 0;
        info!(
            adapters = self.registry.len(),
            interval_s = self.cycle_interval.as_secs_f64(),
            setpoint = %self.setpoint,
            "command scheduler entering steady-state loop"
        );

        'steady: loop {
            cycle += 1;
            let mut results = Vec::with_capacity(self.registry.len());
            for adapter in self.registry.adapters() {
                if shutdown_requested(&mut shutdown) {
                    debug!(cycle, adapter = %adapter, "shutdown requested between adapters");
                    break 'steady;
                }
                let setpoint = self.setpoint_for(adapter.id());
                match drive_adapter(
                    self.client.as_ref(),
                    adapter,
                    setpoint,
                    &self.policy,
                    &mut rng,
                    &mut shutdown,
                )
                .await
                {
                    AdapterDrive::Completed(result) => {
                        info!(
                            cycle,
                            adapter = %result.adapter,
                            outcome = result.outcome.as_str(),
                            attempts = result.attempts,
                            "adapter cycle outcome"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_command(
                                &result.adapter,
                                result.outcome.as_str(),
                                result.attempts,
                            );
                        }
                        results.push(result);
                    }
                    AdapterDrive::Cancelled => {
                        debug!(cycle, adapter = %adapter, "shutdown requested during backoff");
                        break 'steady;
                    }
                }
            }

            let report = CycleReport { cycle, results };
            if let Some(metrics) = &self.metrics {
                metrics.record_cycle();
                metrics.set_degraded(report.degraded_count());
            }
            if report.is_healthy() {
                info!(cycle, adapters = report.results.len(), "cycle complete");
            } else {
                warn!(
                    cycle,
                    adapters = report.results.len(),
                    degraded = report.degraded_count(),
                    "cycle complete with degraded adapters"
                );
            }
            let _ = reports.send(report);

            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(cycle, "shutdown requested during inter-cycle pause");
                    break 'steady;
                }
                _ = sleep(self.cycle_interval) => {}
            }
        }

        info!(cycle, "command scheduler stopped");
    }
}

/// Handle returned from scheduler startup, used for report observation and
/// cooperative shutdown.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
    reports: watch::Receiver<CycleReport>,
}

impl SchedulerHandle {
    /// Watch channel carrying the most recent cycle report. The initial value
    /// is an empty report with cycle number 0.
    pub fn reports(&self) -> watch::Receiver<CycleReport> {
        self.reports.clone()
    }

    /// Signal shutdown and wait for the loop to finish its in-flight work.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|err| anyhow::anyhow!("scheduler task join failure: {}", err))
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) => true,
        Err(broadcast::error::TryRecvError::Empty) => false,
        // Lagged and Closed both mean the signal fired or the sender is gone.
        Err(_) => true,
    }
}

enum AdapterDrive {
    Completed(CycleResult),
    Cancelled,
}

/// Attempt sequence for one adapter within one cycle. Per-cycle state machine:
/// Pending -> Attempting -> {Success, RetryWait -> Attempting, Degraded}.
async fn drive_adapter(
    client: &dyn DeviceClient,
    adapter: &Adapter,
    setpoint: SetpointCommand,
    policy: &RetryPolicy,
    rng: &mut StdRng,
    shutdown: &mut broadcast::Receiver<()>,
) -> AdapterDrive {
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match client.apply(adapter, setpoint).await {
            Ok(()) => {
                debug!(adapter = %adapter, attempts, "setpoint applied");
                return AdapterDrive::Completed(CycleResult {
                    adapter: adapter.id().to_owned(),
                    outcome: CycleOutcome::Success,
                    attempts,
                });
            }
            Err(err @ DeviceError::Fatal(_)) => {
                warn!(adapter = %adapter, attempts, error = %err, "fatal device failure; adapter degraded for this cycle");
                return AdapterDrive::Completed(CycleResult {
                    adapter: adapter.id().to_owned(),
                    outcome: CycleOutcome::Degraded {
                        reason: err.reason().to_owned(),
                    },
                    attempts,
                });
            }
            Err(DeviceError::Transient(reason)) => {
                if attempts >= policy.max_attempts() {
                    warn!(adapter = %adapter, attempts, reason = %reason, "retries exhausted; adapter degraded for this cycle");
                    return AdapterDrive::Completed(CycleResult {
                        adapter: adapter.id().to_owned(),
                        outcome: CycleOutcome::Degraded { reason },
                        attempts,
                    });
                }
                let delay = policy.backoff_delay(attempts, rng);
                debug!(
                    adapter = %adapter,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "transient device failure; backing off"
                );
                tokio::select! {
                    _ = shutdown.recv() => return AdapterDrive::Cancelled,
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Shared primitives and utilities for the scheduler runtime."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;

/// Output voltage window accepted by the R48 rectifier family. Below 48 V the
/// fan ramps to full speed; outside the window the device rejects the command.
pub const VOLTAGE_RANGE: RangeInclusive<f64> = 41.0..=58.5;

/// Current limit window, in percent of the rated current from the datasheet.
pub const CURRENT_PERCENT_RANGE: RangeInclusive<f64> = 10.0..=121.0;

fn default_cycle_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_jitter() -> Duration {
    Duration::ZERO
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_voltage() -> f64 {
    51.0
}

fn default_current_percent() -> f64 {
    50.0
}

fn default_configure_command() -> Vec<Vec<String>> {
    vec![
        vec![
            "ip".into(),
            "link".into(),
            "set".into(),
            "{adapter}".into(),
            "type".into(),
            "can".into(),
            "bitrate".into(),
            "125000".into(),
            "restart-ms".into(),
            "1500".into(),
        ],
        vec!["ip".into(), "link".into(), "set".into(), "up".into(), "{adapter}".into()],
    ]
}

fn default_apply_command() -> Vec<Vec<String>> {
    vec![vec![
        "/usr/local/sbin/rectifier-set".into(),
        "{adapter}".into(),
        "{voltage}".into(),
        "{current}".into(),
    ]]
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

/// Typed configuration faults surfaced before the scheduler starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration must declare at least one adapter")]
    NoAdapters,
    #[error("adapter '{0}' is declared more than once")]
    DuplicateAdapter(String),
    #[error("scheduler cycle_interval must be greater than zero")]
    ZeroInterval,
    #[error("setpoint voltage {0} V outside supported range {min}..={max} V", min = VOLTAGE_RANGE.start(), max = VOLTAGE_RANGE.end())]
    VoltageOutOfRange(f64),
    #[error("setpoint current {0} % outside supported range {min}..={max} %", min = CURRENT_PERCENT_RANGE.start(), max = CURRENT_PERCENT_RANGE.end())]
    CurrentOutOfRange(f64),
    #[error("device {0} command template is empty")]
    EmptyCommand(&'static str),
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no configuration files found. inspected: {inspected}")]
    NotFound { inspected: String },
}

/// Primary configuration object for the R-RCS daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub setpoint: SetpointConfig,
    #[serde(default)]
    pub adapters: IndexMap<String, AdapterConfig>,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_RCS_CONFIG";

    /// Load configuration from disk, respecting the `R_RCS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, ConfigError> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(
        candidates: &[P],
    ) -> Result<LoadedAppConfig, ConfigError> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(ConfigError::NotFound {
            inspected: candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn from_path(path: PathBuf) -> Result<Self, ConfigError> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config =
            toml::from_str::<AppConfig>(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Effective setpoint for one adapter, honouring a per-adapter override.
    pub fn setpoint_for(&self, adapter_id: &str) -> &SetpointConfig {
        self.adapters
            .get(adapter_id)
            .and_then(|adapter| adapter.setpoint.as_ref())
            .unwrap_or(&self.setpoint)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapters.is_empty() {
            return Err(ConfigError::NoAdapters);
        }
        self.scheduler.validate()?;
        self.setpoint.validate()?;
        for adapter in self.adapters.values() {
            if let Some(setpoint) = &adapter.setpoint {
                setpoint.validate()?;
            }
        }
        self.device.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config =
            toml::from_str::<AppConfig>(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

/// Pacing and retry policy knobs for the command scheduler.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_cycle_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cycle_interval: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_base_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_jitter")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_jitter: Duration,
    /// When set, a configure failure during startup aborts the daemon instead
    /// of being reported and carried. Off by default: devices that fail setup
    /// often recover on a later cycle.
    #[serde(default)]
    pub require_configured: bool,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: default_cycle_interval(),
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            retry_jitter: default_retry_jitter(),
            require_configured: false,
        }
    }
}

/// Target operating point shared by all adapters unless overridden.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SetpointConfig {
    #[serde(default = "default_voltage")]
    pub voltage: f64,
    #[serde(default = "default_current_percent")]
    pub current_percent: f64,
}

impl SetpointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VOLTAGE_RANGE.contains(&self.voltage) {
            return Err(ConfigError::VoltageOutOfRange(self.voltage));
        }
        if !CURRENT_PERCENT_RANGE.contains(&self.current_percent) {
            return Err(ConfigError::CurrentOutOfRange(self.current_percent));
        }
        Ok(())
    }
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self {
            voltage: default_voltage(),
            current_percent: default_current_percent(),
        }
    }
}

/// Per-adapter declaration. Keys of the adapter table are the bus interface
/// names; table order is the cycle processing order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub setpoint: Option<SetpointConfig>,
}

/// External command templates used by the exec device client. `{adapter}`,
/// `{voltage}` and `{current}` placeholders are substituted per invocation.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_command_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub command_timeout: Duration,
    #[serde(default = "default_configure_command")]
    pub configure_command: Vec<Vec<String>>,
    #[serde(default = "default_apply_command")]
    pub apply_command: Vec<Vec<String>>,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.configure_command.is_empty() || self.configure_command.iter().any(Vec::is_empty) {
            return Err(ConfigError::EmptyCommand("configure"));
        }
        if self.apply_command.is_empty() || self.apply_command.iter().any(Vec::is_empty) {
            return Err(ConfigError::EmptyCommand("apply"));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_timeout: default_command_timeout(),
            configure_command: default_configure_command(),
            apply_command: default_apply_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
    /// Optional node-exporter textfile target. When set, the daemon rewrites
    /// the file after every cycle using a tmp-then-rename swap.
    #[serde(default)]
    pub textfile_path: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
            textfile_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [adapters.can0]
        description = "rack A rectifier"
        [adapters.can1]
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: AppConfig = MINIMAL.parse().expect("minimal config");
        assert_eq!(config.adapters.len(), 2);
        assert_eq!(
            config.adapters.keys().collect::<Vec<_>>(),
            vec!["can0", "can1"]
        );
        assert_eq!(config.scheduler.cycle_interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.max_retries, 3);
        assert!((config.setpoint.voltage - 51.0).abs() < f64::EPSILON);
        assert!(!config.scheduler.require_configured);
    }

    #[test]
    fn empty_adapter_table_is_rejected() {
        let err = "".parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::NoAdapters));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let raw = r#"
            [scheduler]
            cycle_interval = 0
            [adapters.can0]
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
    }

    #[test]
    fn out_of_range_setpoint_is_rejected() {
        let raw = r#"
            [setpoint]
            voltage = 60.0
            [adapters.can0]
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::VoltageOutOfRange(_)));

        let raw = r#"
            [setpoint]
            current_percent = 5.0
            [adapters.can0]
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::CurrentOutOfRange(_)));
    }

    #[test]
    fn per_adapter_setpoint_override_resolves() {
        let raw = r#"
            [setpoint]
            voltage = 51.0
            [adapters.can0]
            [adapters.can1.setpoint]
            voltage = 53.5
            current_percent = 80.0
        "#;
        let config: AppConfig = raw.parse().expect("override config");
        assert!((config.setpoint_for("can0").voltage - 51.0).abs() < f64::EPSILON);
        assert!((config.setpoint_for("can1").voltage - 53.5).abs() < f64::EPSILON);
    }

    #[test]
    fn override_is_validated_too() {
        let raw = r#"
            [adapters.can0.setpoint]
            voltage = 40.0
            current_percent = 50.0
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::VoltageOutOfRange(_)));
    }

    #[test]
    fn load_with_source_reports_candidates() {
        let err = AppConfig::load_with_source(&["/nonexistent/a.toml", "/nonexistent/b.toml"])
            .unwrap_err();
        match err {
            ConfigError::NotFound { inspected } => {
                assert!(inspected.contains("/nonexistent/a.toml"));
                assert!(inspected.contains("/nonexistent/b.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_from_file_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rcs.toml");
        std::fs::write(&path, MINIMAL).expect("write config");
        let loaded = AppConfig::load_with_source(&[path.clone()]).expect("load config");
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.adapters.len(), 2);
    }

    #[test]
    fn empty_device_command_is_rejected() {
        let raw = r#"
            [adapters.can0]
            [device]
            apply_command = []
        "#;
        let err = raw.parse::<AppConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand("apply")));
    }
}

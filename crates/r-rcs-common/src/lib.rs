//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Shared primitives and utilities for the scheduler runtime."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
//! Core shared primitives for the R-RCS workspace.
//! This crate exposes configuration loading/validation and tracing
//! initialization consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AdapterConfig, AppConfig, ConfigError, DeviceConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig, SchedulerConfig, SetpointConfig,
};
pub use logging::{init_tracing, LogFormat};

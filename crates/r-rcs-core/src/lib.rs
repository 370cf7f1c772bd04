//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Primary command scheduling and lifecycle management."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
//! Core command scheduler and device contract for R-RCS.

pub mod device;
pub mod policy;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod setpoint;

pub use device::{DeviceClient, DeviceError};
pub use policy::RetryPolicy;
pub use registry::{Adapter, AdapterRegistry};
pub use report::{AdapterFault, CycleOutcome, CycleReport, CycleResult};
pub use scheduler::{CommandScheduler, SchedulerHandle};
pub use setpoint::SetpointCommand;

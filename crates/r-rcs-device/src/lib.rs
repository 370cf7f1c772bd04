//! ---
//! rcs_section: "05-device-integration"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Device client implementations behind the scheduler contract."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
//! Concrete [`DeviceClient`](r_rcs_core::DeviceClient) implementations.

pub mod exec;

pub use exec::ExecDeviceClient;

//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Device client contract and error taxonomy."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use async_trait::async_trait;
use thiserror::Error;

use crate::registry::Adapter;
use crate::setpoint::SetpointCommand;

/// Failure classification reported by a device client.
///
/// Transient faults (bus timeout, momentary NACK) are retried locally by the
/// scheduler; fatal faults degrade the adapter for the current cycle and are
/// attempted again on the next one, since a device reporting fatal now may
/// recover physically later.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("transient device failure: {0}")]
    Transient(String),
    #[error("fatal device failure: {0}")]
    Fatal(String),
}

impl DeviceError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Fatal(reason) => reason,
        }
    }

    /// Static label suitable for metrics and status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Collaborator that issues one configuration or setpoint command to one
/// adapter/device pair. Implementations own the bus-access mechanism; the
/// scheduler only consumes this contract.
///
/// `apply` is idempotent by contract: re-issuing the same setpoint on a
/// device already at that setpoint has no distinct side effect.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// One-time setup/reset command for the adapter.
    async fn configure(&self, adapter: &Adapter) -> Result<(), DeviceError>;

    /// Steady-state command driving the device to the setpoint.
    async fn apply(&self, adapter: &Adapter, setpoint: SetpointCommand)
        -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let transient = DeviceError::transient("bus timeout");
        assert!(transient.is_transient());
        assert_eq!(transient.kind(), "transient");
        assert_eq!(transient.reason(), "bus timeout");

        let fatal = DeviceError::fatal("device misconfigured");
        assert!(!fatal.is_transient());
        assert_eq!(fatal.kind(), "fatal");
    }
}

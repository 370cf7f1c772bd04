//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Per-cycle outcome records emitted by the scheduler."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use crate::device::DeviceError;

/// Terminal state of one adapter within one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The setpoint command was acknowledged.
    Success,
    /// The adapter could not be driven to the setpoint this cycle.
    Degraded { reason: String },
}

impl CycleOutcome {
    /// Static label for metrics and status payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Degraded { .. } => "degraded",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success)
    }
}

/// Outcome of one command attempt sequence for one adapter. Produced fresh
/// each cycle and discarded after reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    pub adapter: String,
    pub outcome: CycleOutcome,
    /// Number of apply attempts issued, including the successful one.
    pub attempts: usize,
}

/// Aggregate record of one full pass over the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Monotonic cycle counter, starting at 1.
    pub cycle: u64,
    pub results: Vec<CycleResult>,
}

impl CycleReport {
    pub fn degraded_count(&self) -> usize {
        self.results
            .iter()
            .filter(|result| !result.outcome.is_success())
            .count()
    }

    pub fn is_healthy(&self) -> bool {
        self.degraded_count() == 0
    }
}

/// A configure failure collected during the initialization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFault {
    pub adapter: String,
    pub error: DeviceError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_degraded_adapters() {
        let report = CycleReport {
            cycle: 3,
            results: vec![
                CycleResult {
                    adapter: "can0".into(),
                    outcome: CycleOutcome::Success,
                    attempts: 1,
                },
                CycleResult {
                    adapter: "can1".into(),
                    outcome: CycleOutcome::Degraded {
                        reason: "bus timeout".into(),
                    },
                    attempts: 4,
                },
            ],
        };
        assert_eq!(report.degraded_count(), 1);
        assert!(!report.is_healthy());
    }
}

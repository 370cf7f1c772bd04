//! ---
//! rcs_section: "01-core-functionality"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Validated rectifier setpoint value type."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use r_rcs_common::config::{
    ConfigError, SetpointConfig, CURRENT_PERCENT_RANGE, VOLTAGE_RANGE,
};

/// Immutable target operating point for a rectifier: output voltage in volts
/// and current limit in percent of the rated current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointCommand {
    voltage: f64,
    current_percent: f64,
}

impl SetpointCommand {
    /// Construct a setpoint, enforcing the device's accepted windows.
    pub fn new(voltage: f64, current_percent: f64) -> Result<Self, ConfigError> {
        if !VOLTAGE_RANGE.contains(&voltage) {
            return Err(ConfigError::VoltageOutOfRange(voltage));
        }
        if !CURRENT_PERCENT_RANGE.contains(&current_percent) {
            return Err(ConfigError::CurrentOutOfRange(current_percent));
        }
        Ok(Self {
            voltage,
            current_percent,
        })
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current_percent(&self) -> f64 {
        self.current_percent
    }

    /// Current limit as the fraction the device protocol expects (0.10..=1.21).
    pub fn current_fraction(&self) -> f64 {
        self.current_percent / 100.0
    }
}

impl TryFrom<&SetpointConfig> for SetpointCommand {
    type Error = ConfigError;

    fn try_from(config: &SetpointConfig) -> Result<Self, Self::Error> {
        Self::new(config.voltage, config.current_percent)
    }
}

impl std::fmt::Display for SetpointCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} V / {:.0} %", self.voltage, self.current_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_window_bounds() {
        assert!(SetpointCommand::new(41.0, 10.0).is_ok());
        assert!(SetpointCommand::new(58.5, 121.0).is_ok());
    }

    #[test]
    fn rejects_out_of_window_values() {
        assert!(matches!(
            SetpointCommand::new(40.9, 50.0),
            Err(ConfigError::VoltageOutOfRange(_))
        ));
        assert!(matches!(
            SetpointCommand::new(51.0, 121.5),
            Err(ConfigError::CurrentOutOfRange(_))
        ));
    }

    #[test]
    fn current_fraction_matches_protocol_scaling() {
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        assert!((setpoint.current_fraction() - 0.5).abs() < f64::EPSILON);
    }
}

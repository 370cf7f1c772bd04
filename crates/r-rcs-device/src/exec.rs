//! ---
//! rcs_section: "05-device-integration"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "External-command device client."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use async_trait::async_trait;
use r_rcs_common::config::DeviceConfig;
use r_rcs_core::{Adapter, DeviceClient, DeviceError, SetpointCommand};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const ADAPTER_PLACEHOLDER: &str = "{adapter}";
const VOLTAGE_PLACEHOLDER: &str = "{voltage}";
const CURRENT_PLACEHOLDER: &str = "{current}";

/// Device client that executes one external command per device operation,
/// rendered from configured argv templates. Deployed controllers drove the
/// bus exactly this way: `ip link` for link bring-up and a setpoint tool per
/// apply.
///
/// Classification: a command that cannot be spawned is `Fatal` (a missing
/// binary will not heal within a cycle); a non-zero exit or a timeout is
/// `Transient` and left to the scheduler's retry policy.
pub struct ExecDeviceClient {
    config: DeviceConfig,
}

impl ExecDeviceClient {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    async fn run_command(&self, argv: &[String]) -> Result<(), DeviceError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(DeviceError::fatal("empty command template"));
        };
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        debug!(command = %argv.join(" "), "running device command");
        let status = match timeout(self.config.command_timeout, command.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                return Err(DeviceError::fatal(format!(
                    "failed to spawn {}: {}",
                    program, err
                )));
            }
            Err(_) => {
                return Err(DeviceError::transient(format!(
                    "{} timed out after {:.1} s",
                    program,
                    self.config.command_timeout.as_secs_f64()
                )));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(DeviceError::transient(format!(
                "{} exited with {}",
                program, status
            )))
        }
    }
}

fn render(template: &[String], adapter: &Adapter, setpoint: Option<SetpointCommand>) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut rendered = arg.replace(ADAPTER_PLACEHOLDER, adapter.id());
            if let Some(setpoint) = setpoint {
                rendered = rendered
                    .replace(VOLTAGE_PLACEHOLDER, &format!("{:.1}", setpoint.voltage()))
                    .replace(
                        CURRENT_PLACEHOLDER,
                        &format!("{:.1}", setpoint.current_percent()),
                    );
            }
            rendered
        })
        .collect()
}

#[async_trait]
impl DeviceClient for ExecDeviceClient {
    async fn configure(&self, adapter: &Adapter) -> Result<(), DeviceError> {
        for template in &self.config.configure_command {
            let argv = render(template, adapter, None);
            self.run_command(&argv).await?;
        }
        Ok(())
    }

    async fn apply(
        &self,
        adapter: &Adapter,
        setpoint: SetpointCommand,
    ) -> Result<(), DeviceError> {
        for template in &self.config.apply_command {
            let argv = render(template, adapter, Some(setpoint));
            self.run_command(&argv).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client_with(apply: Vec<Vec<String>>, timeout: Duration) -> ExecDeviceClient {
        ExecDeviceClient::new(DeviceConfig {
            command_timeout: timeout,
            configure_command: vec![vec!["true".into()]],
            apply_command: apply,
        })
    }

    fn args(argv: &[&str]) -> Vec<String> {
        argv.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn render_substitutes_placeholders() {
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        let argv = render(
            &args(&["rectifier-set", "{adapter}", "{voltage}", "{current}"]),
            &adapter,
            Some(setpoint),
        );
        assert_eq!(argv, vec!["rectifier-set", "can0", "51.0", "50.0"]);
    }

    #[test]
    fn render_without_setpoint_leaves_value_placeholders() {
        let adapter = Adapter::new("can1");
        let argv = render(&args(&["ip", "link", "set", "up", "{adapter}"]), &adapter, None);
        assert_eq!(argv, vec!["ip", "link", "set", "up", "can1"]);
    }

    #[tokio::test]
    async fn successful_commands_report_ok() {
        let client = client_with(vec![args(&["true"])], Duration::from_secs(5));
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        client.configure(&adapter).await.expect("configure");
        client.apply(&adapter, setpoint).await.expect("apply");
    }

    #[tokio::test]
    async fn non_zero_exit_is_transient() {
        let client = client_with(vec![args(&["false"])], Duration::from_secs(5));
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        let err = client.apply(&adapter, setpoint).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn missing_binary_is_fatal() {
        let client = client_with(
            vec![args(&["/nonexistent/r-rcs-device-test-binary"])],
            Duration::from_secs(5),
        );
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        let err = client.apply(&adapter, setpoint).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let client = client_with(vec![args(&["sleep", "5"])], Duration::from_millis(100));
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");
        let err = client.apply(&adapter, setpoint).await.unwrap_err();
        assert!(err.is_transient());
    }
}

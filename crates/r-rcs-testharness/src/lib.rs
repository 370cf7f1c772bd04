//! ---
//! rcs_section: "11-simulation"
//! rcs_subsection: "01-bootstrap"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Scripted device client and shared test fixtures."
//! rcs_version: "v0.1.0"
//! rcs_owner: "tbd"
//! ---
//! Test harness for R-RCS: a scripted [`DeviceClient`] whose per-adapter
//! outcomes are queued up front, with every call recorded for inspection.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use r_rcs_core::{Adapter, DeviceClient, DeviceError, SetpointCommand};
use tokio::time::Instant;

/// Which device operation a recorded call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Configure,
    Apply,
}

/// One observed device call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub adapter: String,
    pub kind: CallKind,
    pub setpoint: Option<SetpointCommand>,
    pub at: Instant,
}

type Outcome = Result<(), DeviceError>;

#[derive(Default)]
struct Inner {
    configure_scripts: HashMap<String, VecDeque<Outcome>>,
    apply_scripts: HashMap<String, VecDeque<Outcome>>,
    apply_defaults: HashMap<String, DeviceError>,
    configure_defaults: HashMap<String, DeviceError>,
    calls: Vec<RecordedCall>,
}

/// Device client whose behaviour is scripted per adapter. Queued outcomes are
/// consumed in order; once a queue is empty the per-adapter default error (if
/// set) applies, otherwise every call succeeds.
#[derive(Default)]
pub struct ScriptedDeviceClient {
    inner: Mutex<Inner>,
}

impl ScriptedDeviceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue configure outcomes for one adapter.
    pub fn script_configure(
        &self,
        adapter: &str,
        outcomes: impl IntoIterator<Item = Outcome>,
    ) {
        let mut inner = self.inner.lock();
        inner
            .configure_scripts
            .entry(adapter.to_owned())
            .or_default()
            .extend(outcomes);
    }

    /// Queue apply outcomes for one adapter.
    pub fn script_apply(&self, adapter: &str, outcomes: impl IntoIterator<Item = Outcome>) {
        let mut inner = self.inner.lock();
        inner
            .apply_scripts
            .entry(adapter.to_owned())
            .or_default()
            .extend(outcomes);
    }

    /// Make every apply on the adapter fail with `error` once its queue is
    /// drained.
    pub fn always_fail_apply(&self, adapter: &str, error: DeviceError) {
        self.inner
            .lock()
            .apply_defaults
            .insert(adapter.to_owned(), error);
    }

    /// Make every configure on the adapter fail with `error` once its queue
    /// is drained.
    pub fn always_fail_configure(&self, adapter: &str, error: DeviceError) {
        self.inner
            .lock()
            .configure_defaults
            .insert(adapter.to_owned(), error);
    }

    /// All calls observed so far, in issue order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    pub fn configure_count(&self, adapter: &str) -> usize {
        self.count(adapter, CallKind::Configure)
    }

    pub fn apply_count(&self, adapter: &str) -> usize {
        self.count(adapter, CallKind::Apply)
    }

    fn count(&self, adapter: &str, kind: CallKind) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind && call.adapter == adapter)
            .count()
    }

    fn next_outcome(
        scripts: &mut HashMap<String, VecDeque<Outcome>>,
        defaults: &HashMap<String, DeviceError>,
        adapter: &str,
    ) -> Outcome {
        if let Some(queue) = scripts.get_mut(adapter) {
            if let Some(outcome) = queue.pop_front() {
                return outcome;
            }
        }
        match defaults.get(adapter) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceClient for ScriptedDeviceClient {
    async fn configure(&self, adapter: &Adapter) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall {
            adapter: adapter.id().to_owned(),
            kind: CallKind::Configure,
            setpoint: None,
            at: Instant::now(),
        });
        let Inner {
            configure_scripts,
            configure_defaults,
            ..
        } = &mut *inner;
        Self::next_outcome(configure_scripts, configure_defaults, adapter.id())
    }

    async fn apply(
        &self,
        adapter: &Adapter,
        setpoint: SetpointCommand,
    ) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall {
            adapter: adapter.id().to_owned(),
            kind: CallKind::Apply,
            setpoint: Some(setpoint),
            at: Instant::now(),
        });
        let Inner {
            apply_scripts,
            apply_defaults,
            ..
        } = &mut *inner;
        Self::next_outcome(apply_scripts, apply_defaults, adapter.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let client = ScriptedDeviceClient::new();
        client.script_apply(
            "can0",
            [
                Err(DeviceError::transient("bus timeout")),
                Ok(()),
            ],
        );
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");

        assert!(client.apply(&adapter, setpoint).await.is_err());
        assert!(client.apply(&adapter, setpoint).await.is_ok());
        // Queue drained, no default set: success from here on.
        assert!(client.apply(&adapter, setpoint).await.is_ok());
        assert_eq!(client.apply_count("can0"), 3);
    }

    #[tokio::test]
    async fn default_error_applies_after_queue_drains() {
        let client = ScriptedDeviceClient::new();
        client.always_fail_apply("can0", DeviceError::fatal("device misconfigured"));
        let adapter = Adapter::new("can0");
        let setpoint = SetpointCommand::new(51.0, 50.0).expect("setpoint");

        let err = client.apply(&adapter, setpoint).await.unwrap_err();
        assert!(!err.is_transient());
    }
}

//! Seams between the orchestrator and the operating system.
//!
//! Every side effect the control loop needs goes through one of these traits
//! so the orchestrator can be driven by test doubles. Real implementations
//! live in [`crate::system`], [`crate::power`] and [`crate::sleep_guard`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use vg_core::types::{ModeBehavior, ProbeSnapshot};
use vg_privileged::{PrivilegedClientError, PrivilegedCommanding};
use vg_telemetry::redact::Redacted;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to read a signal (process list, network, power state).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    Command(String),

    #[error("unexpected output from {0}")]
    InvalidOutput(&'static str),

    #[error("privileged helper: {0}")]
    Privileged(#[from] PrivilegedClientError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessControlError {
    #[error("{command} exited with status {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("failed to launch {target}: {reason}")]
    LaunchFailed { target: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unable to create power assertion: {0}")]
pub struct PowerAssertionError(pub String);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProcessSnapshotProvider: Send + Sync {
    /// Basenames of every running process.
    async fn running_process_names(&self) -> Result<Vec<String>, ProbeError>;
}

#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeSnapshot, ProbeError>;
}

#[async_trait]
pub trait TemperatureProvider: Send + Sync {
    /// `None` means no reading this cycle.
    async fn current_temperature_c(&self) -> Option<f64>;
}

#[async_trait]
pub trait PowerAssertionManager: Send + Sync {
    /// Hold assertions matching `behavior`. Idempotent for an unchanged behavior.
    async fn activate(&self, behavior: ModeBehavior) -> Result<(), PowerAssertionError>;
    async fn deactivate(&self);
    async fn is_active(&self) -> bool;
}

#[async_trait]
pub trait ProcessController: Send + Sync {
    /// SIGKILL every process named `name`. No matching process is not an error.
    async fn force_terminate(&self, name: &str) -> Result<(), ProcessControlError>;
    async fn launch_by_name(&self, name: &str) -> Result<(), ProcessControlError>;
    /// Run `command` through the user's login shell.
    async fn launch_command(&self, command: &str) -> Result<(), ProcessControlError>;
    async fn open_application(&self, bundle: &Path) -> Result<(), ProcessControlError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerState {
    pub is_charging: bool,
    pub lid_closed: bool,
}

#[async_trait]
pub trait PowerStateProvider: Send + Sync {
    async fn power_state(&self) -> PowerState;
}

// ---------------------------------------------------------------------------
// Temperature via the helper
// ---------------------------------------------------------------------------

/// Reads the SoC temperature through the privileged helper.
pub struct PrivilegedTemperatureProvider {
    privileged: Arc<dyn PrivilegedCommanding>,
}

impl PrivilegedTemperatureProvider {
    pub fn new(privileged: Arc<dyn PrivilegedCommanding>) -> Self {
        Self { privileged }
    }
}

#[async_trait]
impl TemperatureProvider for PrivilegedTemperatureProvider {
    async fn current_temperature_c(&self) -> Option<f64> {
        match self.privileged.current_soc_temperature().await {
            Ok(celsius) => Some(celsius),
            Err(e) => {
                warn!(error = %Redacted(&e), "temperature read failed");
                None
            }
        }
    }
}

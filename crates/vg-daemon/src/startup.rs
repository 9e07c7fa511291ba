use std::sync::Arc;

use tracing::{info, warn};

use vg_telemetry::redact::Redacted;

use crate::sleep_guard::SleepGuard;

/// Clears state an earlier run may have left behind.
pub struct StartupRecovery {
    sleep_guard: Arc<SleepGuard>,
}

impl StartupRecovery {
    pub fn new(sleep_guard: Arc<SleepGuard>) -> Self {
        Self { sleep_guard }
    }

    /// Returns `true` when residual sleep inhibition was cleared.
    pub async fn run(&self) -> bool {
        match self.sleep_guard.recover_residual_state().await {
            Ok(()) => {
                info!("startup recovery: sleep override cleared");
                true
            }
            Err(e) => {
                warn!(error = %Redacted(&e), "startup recovery could not clear the sleep override");
                false
            }
        }
    }
}

use std::sync::Arc;

use tracing::info;
use vg_core::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};

use crate::error::{run_checked, Result};

const PMSET: &str = "/usr/bin/pmset";

/// Toggles the system-wide `disablesleep` power setting.
pub struct SleepSettingsController {
    runner: Arc<dyn CommandRunner>,
}

impl SleepSettingsController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn set_disable_sleep(&self, disabled: bool) -> Result<()> {
        let value = if disabled { "1" } else { "0" };
        run_checked(
            self.runner.as_ref(),
            PMSET,
            &["-a", "disablesleep", value],
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await?;
        info!(disabled, "system sleep override applied");
        Ok(())
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use vg_core::types::OperatingMode;
use vg_privileged::{PrivilegedClientError, PrivilegedCommanding};

/// Coordinates the privileged system-wide sleep override.
///
/// The override is only needed for lid-closed operation, so it is applied
/// only for modes that allow clamshell, and only undone if this guard
/// applied it.
pub struct SleepGuard {
    privileged: Arc<dyn PrivilegedCommanding>,
    applied: AtomicBool,
}

impl SleepGuard {
    pub fn new(privileged: Arc<dyn PrivilegedCommanding>) -> Self {
        Self {
            privileged,
            applied: AtomicBool::new(false),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied.load(Ordering::SeqCst)
    }

    /// Apply the override for `mode`. Switching to a mode without clamshell
    /// support undoes an override applied earlier.
    pub async fn activate(&self, mode: OperatingMode) -> Result<(), PrivilegedClientError> {
        if !mode.behavior().allow_clamshell {
            return self.deactivate().await;
        }
        if self.is_applied() {
            return Ok(());
        }
        self.privileged.set_disable_sleep(true).await?;
        self.applied.store(true, Ordering::SeqCst);
        info!(mode = %mode, "system sleep inhibited");
        Ok(())
    }

    pub async fn deactivate(&self) -> Result<(), PrivilegedClientError> {
        if !self.is_applied() {
            return Ok(());
        }
        self.privileged.set_disable_sleep(false).await?;
        self.applied.store(false, Ordering::SeqCst);
        info!("system sleep inhibition released");
        Ok(())
    }

    /// Clear the override unconditionally, e.g. after a crash left it set.
    pub async fn recover_residual_state(&self) -> Result<(), PrivilegedClientError> {
        self.privileged.set_disable_sleep(false).await?;
        self.applied.store(false, Ordering::SeqCst);
        Ok(())
    }
}

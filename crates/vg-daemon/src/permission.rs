use std::sync::Arc;

use tracing::{info, warn};

use vg_core::state_store::StateStore;
use vg_core::types::{PermissionWarning, PrivilegeState};
use vg_privileged::{PrivilegedClientError, PrivilegedCommanding};

/// Mirrors the helper's privilege state into the store and repairs it on
/// request.
pub struct PermissionRepairCoordinator {
    privileged: Arc<dyn PrivilegedCommanding>,
    store: Arc<StateStore>,
}

impl PermissionRepairCoordinator {
    pub fn new(privileged: Arc<dyn PrivilegedCommanding>, store: Arc<StateStore>) -> Self {
        Self { privileged, store }
    }

    /// Query the helper and record `Lost` as a permission warning.
    pub async fn refresh_warning_state(&self) -> PrivilegeState {
        let state = self.privileged.current_privilege_state().await;
        let warning = match state {
            PrivilegeState::Lost => PermissionWarning::Warning,
            PrivilegeState::Healthy => PermissionWarning::None,
        };
        if self.store.permission_warning().await != warning {
            info!(?state, "privilege state changed");
        }
        self.store.update_permission_warning(warning).await;
        state
    }

    /// Ask the helper to repair when privileges are lost. Returns whether a
    /// repair ran.
    pub async fn repair_if_needed(&self) -> Result<bool, PrivilegedClientError> {
        if self.privileged.current_privilege_state().await != PrivilegeState::Lost {
            return Ok(false);
        }
        warn!("privileges lost, requesting repair");
        self.privileged.repair_privileges().await?;
        self.store
            .update_permission_warning(PermissionWarning::None)
            .await;
        info!("privileges repaired");
        Ok(true)
    }
}

//! Single authoritative holder of the guard status and observed metrics.
//!
//! All fields live in one struct behind one lock so readers always get a
//! consistent snapshot, never a half-applied cycle.

use tokio::sync::RwLock;

use crate::types::{
    iso8601_now, GuardStatus, NetworkState, OperatingMode, PermissionWarning, StatusPayload,
    STATUS_SCHEMA_VERSION,
};

#[derive(Debug, Clone)]
struct GuardState {
    status: GuardStatus,
    mode: OperatingMode,
    temp_c: Option<f64>,
    is_charging: bool,
    lid_closed: bool,
    target_process: String,
    target_process_running: bool,
    network_state: NetworkState,
    permission_warning: PermissionWarning,
}

/// Everything one orchestrator cycle writes, committed in a single step.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleUpdate {
    pub status: GuardStatus,
    pub target_process: String,
    pub target_process_running: bool,
    /// `None` leaves the previous network state untouched (no probe this cycle).
    pub network_state: Option<NetworkState>,
    pub temp_c: Option<f64>,
}

#[derive(Debug)]
pub struct StateStore {
    inner: RwLock<GuardState>,
}

impl StateStore {
    pub fn new(mode: OperatingMode, target_process: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(GuardState {
                status: GuardStatus::Paused,
                mode,
                temp_c: None,
                is_charging: false,
                lid_closed: false,
                target_process: target_process.into(),
                target_process_running: false,
                network_state: NetworkState::Ok,
                permission_warning: PermissionWarning::None,
            }),
        }
    }

    pub async fn apply_cycle(&self, update: CycleUpdate) {
        let mut state = self.inner.write().await;
        state.status = update.status;
        state.target_process = update.target_process;
        state.target_process_running = update.target_process_running;
        if let Some(network_state) = update.network_state {
            state.network_state = network_state;
        }
        state.temp_c = update.temp_c;
    }

    pub async fn update_mode(&self, mode: OperatingMode) {
        self.inner.write().await.mode = mode;
    }

    pub async fn update_guard_status(&self, status: GuardStatus) {
        self.inner.write().await.status = status;
    }

    pub async fn update_target_process(&self, name: impl Into<String>, running: bool) {
        let mut state = self.inner.write().await;
        state.target_process = name.into();
        state.target_process_running = running;
    }

    pub async fn update_network_state(&self, network_state: NetworkState) {
        self.inner.write().await.network_state = network_state;
    }

    pub async fn update_temperature(&self, temp_c: Option<f64>) {
        self.inner.write().await.temp_c = temp_c;
    }

    pub async fn update_power_state(&self, is_charging: bool, lid_closed: bool) {
        let mut state = self.inner.write().await;
        state.is_charging = is_charging;
        state.lid_closed = lid_closed;
    }

    pub async fn update_permission_warning(&self, warning: PermissionWarning) {
        self.inner.write().await.permission_warning = warning;
    }

    pub async fn permission_warning(&self) -> PermissionWarning {
        self.inner.read().await.permission_warning
    }

    /// Last explicitly written status, without the permission override.
    pub async fn underlying_status(&self) -> GuardStatus {
        self.inner.read().await.status
    }

    /// Snapshot for external readers. A permission warning always surfaces
    /// as `degraded`, whatever status the orchestrator last wrote.
    pub async fn snapshot_status(&self, last_updated: impl Into<String>) -> StatusPayload {
        let state = self.inner.read().await;
        let status = match state.permission_warning {
            PermissionWarning::Warning => GuardStatus::Degraded,
            PermissionWarning::None => state.status,
        };
        StatusPayload {
            schema_version: STATUS_SCHEMA_VERSION.to_string(),
            status,
            mode: state.mode,
            temp_c: state.temp_c,
            is_charging: state.is_charging,
            lid_closed: state.lid_closed,
            target_process: state.target_process.clone(),
            target_process_running: state.target_process_running,
            network_state: state.network_state,
            last_updated: last_updated.into(),
        }
    }

    pub async fn snapshot_now(&self) -> StatusPayload {
        self.snapshot_status(iso8601_now()).await
    }
}

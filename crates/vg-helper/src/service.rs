use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;
use vg_core::command::CommandRunner;
use vg_core::types::PrivilegeState;
use vg_privileged::protocol::{Method, ResponseData};
use vg_privileged::server::RequestHandler;

use crate::error::Result;
use crate::network_ip::NetworkIpController;
use crate::sleep::SleepSettingsController;
use crate::temperature::SocTemperatureProvider;
use crate::wifi::WifiController;

/// Dispatches privileged requests and tracks whether privileged operations
/// are still working.
///
/// A successful mutating operation marks the helper healthy and a failed one
/// marks it lost. Read-only calls leave the state alone; `repair_privileges`
/// resets it to healthy.
pub struct HelperService {
    sleep: SleepSettingsController,
    wifi: WifiController,
    network: NetworkIpController,
    temperature: SocTemperatureProvider,
    state: Mutex<PrivilegeState>,
}

impl HelperService {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_state(runner, PrivilegeState::Healthy)
    }

    pub fn with_state(runner: Arc<dyn CommandRunner>, initial: PrivilegeState) -> Self {
        Self {
            sleep: SleepSettingsController::new(runner.clone()),
            wifi: WifiController::new(runner.clone()),
            network: NetworkIpController::new(runner.clone()),
            temperature: SocTemperatureProvider::new(runner),
            state: Mutex::new(initial),
        }
    }

    pub fn privilege_state(&self) -> PrivilegeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark(&self, state: PrivilegeState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current != state {
            warn!(from = ?*current, to = ?state, "privilege state changed");
        }
        *current = state;
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        self.mark(if result.is_ok() {
            PrivilegeState::Healthy
        } else {
            PrivilegeState::Lost
        });
        result
    }

    pub async fn dispatch(&self, method: Method) -> Result<ResponseData> {
        match method {
            Method::SetDisableSleep { disabled } => {
                let result = self.sleep.set_disable_sleep(disabled).await;
                self.track(result).map(|()| ResponseData::Ok)
            }
            Method::RestartWifi => {
                let result = self.wifi.restart_wifi().await;
                self.track(result).map(|()| ResponseData::Ok)
            }
            Method::RepairPrivileges => {
                self.mark(PrivilegeState::Healthy);
                Ok(ResponseData::Ok)
            }
            Method::CurrentPrivilegeState => Ok(ResponseData::PrivilegeState(self.privilege_state())),
            Method::CurrentSocTemperature => self
                .temperature
                .current_temperature_c()
                .await
                .map(ResponseData::Temperature),
            Method::SetStaticIp {
                service,
                ip,
                subnet,
                router,
            } => {
                let result = self.network.set_static_ip(&service, &ip, &subnet, &router).await;
                self.track(result).map(|()| ResponseData::Ok)
            }
            Method::SetV6LinkLocal { service } => {
                let result = self.network.set_v6_link_local(&service).await;
                self.track(result).map(|()| ResponseData::Ok)
            }
            Method::CurrentServiceIpv4Snapshot { service } => self
                .network
                .current_ipv4_snapshot(&service)
                .await
                .map(ResponseData::Ipv4Snapshot),
        }
    }
}

#[async_trait]
impl RequestHandler for HelperService {
    async fn handle(&self, method: Method) -> std::result::Result<ResponseData, String> {
        self.dispatch(method).await.map_err(|e| e.to_string())
    }
}

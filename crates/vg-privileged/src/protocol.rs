use serde::{Deserialize, Serialize};
use vg_core::types::{PrivilegeState, ServiceIpv4Snapshot};

/// Operations the helper performs on behalf of the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    SetDisableSleep {
        disabled: bool,
    },
    RestartWifi,
    RepairPrivileges,
    CurrentPrivilegeState,
    CurrentSocTemperature,
    SetStaticIp {
        service: String,
        ip: String,
        subnet: String,
        router: String,
    },
    SetV6LinkLocal {
        service: String,
    },
    CurrentServiceIpv4Snapshot {
        service: String,
    },
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::SetDisableSleep { .. } => "set_disable_sleep",
            Method::RestartWifi => "restart_wifi",
            Method::RepairPrivileges => "repair_privileges",
            Method::CurrentPrivilegeState => "current_privilege_state",
            Method::CurrentSocTemperature => "current_soc_temperature",
            Method::SetStaticIp { .. } => "set_static_ip",
            Method::SetV6LinkLocal { .. } => "set_v6_link_local",
            Method::CurrentServiceIpv4Snapshot { .. } => "current_service_ipv4_snapshot",
        }
    }

    /// Calls that run slow system utilities on the helper side
    /// (`powermetrics`, `networksetup`) and get the longer timeout.
    pub fn is_slow(&self) -> bool {
        matches!(
            self,
            Method::CurrentSocTemperature
                | Method::SetStaticIp { .. }
                | Method::SetV6LinkLocal { .. }
                | Method::CurrentServiceIpv4Snapshot { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
}

/// Success payloads. Failures travel as plain strings in [`Response::result`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseData {
    Ok,
    PrivilegeState(PrivilegeState),
    Temperature(f64),
    Ipv4Snapshot(ServiceIpv4Snapshot),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

/// Serialize one frame, newline-terminated.
pub fn encode_line<T: Serialize>(frame: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

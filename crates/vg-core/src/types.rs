use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag carried by every [`StatusPayload`].
pub const STATUS_SCHEMA_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// GuardStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardStatus {
    Active,
    Paused,
    Degraded,
    OverheatTrip,
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GuardStatus::Active => "active",
            GuardStatus::Paused => "paused",
            GuardStatus::Degraded => "degraded",
            GuardStatus::OverheatTrip => "overheat_trip",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// OperatingMode / ModeBehavior
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Standard,
    Cluster,
}

impl OperatingMode {
    pub fn behavior(self) -> ModeBehavior {
        ModeBehavior::for_mode(self)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Standard => write!(f, "standard"),
            OperatingMode::Cluster => write!(f, "cluster"),
        }
    }
}

/// Side effects a mode asks the guard to apply while the target runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeBehavior {
    pub prevent_system_sleep: bool,
    pub prevent_display_sleep: bool,
    /// Lid-closed operation; needs the privileged sleep toggle.
    pub allow_clamshell: bool,
    pub network_guard_enabled: bool,
}

impl ModeBehavior {
    pub fn for_mode(mode: OperatingMode) -> Self {
        match mode {
            OperatingMode::Cluster => Self {
                prevent_system_sleep: true,
                prevent_display_sleep: true,
                allow_clamshell: true,
                network_guard_enabled: true,
            },
            OperatingMode::Standard => Self {
                prevent_system_sleep: true,
                prevent_display_sleep: false,
                allow_clamshell: false,
                network_guard_enabled: false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    #[default]
    Ok,
    LanLost,
    WanLost,
    Offline,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkState::Ok => "ok",
            NetworkState::LanLost => "lan_lost",
            NetworkState::WanLost => "wan_lost",
            NetworkState::Offline => "offline",
        };
        write!(f, "{}", label)
    }
}

/// One reachability sample: the default gateway and a well-known internet host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSnapshot {
    pub gateway_reachable: bool,
    pub internet_reachable: bool,
}

impl ProbeSnapshot {
    pub fn new(gateway_reachable: bool, internet_reachable: bool) -> Self {
        Self {
            gateway_reachable,
            internet_reachable,
        }
    }

    pub fn network_state(&self) -> NetworkState {
        match (self.gateway_reachable, self.internet_reachable) {
            (true, true) => NetworkState::Ok,
            (false, false) => NetworkState::Offline,
            (false, true) => NetworkState::LanLost,
            (true, false) => NetworkState::WanLost,
        }
    }
}

// ---------------------------------------------------------------------------
// Privilege
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeState {
    #[default]
    Healthy,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionWarning {
    #[default]
    None,
    Warning,
}

// ---------------------------------------------------------------------------
// Network service IPv4 snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ipv4Configuration {
    Dhcp,
    Manual,
    SelfAssigned,
    Unknown,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIpv4Snapshot {
    pub configuration: Ipv4Configuration,
    pub ip_address: Option<String>,
}

impl ServiceIpv4Snapshot {
    pub fn unknown() -> Self {
        Self {
            configuration: Ipv4Configuration::Unknown,
            ip_address: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Thunderbolt bridge addressing
// ---------------------------------------------------------------------------

/// Static addressing for one Thunderbolt bridge network service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThunderboltIpConfig {
    pub service: String,
    pub ip: String,
    #[serde(default = "default_subnet")]
    pub subnet: String,
    /// Empty means "route via our own address".
    #[serde(default)]
    pub router: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_subnet() -> String {
    "255.255.255.0".into()
}
fn default_enabled() -> bool {
    true
}

impl ThunderboltIpConfig {
    pub fn new(service: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ip: ip.into(),
            subnet: default_subnet(),
            router: String::new(),
            enabled: true,
        }
    }

    pub fn default_configs() -> Vec<Self> {
        (1..=4)
            .map(|n| Self::new(format!("EXO Thunderbolt {n}"), format!("10.0.0.{n}")))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// StatusPayload
// ---------------------------------------------------------------------------

/// Wire shape served by the local status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub schema_version: String,
    pub status: GuardStatus,
    pub mode: OperatingMode,
    pub temp_c: Option<f64>,
    pub is_charging: bool,
    pub lid_closed: bool,
    pub target_process: String,
    pub target_process_running: bool,
    pub network_state: NetworkState,
    pub last_updated: String,
}

/// RFC 3339 UTC timestamp with second precision, e.g. `2026-01-02T03:04:05Z`.
pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn iso8601_now() -> String {
    iso8601(Utc::now())
}

// ---------------------------------------------------------------------------
// Restart attempts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartKind {
    Normal,
    FullRestart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartAttemptInfo {
    pub kind: RestartKind,
    pub failure_count: u32,
    pub error: Option<String>,
}

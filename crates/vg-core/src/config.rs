use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::connectivity::ConnectivityPolicyConfig;
use crate::process_matcher::parse_target_list;
use crate::thermal::ThermalPolicy;
use crate::types::{OperatingMode, ThunderboltIpConfig};

/// Top-level configuration loaded from `~/.vigil/config.toml`.
///
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub status_api: StatusApiConfig,
    #[serde(default)]
    pub helper: HelperConfig,
    #[serde(default)]
    pub thunderbolt: ThunderboltConfig,
}

impl Config {
    /// Load config from `~/.vigil/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.guard.validate()?;
        self.thermal.validate()?;
        self.status_api.validate()?;
        self.helper.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `human` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Append logs to this file instead of stdout.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    /// Comma-separated process names, e.g. `"exo, exo-worker"`.
    #[serde(default = "default_targets")]
    pub targets: String,
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
    #[serde(default = "default_network_probe_interval_secs")]
    pub network_probe_interval_secs: u64,
    #[serde(default)]
    pub wifi_auto_recovery: bool,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub launch_command: String,
}

impl GuardConfig {
    pub fn target_list(&self) -> Vec<String> {
        parse_target_list(&self.targets)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target_list().is_empty() {
            return Err(ConfigError::Validation(
                "guard.targets must name at least one process".into(),
            ));
        }
        if self.loop_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "guard.loop_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Standard,
            targets: default_targets(),
            loop_interval_secs: default_loop_interval_secs(),
            network_probe_interval_secs: default_network_probe_interval_secs(),
            wifi_auto_recovery: false,
            auto_restart: false,
            launch_command: String::new(),
        }
    }
}

fn default_targets() -> String {
    "exo".into()
}
fn default_loop_interval_secs() -> u64 {
    5
}
fn default_network_probe_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default = "default_auto_restart_cooldown_secs")]
    pub auto_restart_cooldown_secs: u64,
    #[serde(default = "default_full_restart_cooldown_secs")]
    pub full_restart_cooldown_secs: u64,
    #[serde(default = "default_max_failures_before_full_restart")]
    pub max_failures_before_full_restart: u32,
    /// Pause after force-terminating before reopening anything.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Pause after reopening the owning app before relaunching.
    #[serde(default = "default_reopen_wait_secs")]
    pub reopen_wait_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            auto_restart_cooldown_secs: default_auto_restart_cooldown_secs(),
            full_restart_cooldown_secs: default_full_restart_cooldown_secs(),
            max_failures_before_full_restart: default_max_failures_before_full_restart(),
            settle_secs: default_settle_secs(),
            reopen_wait_secs: default_reopen_wait_secs(),
        }
    }
}

fn default_auto_restart_cooldown_secs() -> u64 {
    15
}
fn default_full_restart_cooldown_secs() -> u64 {
    60
}
fn default_max_failures_before_full_restart() -> u32 {
    3
}
fn default_settle_secs() -> u64 {
    2
}
fn default_reopen_wait_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalConfig {
    #[serde(default = "default_trip_temperature_c")]
    pub trip_temperature_c: f64,
    #[serde(default = "default_recover_offset_c")]
    pub recover_offset_c: f64,
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u32,
    #[serde(default = "default_trip_duration_secs")]
    pub trip_duration_secs: u32,
    #[serde(default = "default_recover_duration_secs")]
    pub recover_duration_secs: u32,
}

impl ThermalConfig {
    pub fn policy(&self) -> ThermalPolicy {
        ThermalPolicy {
            sample_interval_seconds: self.sample_interval_secs,
            trip_temperature_c: self.trip_temperature_c,
            trip_duration_seconds: self.trip_duration_secs,
            recover_temperature_c: (self.trip_temperature_c - self.recover_offset_c).max(0.0),
            recover_duration_seconds: self.recover_duration_secs,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.trip_temperature_c.is_nan() || self.trip_temperature_c <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "thermal.trip_temperature_c must be positive, got {}",
                self.trip_temperature_c
            )));
        }
        if self.recover_offset_c < 0.0 {
            return Err(ConfigError::Validation(
                "thermal.recover_offset_c must not be negative".into(),
            ));
        }
        if self.sample_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "thermal.sample_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            trip_temperature_c: default_trip_temperature_c(),
            recover_offset_c: default_recover_offset_c(),
            sample_interval_secs: default_sample_interval_secs(),
            trip_duration_secs: default_trip_duration_secs(),
            recover_duration_secs: default_recover_duration_secs(),
        }
    }
}

fn default_trip_temperature_c() -> f64 {
    95.0
}
fn default_recover_offset_c() -> f64 {
    ThermalPolicy::DEFAULT_RECOVER_OFFSET_C
}
fn default_sample_interval_secs() -> u32 {
    ThermalPolicy::DEFAULT_SAMPLE_INTERVAL_SECONDS
}
fn default_trip_duration_secs() -> u32 {
    ThermalPolicy::DEFAULT_TRIP_DURATION_SECONDS
}
fn default_recover_duration_secs() -> u32 {
    ThermalPolicy::DEFAULT_RECOVER_DURATION_SECONDS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_internet_host")]
    pub internet_host: String,
}

impl ConnectivityConfig {
    pub fn policy(&self) -> ConnectivityPolicyConfig {
        ConnectivityPolicyConfig {
            failure_threshold: self.failure_threshold,
            max_retries: self.max_retries,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            max_retries: default_max_retries(),
            internet_host: default_internet_host(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_max_retries() -> u32 {
    3
}
fn default_internet_host() -> String {
    "1.1.1.1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusApiConfig {
    #[serde(default = "default_status_host")]
    pub host: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

impl StatusApiConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "status_api.port must be in 1-65535".into(),
            ));
        }
        let loopback = self.host == "localhost"
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if !loopback {
            return Err(ConfigError::Validation(format!(
                "status_api.host must be a loopback address, got '{}'",
                self.host
            )));
        }
        Ok(())
    }
}

impl Default for StatusApiConfig {
    fn default() -> Self {
        Self {
            host: default_status_host(),
            port: default_status_port(),
        }
    }
}

fn default_status_host() -> String {
    "127.0.0.1".into()
}
fn default_status_port() -> u16 {
    1988
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Budget for calls that shell out to slow utilities (powermetrics, networksetup).
    #[serde(default = "default_slow_timeout_secs")]
    pub slow_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl HelperConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "helper.max_attempts must be at least 1".into(),
            ));
        }
        if self.socket_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "helper.socket_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            timeout_secs: default_timeout_secs(),
            slow_timeout_secs: default_slow_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_socket_path() -> String {
    "/var/run/vigil/helper.sock".into()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_slow_timeout_secs() -> u64 {
    15
}
fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThunderboltConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "ThunderboltIpConfig::default_configs")]
    pub configs: Vec<ThunderboltIpConfig>,
    #[serde(default = "default_inter_config_delay_secs")]
    pub inter_config_delay_secs: u64,
    #[serde(default = "default_v6_delay_secs")]
    pub v6_delay_secs: u64,
}

impl Default for ThunderboltConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            configs: ThunderboltIpConfig::default_configs(),
            inter_config_delay_secs: default_inter_config_delay_secs(),
            v6_delay_secs: default_v6_delay_secs(),
        }
    }
}

fn default_inter_config_delay_secs() -> u64 {
    2
}
fn default_v6_delay_secs() -> u64 {
    3
}

use std::io::Write;

use vg_core::config::{Config, ConfigError};
use vg_core::types::OperatingMode;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "human");
    assert_eq!(cfg.guard.mode, OperatingMode::Standard);
    assert_eq!(cfg.guard.target_list(), vec!["exo"]);
    assert_eq!(cfg.guard.loop_interval_secs, 5);
    assert_eq!(cfg.guard.network_probe_interval_secs, 60);
    assert!(!cfg.guard.auto_restart);
    assert!(!cfg.guard.wifi_auto_recovery);
    assert_eq!(cfg.restart.auto_restart_cooldown_secs, 15);
    assert_eq!(cfg.restart.full_restart_cooldown_secs, 60);
    assert_eq!(cfg.restart.max_failures_before_full_restart, 3);
    assert_eq!(cfg.connectivity.failure_threshold, 3);
    assert_eq!(cfg.connectivity.max_retries, 3);
    assert_eq!(cfg.connectivity.internet_host, "1.1.1.1");
    assert_eq!(cfg.status_api.host, "127.0.0.1");
    assert_eq!(cfg.status_api.port, 1988);
    assert_eq!(cfg.helper.timeout_secs, 5);
    assert_eq!(cfg.helper.slow_timeout_secs, 15);
    assert_eq!(cfg.helper.max_attempts, 3);
    assert!(!cfg.thunderbolt.enabled);
    assert_eq!(cfg.thunderbolt.configs.len(), 4);
    cfg.validate().expect("defaults validate");
}

#[test]
fn default_thermal_policy() {
    let policy = Config::default().thermal.policy();
    assert_eq!(policy.trip_temperature_c, 95.0);
    assert_eq!(policy.recover_temperature_c, 85.0);
    assert_eq!(policy.sample_interval_seconds, 5);
    assert_eq!(policy.trip_duration_seconds, 60);
    assert_eq!(policy.recover_duration_seconds, 120);
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("1988"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.status_api.port, cfg.status_api.port);
    assert_eq!(parsed.guard.targets, cfg.guard.targets);
    assert_eq!(parsed.thunderbolt.configs, cfg.thunderbolt.configs);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[guard]
mode = "cluster"
targets = "exo, worker"
auto_restart = true

[thermal]
trip_temperature_c = 90.0
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.guard.mode, OperatingMode::Cluster);
    assert_eq!(cfg.guard.target_list(), vec!["exo", "worker"]);
    assert!(cfg.guard.auto_restart);
    assert_eq!(cfg.thermal.policy().recover_temperature_c, 80.0);
    // defaults should fill in the rest
    assert_eq!(cfg.status_api.port, 1988);
    assert_eq!(cfg.guard.loop_interval_secs, 5);
    cfg.validate().expect("config validates");
}

#[test]
fn thunderbolt_entries_fill_defaults() {
    let text = r#"
[thunderbolt]
enabled = true
configs = [{ service = "Bridge A", ip = "10.1.0.1" }]
"#;
    let cfg: Config = toml::from_str(text).expect("parse thunderbolt");
    assert!(cfg.thunderbolt.enabled);
    assert_eq!(cfg.thunderbolt.configs.len(), 1);
    let entry = &cfg.thunderbolt.configs[0];
    assert_eq!(entry.subnet, "255.255.255.0");
    assert_eq!(entry.router, "");
    assert!(entry.enabled);
}

#[test]
fn empty_targets_fail_validation() {
    let mut cfg = Config::default();
    cfg.guard.targets = " , ".into();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("guard.targets"));
}

#[test]
fn non_loopback_status_host_fails_validation() {
    let mut cfg = Config::default();
    cfg.status_api.host = "0.0.0.0".into();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("loopback"));

    cfg.status_api.host = "::1".into();
    cfg.validate().expect("ipv6 loopback is allowed");
    cfg.status_api.host = "localhost".into();
    cfg.validate().expect("localhost is allowed");
}

#[test]
fn invalid_numbers_fail_validation() {
    let mut cfg = Config::default();
    cfg.thermal.trip_temperature_c = 0.0;
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

    let mut cfg = Config::default();
    cfg.status_api.port = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.helper.max_attempts = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.guard.loop_interval_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[status_api]\nport = 2020").expect("write config");
    let cfg = Config::load_from(file.path()).expect("load config");
    assert_eq!(cfg.status_api.port, 2020);
}

#[test]
fn load_from_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[status_api\nport = ").expect("write config");
    let err = Config::load_from(file.path()).expect_err("parse should fail");
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = Config::load_from(dir.path().join("missing.toml")).expect_err("io error");
    assert!(matches!(err, ConfigError::Io(_)));
}

use chrono::TimeZone;
use vg_core::types::*;

#[test]
fn cluster_mode_enables_everything() {
    let behavior = ModeBehavior::for_mode(OperatingMode::Cluster);
    assert!(behavior.prevent_system_sleep);
    assert!(behavior.prevent_display_sleep);
    assert!(behavior.allow_clamshell);
    assert!(behavior.network_guard_enabled);
}

#[test]
fn standard_mode_only_prevents_system_sleep() {
    let behavior = OperatingMode::Standard.behavior();
    assert!(behavior.prevent_system_sleep);
    assert!(!behavior.prevent_display_sleep);
    assert!(!behavior.allow_clamshell);
    assert!(!behavior.network_guard_enabled);
}

#[test]
fn status_payload_wire_shape() {
    let payload = StatusPayload {
        schema_version: STATUS_SCHEMA_VERSION.into(),
        status: GuardStatus::OverheatTrip,
        mode: OperatingMode::Cluster,
        temp_c: Some(65.2),
        is_charging: true,
        lid_closed: false,
        target_process: "exo".into(),
        target_process_running: true,
        network_state: NetworkState::LanLost,
        last_updated: "2026-01-01T00:00:00Z".into(),
    };
    let json = serde_json::to_value(&payload).expect("serialize payload");
    assert_eq!(json["schema_version"], "1.0");
    assert_eq!(json["status"], "overheat_trip");
    assert_eq!(json["mode"], "cluster");
    assert_eq!(json["temp_c"], 65.2);
    assert_eq!(json["is_charging"], true);
    assert_eq!(json["lid_closed"], false);
    assert_eq!(json["target_process"], "exo");
    assert_eq!(json["target_process_running"], true);
    assert_eq!(json["network_state"], "lan_lost");
    assert_eq!(json.as_object().map(|o| o.len()), Some(10));
}

#[test]
fn missing_temperature_serializes_as_null() {
    let payload = StatusPayload {
        schema_version: STATUS_SCHEMA_VERSION.into(),
        status: GuardStatus::Paused,
        mode: OperatingMode::Standard,
        temp_c: None,
        is_charging: false,
        lid_closed: false,
        target_process: "exo".into(),
        target_process_running: false,
        network_state: NetworkState::Ok,
        last_updated: "x".into(),
    };
    let json = serde_json::to_value(&payload).expect("serialize payload");
    assert!(json.get("temp_c").expect("temp_c key present").is_null());
}

#[test]
fn timestamps_are_second_precision_utc() {
    let at = chrono::Utc
        .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
        .single()
        .expect("valid date");
    assert_eq!(iso8601(at), "2026-03-04T05:06:07Z");
}

#[test]
fn ipv4_configuration_wire_names() {
    let json = serde_json::to_string(&Ipv4Configuration::SelfAssigned).expect("serialize");
    assert_eq!(json, "\"selfAssigned\"");
    assert_eq!(ServiceIpv4Snapshot::unknown().configuration, Ipv4Configuration::Unknown);
}

#[test]
fn default_thunderbolt_configs() {
    let configs = ThunderboltIpConfig::default_configs();
    assert_eq!(configs.len(), 4);
    assert_eq!(configs[0].service, "EXO Thunderbolt 1");
    assert_eq!(configs[3].ip, "10.0.0.4");
    assert!(configs.iter().all(|c| c.subnet == "255.255.255.0" && c.enabled));
}

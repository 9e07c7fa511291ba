use std::sync::Arc;

use vg_core::state_store::{CycleUpdate, StateStore};
use vg_core::types::{GuardStatus, NetworkState, OperatingMode, PermissionWarning};

#[tokio::test]
async fn initial_snapshot_is_paused() {
    let store = StateStore::new(OperatingMode::Standard, "exo");
    let payload = store.snapshot_status("2026-01-01T00:00:00Z").await;
    assert_eq!(payload.schema_version, "1.0");
    assert_eq!(payload.status, GuardStatus::Paused);
    assert_eq!(payload.mode, OperatingMode::Standard);
    assert_eq!(payload.target_process, "exo");
    assert!(!payload.target_process_running);
    assert_eq!(payload.network_state, NetworkState::Ok);
    assert_eq!(payload.temp_c, None);
    assert_eq!(payload.last_updated, "2026-01-01T00:00:00Z");
}

#[tokio::test]
async fn permission_warning_overrides_status() {
    let store = StateStore::new(OperatingMode::Cluster, "exo");
    store.update_guard_status(GuardStatus::Active).await;
    store.update_permission_warning(PermissionWarning::Warning).await;

    assert_eq!(store.snapshot_now().await.status, GuardStatus::Degraded);
    assert_eq!(store.underlying_status().await, GuardStatus::Active);

    store.update_permission_warning(PermissionWarning::None).await;
    assert_eq!(store.snapshot_now().await.status, GuardStatus::Active);
}

#[tokio::test]
async fn permission_warning_also_masks_overheat() {
    let store = StateStore::new(OperatingMode::Standard, "exo");
    store.update_guard_status(GuardStatus::OverheatTrip).await;
    store.update_permission_warning(PermissionWarning::Warning).await;
    assert_eq!(store.snapshot_now().await.status, GuardStatus::Degraded);
}

#[tokio::test]
async fn apply_cycle_keeps_network_state_without_probe() {
    let store = StateStore::new(OperatingMode::Standard, "exo");
    store.update_network_state(NetworkState::WanLost).await;

    store
        .apply_cycle(CycleUpdate {
            status: GuardStatus::Active,
            target_process: "exo".into(),
            target_process_running: true,
            network_state: None,
            temp_c: Some(61.5),
        })
        .await;

    let payload = store.snapshot_now().await;
    assert_eq!(payload.status, GuardStatus::Active);
    assert!(payload.target_process_running);
    assert_eq!(payload.network_state, NetworkState::WanLost);
    assert_eq!(payload.temp_c, Some(61.5));
}

#[tokio::test]
async fn power_state_and_mode_updates() {
    let store = StateStore::new(OperatingMode::Standard, "exo");
    store.update_power_state(true, true).await;
    store.update_mode(OperatingMode::Cluster).await;
    let payload = store.snapshot_now().await;
    assert!(payload.is_charging);
    assert!(payload.lid_closed);
    assert_eq!(payload.mode, OperatingMode::Cluster);
}

#[tokio::test]
async fn snapshots_never_observe_a_partial_cycle() {
    let store = Arc::new(StateStore::new(OperatingMode::Standard, "idle"));

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let running = i % 2 == 0;
                store
                    .apply_cycle(CycleUpdate {
                        status: if running { GuardStatus::Active } else { GuardStatus::Paused },
                        target_process: if running { "exo".into() } else { "idle".into() },
                        target_process_running: running,
                        network_state: Some(NetworkState::Ok),
                        temp_c: None,
                    })
                    .await;
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..200 {
        let payload = store.snapshot_now().await;
        let consistent = match payload.status {
            GuardStatus::Active => payload.target_process_running && payload.target_process == "exo",
            _ => !payload.target_process_running && payload.target_process == "idle",
        };
        assert!(consistent, "torn snapshot: {payload:?}");
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer task");
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vg_core::state_store::StateStore;
use vg_core::types::{ModeBehavior, OperatingMode, PrivilegeState, ProbeSnapshot, ServiceIpv4Snapshot};
use vg_daemon::collaborators::{
    NetworkProbe, PowerAssertionError, PowerAssertionManager, PowerState, PowerStateProvider, ProbeError,
    ProcessControlError, ProcessController, ProcessSnapshotProvider, TemperatureProvider,
};
use vg_daemon::daemon::DaemonParts;
use vg_daemon::orchestrator::{GuardRuntimeOrchestrator, OrchestratorSettings, RuntimeDependencies};
use vg_daemon::sleep_guard::SleepGuard;
use vg_privileged::client::Result as PrivilegedResult;
use vg_privileged::{PrivilegedClientError, PrivilegedCommanding};

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProcesses {
    names: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeProcesses {
    pub fn set(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessSnapshotProvider for FakeProcesses {
    async fn running_process_names(&self) -> Result<Vec<String>, ProbeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProbeError::Command("ps exited with status 1".into()));
        }
        Ok(self.names.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Replays queued results; healthy once the queue runs dry.
#[derive(Default)]
pub struct FakeNetwork {
    queue: Mutex<VecDeque<Result<ProbeSnapshot, ProbeError>>>,
    pub probes: AtomicUsize,
}

impl FakeNetwork {
    pub fn push(&self, result: Result<ProbeSnapshot, ProbeError>) {
        self.queue.lock().unwrap().push_back(result);
    }

    pub fn push_offline(&self, count: usize) {
        for _ in 0..count {
            self.push(Ok(ProbeSnapshot::new(false, false)));
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkProbe for FakeNetwork {
    async fn probe(&self) -> Result<ProbeSnapshot, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ProbeSnapshot::new(true, true)))
    }
}

// ---------------------------------------------------------------------------
// Temperature
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTemperature {
    value: Mutex<Option<f64>>,
}

impl FakeTemperature {
    pub fn set(&self, value: Option<f64>) {
        *self.value.lock().unwrap() = value;
    }
}

#[async_trait]
impl TemperatureProvider for FakeTemperature {
    async fn current_temperature_c(&self) -> Option<f64> {
        *self.value.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePower {
    held: Mutex<Option<ModeBehavior>>,
    pub activations: AtomicUsize,
}

impl FakePower {
    pub fn held(&self) -> Option<ModeBehavior> {
        *self.held.lock().unwrap()
    }
}

#[async_trait]
impl PowerAssertionManager for FakePower {
    async fn activate(&self, behavior: ModeBehavior) -> Result<(), PowerAssertionError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        *self.held.lock().unwrap() = Some(behavior);
        Ok(())
    }

    async fn deactivate(&self) {
        *self.held.lock().unwrap() = None;
    }

    async fn is_active(&self) -> bool {
        self.held.lock().unwrap().is_some()
    }
}

#[derive(Default)]
pub struct FakePowerState {
    pub state: Mutex<PowerState>,
}

#[async_trait]
impl PowerStateProvider for FakePowerState {
    async fn power_state(&self) -> PowerState {
        *self.state.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Process control
// ---------------------------------------------------------------------------

/// Records every call as `"<verb> <argument>"`.
#[derive(Default)]
pub struct FakeController {
    calls: Mutex<Vec<String>>,
    fail_launch: AtomicBool,
}

impl FakeController {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_launches(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn launch_result(&self, target: &str) -> Result<(), ProcessControlError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(ProcessControlError::LaunchFailed {
                target: target.to_string(),
                reason: "no such file".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessController for FakeController {
    async fn force_terminate(&self, name: &str) -> Result<(), ProcessControlError> {
        self.record(format!("kill {name}"));
        Ok(())
    }

    async fn launch_by_name(&self, name: &str) -> Result<(), ProcessControlError> {
        self.record(format!("launch {name}"));
        self.launch_result(name)
    }

    async fn launch_command(&self, command: &str) -> Result<(), ProcessControlError> {
        self.record(format!("command {command}"));
        self.launch_result(command)
    }

    async fn open_application(&self, bundle: &Path) -> Result<(), ProcessControlError> {
        self.record(format!("open {}", bundle.display()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Privileged helper
// ---------------------------------------------------------------------------

pub struct FakePrivileged {
    pub sleep_calls: Mutex<Vec<bool>>,
    pub privilege: Mutex<PrivilegeState>,
    pub repairs: AtomicUsize,
    pub wifi_restarts: AtomicUsize,
    /// `"set <service> <ip>"` / `"v6 <service>"`.
    pub network_calls: Mutex<Vec<String>>,
    /// Services whose static IP assignment fails.
    pub failing_services: Mutex<Vec<String>>,
    pub unreachable: AtomicBool,
}

impl Default for FakePrivileged {
    fn default() -> Self {
        Self {
            sleep_calls: Mutex::new(Vec::new()),
            privilege: Mutex::new(PrivilegeState::Healthy),
            repairs: AtomicUsize::new(0),
            wifi_restarts: AtomicUsize::new(0),
            network_calls: Mutex::new(Vec::new()),
            failing_services: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }
}

impl FakePrivileged {
    pub fn sleep_calls(&self) -> Vec<bool> {
        self.sleep_calls.lock().unwrap().clone()
    }

    pub fn network_calls(&self) -> Vec<String> {
        self.network_calls.lock().unwrap().clone()
    }

    pub fn set_privilege(&self, state: PrivilegeState) {
        *self.privilege.lock().unwrap() = state;
    }

    fn reachable(&self) -> PrivilegedResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PrivilegedClientError::ConnectionUnavailable("no such file or directory".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PrivilegedCommanding for FakePrivileged {
    async fn set_disable_sleep(&self, disabled: bool) -> PrivilegedResult<()> {
        self.reachable()?;
        self.sleep_calls.lock().unwrap().push(disabled);
        Ok(())
    }

    async fn restart_wifi(&self) -> PrivilegedResult<()> {
        self.reachable()?;
        self.wifi_restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn repair_privileges(&self) -> PrivilegedResult<()> {
        self.reachable()?;
        self.repairs.fetch_add(1, Ordering::SeqCst);
        self.set_privilege(PrivilegeState::Healthy);
        Ok(())
    }

    async fn current_privilege_state(&self) -> PrivilegeState {
        if self.reachable().is_err() {
            return PrivilegeState::Lost;
        }
        *self.privilege.lock().unwrap()
    }

    async fn current_soc_temperature(&self) -> PrivilegedResult<f64> {
        self.reachable()?;
        Ok(48.0)
    }

    async fn set_static_ip(&self, service: &str, ip: &str, _subnet: &str, _router: &str) -> PrivilegedResult<()> {
        self.reachable()?;
        self.network_calls
            .lock()
            .unwrap()
            .push(format!("set {service} {ip}"));
        if self.failing_services.lock().unwrap().iter().any(|s| s == service) {
            return Err(PrivilegedClientError::OperationFailed(format!(
                "command failed (code: 4): ** Error: {service} not found"
            )));
        }
        Ok(())
    }

    async fn set_v6_link_local(&self, service: &str) -> PrivilegedResult<()> {
        self.reachable()?;
        self.network_calls.lock().unwrap().push(format!("v6 {service}"));
        Ok(())
    }

    async fn current_service_ipv4_snapshot(&self, _service: &str) -> ServiceIpv4Snapshot {
        ServiceIpv4Snapshot::unknown()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<StateStore>,
    pub orchestrator: GuardRuntimeOrchestrator,
    pub processes: Arc<FakeProcesses>,
    pub network: Arc<FakeNetwork>,
    pub temperature: Arc<FakeTemperature>,
    pub power: Arc<FakePower>,
    pub power_state: Arc<FakePowerState>,
    pub controller: Arc<FakeController>,
    pub privileged: Arc<FakePrivileged>,
    pub sleep_guard: Arc<SleepGuard>,
}

pub fn settings(mode: OperatingMode, targets: &[&str]) -> OrchestratorSettings {
    OrchestratorSettings {
        mode,
        targets: targets.iter().map(|t| t.to_string()).collect(),
        ..OrchestratorSettings::default()
    }
}

pub struct Fakes {
    pub processes: Arc<FakeProcesses>,
    pub network: Arc<FakeNetwork>,
    pub temperature: Arc<FakeTemperature>,
    pub power: Arc<FakePower>,
    pub power_state: Arc<FakePowerState>,
    pub controller: Arc<FakeController>,
    pub privileged: Arc<FakePrivileged>,
    pub sleep_guard: Arc<SleepGuard>,
}

impl Fakes {
    pub fn new() -> Self {
        let privileged = Arc::new(FakePrivileged::default());
        let sleep_guard = Arc::new(SleepGuard::new(privileged.clone()));
        Self {
            processes: Arc::default(),
            network: Arc::default(),
            temperature: Arc::default(),
            power: Arc::default(),
            power_state: Arc::default(),
            controller: Arc::default(),
            privileged,
            sleep_guard,
        }
    }

    pub fn dependencies(&self) -> RuntimeDependencies {
        RuntimeDependencies {
            processes: self.processes.clone(),
            network: self.network.clone(),
            temperature: self.temperature.clone(),
            power: self.power.clone(),
            sleep_guard: self.sleep_guard.clone(),
            controller: self.controller.clone(),
        }
    }

    pub fn daemon_parts(&self) -> DaemonParts {
        DaemonParts {
            privileged: self.privileged.clone(),
            dependencies: self.dependencies(),
            power_state: self.power_state.clone(),
        }
    }
}

pub fn harness(settings: OrchestratorSettings) -> Harness {
    let fakes = Fakes::new();
    let target = settings.targets.first().cloned().unwrap_or_default();
    let store = Arc::new(StateStore::new(settings.mode, target));
    let orchestrator = GuardRuntimeOrchestrator::new(store.clone(), fakes.dependencies(), settings);
    Harness {
        store,
        orchestrator,
        processes: fakes.processes,
        network: fakes.network,
        temperature: fakes.temperature,
        power: fakes.power,
        power_state: fakes.power_state,
        controller: fakes.controller,
        privileged: fakes.privileged,
        sleep_guard: fakes.sleep_guard,
    }
}

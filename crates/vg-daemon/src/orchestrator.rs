//! The guard control cycle.
//!
//! [`GuardRuntimeOrchestrator::run_cycle`] is the only place policy
//! decisions are made: it reads processes, network and temperature through
//! the collaborator traits, feeds the policy machines, drives the side
//! effects and commits one coherent snapshot to the [`StateStore`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vg_core::config::{Config, RestartConfig};
use vg_core::connectivity::{ConnectivityAction, ConnectivityPolicyConfig, ConnectivityPolicyTracker};
use vg_core::process_matcher::matched_target;
use vg_core::state_store::{CycleUpdate, StateStore};
use vg_core::thermal::{ThermalAction, ThermalPolicy, ThermalProtectionController, ThermalState};
use vg_core::types::{GuardStatus, NetworkState, OperatingMode, RestartAttemptInfo, RestartKind};
use vg_telemetry::redact::Redacted;

use crate::collaborators::{
    NetworkProbe, PowerAssertionManager, ProcessControlError, ProcessController,
    ProcessSnapshotProvider, TemperatureProvider,
};
use crate::sleep_guard::SleepGuard;
use crate::system::resolve_app_bundle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct RuntimeDependencies {
    pub processes: Arc<dyn ProcessSnapshotProvider>,
    pub network: Arc<dyn NetworkProbe>,
    pub temperature: Arc<dyn TemperatureProvider>,
    pub power: Arc<dyn PowerAssertionManager>,
    pub sleep_guard: Arc<SleepGuard>,
    pub controller: Arc<dyn ProcessController>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Minimum spacing between any two restart attempts.
    pub auto_restart_cooldown: Duration,
    /// Minimum spacing between two full restarts.
    pub full_restart_cooldown: Duration,
    pub max_failures_before_full_restart: u32,
    pub settle: Duration,
    pub reopen_wait: Duration,
}

impl From<&RestartConfig> for RestartPolicy {
    fn from(config: &RestartConfig) -> Self {
        Self {
            auto_restart_cooldown: Duration::from_secs(config.auto_restart_cooldown_secs),
            full_restart_cooldown: Duration::from_secs(config.full_restart_cooldown_secs),
            max_failures_before_full_restart: config.max_failures_before_full_restart,
            settle: Duration::from_secs(config.settle_secs),
            reopen_wait: Duration::from_secs(config.reopen_wait_secs),
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&RestartConfig::default())
    }
}

/// Initial orchestrator settings. Everything except the restart and
/// connectivity policies can be changed later through the mutators.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: OperatingMode,
    pub targets: Vec<String>,
    pub auto_restart: bool,
    pub launch_command: String,
    pub restart: RestartPolicy,
    pub thermal: ThermalPolicy,
    pub connectivity: ConnectivityPolicyConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.guard.mode,
            targets: config.guard.target_list(),
            auto_restart: config.guard.auto_restart,
            launch_command: config.guard.launch_command.clone(),
            restart: RestartPolicy::from(&config.restart),
            thermal: config.thermal.policy(),
            connectivity: config.connectivity.policy(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// ---------------------------------------------------------------------------
// Restart bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartState {
    pub consecutive_failures: u32,
    pub last_attempt: Option<Instant>,
    pub last_full_restart: Option<Instant>,
}

fn elapsed_since(at: Option<Instant>, now: Instant, window: Duration) -> bool {
    at.is_none_or(|at| now.saturating_duration_since(at) >= window)
}

/// Which restart, if any, is allowed at `now`.
pub fn decide_restart(state: &RestartState, policy: &RestartPolicy, now: Instant) -> Option<RestartKind> {
    if !elapsed_since(state.last_attempt, now, policy.auto_restart_cooldown) {
        return None;
    }
    if state.consecutive_failures >= policy.max_failures_before_full_restart {
        return elapsed_since(state.last_full_restart, now, policy.full_restart_cooldown)
            .then_some(RestartKind::FullRestart);
    }
    Some(RestartKind::Normal)
}

/// What a restart relaunches: the explicit command when one is set,
/// otherwise the first target by name.
#[derive(Debug, Clone)]
struct LaunchPlan {
    target: String,
    command: Option<String>,
}

impl LaunchPlan {
    fn new(targets: &[String], launch_command: &str) -> Option<Self> {
        let command = Some(launch_command.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let target = targets.first().cloned().unwrap_or_default();
        if command.is_none() && target.is_empty() {
            return None;
        }
        Some(Self { target, command })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleResult {
    /// `None` on cycles that did not probe, or whose probe failed.
    pub connectivity_action: Option<ConnectivityAction>,
    /// `None` when no temperature reading was available.
    pub thermal_action: Option<ThermalAction>,
    pub restart_attempt: Option<RestartAttemptInfo>,
    pub temp_c: Option<f64>,
}

struct Inner {
    mode: OperatingMode,
    targets: Vec<String>,
    auto_restart: bool,
    launch_command: String,
    thermal: Arc<ThermalProtectionController>,
    restart: RestartState,
    /// Last connectivity verdict; holds between probes.
    network_alert: bool,
}

/// Configuration captured at the start of a cycle.
struct CycleView {
    mode: OperatingMode,
    targets: Vec<String>,
    auto_restart: bool,
    launch_command: String,
    thermal: Arc<ThermalProtectionController>,
}

pub struct GuardRuntimeOrchestrator {
    store: Arc<StateStore>,
    deps: RuntimeDependencies,
    connectivity: ConnectivityPolicyTracker,
    restart_policy: RestartPolicy,
    inner: Mutex<Inner>,
}

impl GuardRuntimeOrchestrator {
    pub fn new(store: Arc<StateStore>, deps: RuntimeDependencies, settings: OrchestratorSettings) -> Self {
        Self {
            store,
            deps,
            connectivity: ConnectivityPolicyTracker::new(settings.connectivity),
            restart_policy: settings.restart,
            inner: Mutex::new(Inner {
                mode: settings.mode,
                targets: settings.targets,
                auto_restart: settings.auto_restart,
                launch_command: settings.launch_command,
                thermal: Arc::new(ThermalProtectionController::new(settings.thermal)),
                restart: RestartState::default(),
                network_alert: false,
            }),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Run one control cycle and commit its outcome to the store.
    pub async fn run_cycle(&self, probe_network: bool) -> CycleResult {
        let view = {
            let inner = self.inner.lock().await;
            CycleView {
                mode: inner.mode,
                targets: inner.targets.clone(),
                auto_restart: inner.auto_restart,
                launch_command: inner.launch_command.clone(),
                thermal: Arc::clone(&inner.thermal),
            }
        };
        let mut result = CycleResult::default();

        let running = match self.deps.processes.running_process_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "process listing failed");
                Vec::new()
            }
        };
        let matched = matched_target(&view.targets, &running);
        let target_running = matched.is_some();
        let target = matched
            .or_else(|| view.targets.first().cloned())
            .unwrap_or_default();
        let thermal_hold = view.thermal.state() != ThermalState::Normal;

        let mut status = if target_running {
            self.inner.lock().await.restart.consecutive_failures = 0;
            self.engage(view.mode).await;
            GuardStatus::Active
        } else {
            if view.auto_restart && !thermal_hold {
                result.restart_attempt = self.attempt_restart(&view).await;
            }
            self.release().await;
            GuardStatus::Paused
        };

        let mut network_state = None;
        if probe_network {
            match self.deps.network.probe().await {
                Ok(snapshot) => {
                    let action = self.connectivity.evaluate(snapshot);
                    network_state = Some(snapshot.network_state());
                    self.inner.lock().await.network_alert = matches!(action, ConnectivityAction::Alert(_));
                    result.connectivity_action = Some(action);
                }
                Err(e) => warn!(error = %Redacted(&e), "network probe failed"),
            }
        }
        if view.mode.behavior().network_guard_enabled && self.inner.lock().await.network_alert {
            status = GuardStatus::Degraded;
        }

        let temp_c = self.deps.temperature.current_temperature_c().await;
        result.temp_c = temp_c;
        if let Some(celsius) = temp_c {
            let action = view.thermal.record(celsius);
            if action == ThermalAction::Tripped {
                warn!(temp_c = celsius, target = %target, "thermal trip, terminating target");
                if let Err(e) = self.deps.controller.force_terminate(&target).await {
                    warn!(error = %e, target = %target, "termination after thermal trip failed");
                }
            }
            result.thermal_action = Some(action);
        }
        if view.thermal.state() != ThermalState::Normal {
            status = GuardStatus::OverheatTrip;
        }

        debug!(%status, target = %target, running = target_running, ?network_state, ?temp_c, "cycle complete");
        self.store
            .apply_cycle(CycleUpdate {
                status,
                target_process: target,
                target_process_running: target_running,
                network_state,
                temp_c,
            })
            .await;
        result
    }

    async fn engage(&self, mode: OperatingMode) {
        if let Err(e) = self.deps.power.activate(mode.behavior()).await {
            warn!(error = %e, "power assertion failed");
        }
        if let Err(e) = self.deps.sleep_guard.activate(mode).await {
            warn!(error = %Redacted(&e), "sleep inhibition failed");
        }
    }

    async fn release(&self) {
        self.deps.power.deactivate().await;
        if let Err(e) = self.deps.sleep_guard.deactivate().await {
            warn!(error = %Redacted(&e), "releasing sleep inhibition failed");
        }
    }

    /// Release power assertions and sleep inhibition.
    pub async fn deactivate(&self) {
        self.release().await;
    }

    // -- restart ------------------------------------------------------------

    async fn attempt_restart(&self, view: &CycleView) -> Option<RestartAttemptInfo> {
        let plan = LaunchPlan::new(&view.targets, &view.launch_command)?;

        let (kind, failures) = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let kind = decide_restart(&inner.restart, &self.restart_policy, now)?;
            inner.restart.last_attempt = Some(now);
            (kind, inner.restart.consecutive_failures)
        };

        match kind {
            RestartKind::Normal => {
                let error = self.launch(&plan).await.err().map(|e| e.to_string());
                let failure_count = {
                    let mut inner = self.inner.lock().await;
                    inner.restart.consecutive_failures += 1;
                    inner.restart.consecutive_failures
                };
                match &error {
                    None => info!(target = %plan.target, failure_count, "restart attempted"),
                    Some(e) => warn!(target = %plan.target, failure_count, error = %e, "restart failed"),
                }
                Some(RestartAttemptInfo {
                    kind,
                    failure_count,
                    error,
                })
            }
            RestartKind::FullRestart => {
                warn!(target = %plan.target, failures, "escalating to full restart");
                let error = self.full_restart(&plan).await.err().map(|e| e.to_string());
                {
                    let mut inner = self.inner.lock().await;
                    let now = Instant::now();
                    inner.restart.consecutive_failures = 0;
                    inner.restart.last_attempt = Some(now);
                    inner.restart.last_full_restart = Some(now);
                }
                if let Some(e) = &error {
                    warn!(target = %plan.target, error = %e, "full restart failed");
                }
                Some(RestartAttemptInfo {
                    kind,
                    failure_count: failures,
                    error,
                })
            }
        }
    }

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), ProcessControlError> {
        match &plan.command {
            Some(command) => self.deps.controller.launch_command(command).await,
            None => self.deps.controller.launch_by_name(&plan.target).await,
        }
    }

    /// Force-terminate, reopen the owning app bundle, then relaunch. Every
    /// step runs; the first failure is reported.
    async fn full_restart(&self, plan: &LaunchPlan) -> Result<(), ProcessControlError> {
        let mut first_error = None;

        if !plan.target.is_empty() {
            if let Err(e) = self.deps.controller.force_terminate(&plan.target).await {
                first_error.get_or_insert(e);
            }
        }
        tokio::time::sleep(self.restart_policy.settle).await;

        if let Some(bundle) = plan.command.as_deref().and_then(resolve_app_bundle) {
            info!(bundle = %bundle.display(), "reopening application");
            if let Err(e) = self.deps.controller.open_application(&bundle).await {
                first_error.get_or_insert(e);
            }
        }
        tokio::time::sleep(self.restart_policy.reopen_wait).await;

        if let Err(e) = self.launch(plan).await {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn restart_state(&self) -> RestartState {
        self.inner.lock().await.restart
    }

    // -- thermal ------------------------------------------------------------

    pub async fn thermal_state(&self) -> ThermalState {
        self.inner.lock().await.thermal.state()
    }

    /// Acknowledge a cooled-down breaker. Only `Recovered` flips the guard
    /// back to Active.
    pub async fn confirm_thermal_recovery(&self) -> ThermalAction {
        let thermal = Arc::clone(&self.inner.lock().await.thermal);
        let action = thermal.confirm_recovery();
        if action == ThermalAction::Recovered {
            self.store.update_guard_status(GuardStatus::Active).await;
        }
        action
    }

    // -- mutators -----------------------------------------------------------

    pub async fn mode(&self) -> OperatingMode {
        self.inner.lock().await.mode
    }

    /// Switching to a mode that does not watch the network drops any
    /// connectivity alert, since no probe would ever clear it.
    pub async fn update_mode(&self, mode: OperatingMode) {
        let watched = mode.behavior().network_guard_enabled;
        {
            let mut inner = self.inner.lock().await;
            inner.mode = mode;
            if !watched {
                inner.network_alert = false;
                self.connectivity.reset();
            }
        }
        self.store.update_mode(mode).await;
        if !watched {
            self.store.update_network_state(NetworkState::Ok).await;
        }
        info!(%mode, "mode updated");
    }

    pub async fn update_targets(&self, targets: Vec<String>) {
        let targets: Vec<String> = targets
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        info!(?targets, "targets updated");
        self.inner.lock().await.targets = targets;
    }

    pub async fn update_auto_restart(&self, enabled: bool, command: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.auto_restart = enabled;
        inner.launch_command = command.into();
        info!(enabled, "auto-restart updated");
    }

    /// Swap in a fresh thermal controller; breaker state starts over.
    pub async fn update_thermal_policy(&self, policy: ThermalPolicy) {
        self.inner.lock().await.thermal = Arc::new(ThermalProtectionController::new(policy));
        info!(trip_c = policy.trip_temperature_c, "thermal policy updated");
    }

    /// Whether the last successful probe ended in a connectivity alert.
    pub async fn network_alerting(&self) -> bool {
        self.inner.lock().await.network_alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy::default()
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_is_normal() {
        let now = Instant::now();
        assert_eq!(
            decide_restart(&RestartState::default(), &policy(), now),
            Some(RestartKind::Normal)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_gates_every_attempt() {
        let now = Instant::now();
        let state = RestartState {
            consecutive_failures: 1,
            last_attempt: Some(now),
            last_full_restart: None,
        };
        assert_eq!(decide_restart(&state, &policy(), now + Duration::from_secs(14)), None);
        assert_eq!(
            decide_restart(&state, &policy(), now + Duration::from_secs(15)),
            Some(RestartKind::Normal)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_escalates_only_after_full_cooldown() {
        let now = Instant::now();
        let mut state = RestartState {
            consecutive_failures: 3,
            last_attempt: None,
            last_full_restart: None,
        };
        assert_eq!(decide_restart(&state, &policy(), now), Some(RestartKind::FullRestart));

        state.last_full_restart = Some(now);
        assert_eq!(decide_restart(&state, &policy(), now + Duration::from_secs(30)), None);
        assert_eq!(
            decide_restart(&state, &policy(), now + Duration::from_secs(60)),
            Some(RestartKind::FullRestart)
        );
    }

    #[test]
    fn launch_plan_prefers_command() {
        let targets = vec!["exo".to_string()];
        let plan = LaunchPlan::new(&targets, "  /opt/exo/bin/exo --serve ").unwrap();
        assert_eq!(plan.command.as_deref(), Some("/opt/exo/bin/exo --serve"));
        assert_eq!(plan.target, "exo");

        let plan = LaunchPlan::new(&targets, "   ").unwrap();
        assert!(plan.command.is_none());

        assert!(LaunchPlan::new(&[], "").is_none());
    }
}

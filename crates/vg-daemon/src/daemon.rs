use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use vg_core::command::{CommandRunner, SystemCommandRunner};
use vg_core::config::Config;
use vg_core::connectivity::ConnectivityAction;
use vg_core::state_store::StateStore;
use vg_core::thermal::ThermalAction;
use vg_core::types::{PrivilegeState, RestartKind};
use vg_privileged::{ClientConfig, PrivilegedCommandClient, PrivilegedCommanding};
use vg_telemetry::redact::Redacted;

use crate::collaborators::{PowerStateProvider, PrivilegedTemperatureProvider};
use crate::orchestrator::{CycleResult, GuardRuntimeOrchestrator, OrchestratorSettings, RuntimeDependencies};
use crate::permission::PermissionRepairCoordinator;
use crate::power::CaffeinateAssertionManager;
use crate::shutdown::ShutdownSignal;
use crate::sleep_guard::SleepGuard;
use crate::startup::StartupRecovery;
use crate::status_api::{self, LoopbackListener};
use crate::system::{
    SystemNetworkProbe, SystemPowerStateProvider, SystemProcessController, SystemProcessSnapshotProvider,
};
use crate::thunderbolt::ThunderboltApplier;

/// Samples kept by [`TemperatureHistory`].
pub const TEMPERATURE_HISTORY_LEN: usize = 30;

/// How long the status server gets to finish in-flight requests.
const API_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Control loop schedule. The first tick fires at once so status is current
/// from startup. A slow cycle (full restart, stalled helper) pushes the
/// schedule back instead of bursting the missed ticks.
pub fn control_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// ---------------------------------------------------------------------------
// Temperature history
// ---------------------------------------------------------------------------

/// Rolling window of the most recent temperature samples.
#[derive(Debug, Default)]
pub struct TemperatureHistory {
    samples: VecDeque<f64>,
}

impl TemperatureHistory {
    pub fn push(&mut self, celsius: f64) {
        if self.samples.len() == TEMPERATURE_HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(celsius);
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// `true` when a network probe is due at `now`.
pub fn probe_due(last_probe: Option<Instant>, now: Instant, interval: Duration) -> bool {
    last_probe.is_none_or(|at| now.saturating_duration_since(at) >= interval)
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Everything beyond the orchestrator's own collaborators that the runtime
/// loop touches.
#[derive(Clone)]
pub struct DaemonParts {
    pub privileged: Arc<dyn PrivilegedCommanding>,
    pub dependencies: RuntimeDependencies,
    pub power_state: Arc<dyn PowerStateProvider>,
}

impl DaemonParts {
    /// The production wiring: system utilities and the helper socket.
    pub fn system(config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let privileged: Arc<dyn PrivilegedCommanding> =
            Arc::new(PrivilegedCommandClient::new(ClientConfig::from(&config.helper)));
        let dependencies = RuntimeDependencies {
            processes: Arc::new(SystemProcessSnapshotProvider::new(Arc::clone(&runner))),
            network: Arc::new(SystemNetworkProbe::new(
                Arc::clone(&runner),
                config.connectivity.internet_host.clone(),
            )),
            temperature: Arc::new(PrivilegedTemperatureProvider::new(Arc::clone(&privileged))),
            power: Arc::new(CaffeinateAssertionManager::new()),
            sleep_guard: Arc::new(SleepGuard::new(Arc::clone(&privileged))),
            controller: Arc::new(SystemProcessController::new(Arc::clone(&runner))),
        };
        Self {
            privileged,
            dependencies,
            power_state: Arc::new(SystemPowerStateProvider::new(runner)),
        }
    }
}

/// The guardian daemon: startup recovery, the periodic control loop and
/// the status endpoint. Stops when its [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    shutdown: ShutdownSignal,
    store: Arc<StateStore>,
    orchestrator: Arc<GuardRuntimeOrchestrator>,
    privileged: Arc<dyn PrivilegedCommanding>,
    power_state: Arc<dyn PowerStateProvider>,
    permissions: Arc<PermissionRepairCoordinator>,
    startup: StartupRecovery,
    history: Mutex<TemperatureHistory>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let parts = DaemonParts::system(&config);
        Self::with_parts(config, parts)
    }

    pub fn with_parts(config: Config, parts: DaemonParts) -> Self {
        let settings = OrchestratorSettings::from_config(&config);
        let initial_target = settings.targets.first().cloned().unwrap_or_default();
        let store = Arc::new(StateStore::new(settings.mode, initial_target));
        let startup = StartupRecovery::new(Arc::clone(&parts.dependencies.sleep_guard));
        let orchestrator = Arc::new(GuardRuntimeOrchestrator::new(
            Arc::clone(&store),
            parts.dependencies,
            settings,
        ));
        let permissions = Arc::new(PermissionRepairCoordinator::new(
            Arc::clone(&parts.privileged),
            Arc::clone(&store),
        ));
        Self {
            config,
            shutdown: ShutdownSignal::new(),
            store,
            orchestrator,
            privileged: parts.privileged,
            power_state: parts.power_state,
            permissions,
            startup,
            history: Mutex::new(TemperatureHistory::default()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<GuardRuntimeOrchestrator> {
        &self.orchestrator
    }

    pub fn temperature_history(&self) -> Vec<f64> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).samples()
    }

    /// Bind the configured status address and run until shutdown.
    pub async fn run(&self) -> Result<()> {
        let api = &self.config.status_api;
        let listener = LoopbackListener::bind(&api.host, api.port)
            .await
            .context("failed to start status API")?;
        self.run_with_listener(listener).await
    }

    /// Run on an already bound status listener.
    pub async fn run_with_listener(&self, listener: LoopbackListener) -> Result<()> {
        self.startup.run().await;

        if self.config.thunderbolt.enabled {
            let applier = ThunderboltApplier::new(Arc::clone(&self.privileged), &self.config.thunderbolt);
            tokio::spawn(async move {
                let report = applier.apply().await;
                if let Some(failure) = report.first_failure {
                    warn!(failed = report.failed, first = %failure, "thunderbolt configuration incomplete");
                }
            });
        }

        let api_shutdown = self.shutdown.clone();
        let store = Arc::clone(&self.store);
        let mut api_handle = tokio::spawn(async move {
            if let Err(e) = status_api::serve(listener, store, async move { api_shutdown.wait().await }).await {
                error!(error = %e, "status API error");
            }
        });

        #[cfg(unix)]
        self.spawn_recovery_signal_listener();

        info!(
            loop_secs = self.config.guard.loop_interval_secs,
            probe_secs = self.config.guard.network_probe_interval_secs,
            mode = %self.config.guard.mode,
            "daemon starting control loop"
        );
        self.run_loop().await;
        self.orchestrator.deactivate().await;

        // The server stops accepting once the signal fires; give open
        // connections a bounded window before dropping them.
        if tokio::time::timeout(API_DRAIN_TIMEOUT, &mut api_handle).await.is_err() {
            warn!("status API did not stop in time, aborting");
            api_handle.abort();
        }
        info!("daemon stopped");
        Ok(())
    }

    /// SIGUSR1 acknowledges a cooled-down thermal breaker.
    #[cfg(unix)]
    fn spawn_recovery_signal_listener(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGUSR1 handler");
                return;
            }
        };
        let orchestrator = Arc::clone(&self.orchestrator);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = usr1.recv() => {
                        let action = orchestrator.confirm_thermal_recovery().await;
                        info!(?action, "thermal recovery confirmation requested");
                    }
                    _ = shutdown.wait() => break,
                }
            }
        });
    }

    async fn run_loop(&self) {
        let loop_interval = Duration::from_secs(self.config.guard.loop_interval_secs.max(1));
        let probe_interval = Duration::from_secs(self.config.guard.network_probe_interval_secs);
        let mut ticker = control_ticker(loop_interval);
        let mut last_probe: Option<Instant> = None;
        let mut repair_attempted = false;

        if self.shutdown.is_triggered() {
            return;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let probe = self.orchestrator.mode().await.behavior().network_guard_enabled
                        && probe_due(last_probe, now, probe_interval);
                    if probe {
                        last_probe = Some(now);
                    }

                    let result = self.orchestrator.run_cycle(probe).await;
                    if let Some(celsius) = result.temp_c {
                        self.history.lock().unwrap_or_else(|e| e.into_inner()).push(celsius);
                    }
                    self.apply_runtime_actions(&result).await;
                    self.refresh_power_state().await;
                    repair_attempted = self.refresh_permissions(repair_attempted).await;
                }
                _ = self.shutdown.wait() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }
    }

    async fn apply_runtime_actions(&self, result: &CycleResult) {
        if let Some(ConnectivityAction::Retry(state, attempt)) = result.connectivity_action {
            if self.config.guard.wifi_auto_recovery {
                info!(%state, attempt, "restarting wifi");
                if let Err(e) = self.privileged.restart_wifi().await {
                    warn!(error = %Redacted(&e), "wifi restart failed");
                }
            }
        }

        if let Some(attempt) = &result.restart_attempt {
            let kind = match attempt.kind {
                RestartKind::Normal => "normal",
                RestartKind::FullRestart => "full",
            };
            match &attempt.error {
                None => info!(kind, failures = attempt.failure_count, "target restart issued"),
                Some(e) => warn!(kind, failures = attempt.failure_count, error = %e, "target restart failed"),
            }
        }

        match result.thermal_action {
            Some(ThermalAction::Tripped) => warn!("thermal protection engaged"),
            Some(ThermalAction::RecoveryReady) => {
                info!("temperature recovered; send SIGUSR1 to resume")
            }
            _ => {}
        }
    }

    async fn refresh_power_state(&self) {
        let power = self.power_state.power_state().await;
        self.store
            .update_power_state(power.is_charging, power.lid_closed)
            .await;
    }

    /// Returns whether a repair has been attempted for the current episode
    /// of lost privileges. Only one automatic repair runs per episode.
    async fn refresh_permissions(&self, repair_attempted: bool) -> bool {
        match self.permissions.refresh_warning_state().await {
            PrivilegeState::Healthy => false,
            PrivilegeState::Lost if repair_attempted => true,
            PrivilegeState::Lost => {
                if let Err(e) = self.permissions.repair_if_needed().await {
                    warn!(error = %Redacted(&e), "privilege repair failed");
                }
                true
            }
        }
    }
}

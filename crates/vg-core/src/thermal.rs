use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalPolicy {
    pub sample_interval_seconds: u32,
    pub trip_temperature_c: f64,
    pub trip_duration_seconds: u32,
    /// Must sit below `trip_temperature_c` to form the hysteresis band.
    pub recover_temperature_c: f64,
    pub recover_duration_seconds: u32,
}

impl ThermalPolicy {
    pub const DEFAULT_SAMPLE_INTERVAL_SECONDS: u32 = 5;
    pub const DEFAULT_TRIP_DURATION_SECONDS: u32 = 60;
    pub const DEFAULT_RECOVER_DURATION_SECONDS: u32 = 120;
    pub const DEFAULT_RECOVER_OFFSET_C: f64 = 10.0;

    /// Policy derived from a single trip threshold; recovery sits a fixed
    /// offset below it, clamped at zero.
    pub fn from_threshold(trip_temperature_c: f64) -> Self {
        Self {
            sample_interval_seconds: Self::DEFAULT_SAMPLE_INTERVAL_SECONDS,
            trip_temperature_c,
            trip_duration_seconds: Self::DEFAULT_TRIP_DURATION_SECONDS,
            recover_temperature_c: (trip_temperature_c - Self::DEFAULT_RECOVER_OFFSET_C).max(0.0),
            recover_duration_seconds: Self::DEFAULT_RECOVER_DURATION_SECONDS,
        }
    }

    pub fn trip_samples_required(&self) -> u32 {
        Self::samples_for(self.trip_duration_seconds, self.sample_interval_seconds)
    }

    pub fn recover_samples_required(&self) -> u32 {
        Self::samples_for(self.recover_duration_seconds, self.sample_interval_seconds)
    }

    fn samples_for(duration: u32, interval: u32) -> u32 {
        duration.checked_div(interval).unwrap_or(duration).max(1)
    }
}

impl Default for ThermalPolicy {
    fn default() -> Self {
        Self::from_threshold(95.0)
    }
}

// ---------------------------------------------------------------------------
// State / Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    Normal,
    Tripped,
    RecoveryReady,
}

impl fmt::Display for ThermalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThermalState::Normal => "normal",
            ThermalState::Tripped => "tripped",
            ThermalState::RecoveryReady => "recovery_ready",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalAction {
    None,
    Tripped,
    RecoveryReady,
    Recovered,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    state: ThermalState,
    high_samples: u32,
    low_samples: u32,
}

impl Inner {
    fn enter(&mut self, state: ThermalState) {
        self.state = state;
        self.high_samples = 0;
        self.low_samples = 0;
    }
}

/// Hysteresis breaker over temperature samples.
///
/// `Normal -> Tripped` needs `trip_samples_required` consecutive samples above
/// the trip temperature, `Tripped -> RecoveryReady` needs
/// `recover_samples_required` consecutive samples below the recover
/// temperature. Leaving `RecoveryReady` is never automatic: only
/// [`confirm_recovery`](Self::confirm_recovery) returns the breaker to `Normal`.
#[derive(Debug)]
pub struct ThermalProtectionController {
    policy: ThermalPolicy,
    inner: Mutex<Inner>,
}

impl ThermalProtectionController {
    pub fn new(policy: ThermalPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                state: ThermalState::Normal,
                high_samples: 0,
                low_samples: 0,
            }),
        }
    }

    pub fn policy(&self) -> ThermalPolicy {
        self.policy
    }

    pub fn state(&self) -> ThermalState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Feed one temperature sample.
    pub fn record(&self, temperature_c: f64) -> ThermalAction {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            ThermalState::Normal => {
                if temperature_c > self.policy.trip_temperature_c {
                    inner.high_samples += 1;
                    if inner.high_samples >= self.policy.trip_samples_required() {
                        inner.enter(ThermalState::Tripped);
                        warn!(
                            temperature_c,
                            trip_c = self.policy.trip_temperature_c,
                            "thermal breaker tripped"
                        );
                        return ThermalAction::Tripped;
                    }
                } else {
                    inner.high_samples = 0;
                }
                ThermalAction::None
            }
            ThermalState::Tripped => {
                if temperature_c < self.policy.recover_temperature_c {
                    inner.low_samples += 1;
                    if inner.low_samples >= self.policy.recover_samples_required() {
                        inner.enter(ThermalState::RecoveryReady);
                        info!(temperature_c, "thermal recovery ready, awaiting confirmation");
                        return ThermalAction::RecoveryReady;
                    }
                } else {
                    inner.low_samples = 0;
                }
                ThermalAction::None
            }
            ThermalState::RecoveryReady => ThermalAction::None,
        }
    }

    /// Leave `RecoveryReady`. A no-op returning `None` in any other state.
    pub fn confirm_recovery(&self) -> ThermalAction {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state != ThermalState::RecoveryReady {
            return ThermalAction::None;
        }
        inner.enter(ThermalState::Normal);
        info!("thermal recovery confirmed");
        ThermalAction::Recovered
    }
}

impl Default for ThermalProtectionController {
    fn default() -> Self {
        Self::new(ThermalPolicy::default())
    }
}

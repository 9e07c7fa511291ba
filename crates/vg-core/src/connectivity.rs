use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{NetworkState, ProbeSnapshot};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What the caller should do after a reachability sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityAction {
    Healthy,
    /// Attempt active recovery; the `u32` is the 1-based retry number.
    Retry(NetworkState, u32),
    Alert(NetworkState),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ConnectivityPolicyConfig {
    /// Consecutive failures tolerated before any corrective action.
    pub failure_threshold: u32,
    /// Corrective attempts before the tracker starts alerting.
    pub max_retries: u32,
}

impl Default for ConnectivityPolicyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            max_retries: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    retries_used: u32,
}

/// Saturating escalation over reachability samples:
/// debounce, then bounded retries, then a sticky alert until healthy.
#[derive(Debug)]
pub struct ConnectivityPolicyTracker {
    config: ConnectivityPolicyConfig,
    inner: Mutex<Counters>,
}

impl ConnectivityPolicyTracker {
    pub fn new(config: ConnectivityPolicyConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Counters::default()),
        }
    }

    pub fn config(&self) -> ConnectivityPolicyConfig {
        self.config
    }

    pub fn evaluate(&self, snapshot: ProbeSnapshot) -> ConnectivityAction {
        let state = snapshot.network_state();
        let mut counters = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if state == NetworkState::Ok {
            if counters.consecutive_failures > 0 {
                info!(
                    failures = counters.consecutive_failures,
                    retries = counters.retries_used,
                    "connectivity restored"
                );
            }
            *counters = Counters::default();
            return ConnectivityAction::Healthy;
        }

        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);
        if counters.consecutive_failures < self.config.failure_threshold {
            return ConnectivityAction::Healthy;
        }

        if counters.retries_used < self.config.max_retries {
            counters.retries_used += 1;
            warn!(%state, attempt = counters.retries_used, "connectivity retry");
            return ConnectivityAction::Retry(state, counters.retries_used);
        }

        warn!(%state, failures = counters.consecutive_failures, "connectivity alert");
        ConnectivityAction::Alert(state)
    }

    /// `(consecutive_failures, retries_used)`.
    pub fn counters(&self) -> (u32, u32) {
        let counters = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        (counters.consecutive_failures, counters.retries_used)
    }

    pub fn reset(&self) {
        let mut counters = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *counters = Counters::default();
    }
}

impl Default for ConnectivityPolicyTracker {
    fn default() -> Self {
        Self::new(ConnectivityPolicyConfig::default())
    }
}

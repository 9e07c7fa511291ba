//! Power assertions held through a `caffeinate` child process.
//!
//! `caffeinate -w <pid>` exits on its own when the daemon dies, so a crash
//! never leaves the machine pinned awake.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vg_core::types::ModeBehavior;

use crate::collaborators::{PowerAssertionError, PowerAssertionManager};

const CAFFEINATE: &str = "/usr/bin/caffeinate";

struct Held {
    behavior: ModeBehavior,
    child: Option<Child>,
}

pub struct CaffeinateAssertionManager {
    program: String,
    held: Mutex<Option<Held>>,
}

impl CaffeinateAssertionManager {
    pub fn new() -> Self {
        Self::with_program(CAFFEINATE)
    }

    /// Use a different executable (tests point this at a stand-in).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            held: Mutex::new(None),
        }
    }

    fn spawn(&self, flags: &[&str]) -> Result<Child, PowerAssertionError> {
        let pid = std::process::id().to_string();
        Command::new(&self.program)
            .args(flags)
            .args(["-w", pid.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PowerAssertionError(format!("{}: {e}", self.program)))
    }
}

impl Default for CaffeinateAssertionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `caffeinate` flags for `behavior`: `-i` prevents idle system sleep and
/// `-d` prevents display sleep.
pub fn caffeinate_flags(behavior: ModeBehavior) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if behavior.prevent_system_sleep {
        flags.push("-i");
    }
    if behavior.prevent_display_sleep {
        flags.push("-d");
    }
    flags
}

async fn release(mut held: Held) {
    if let Some(mut child) = held.child.take() {
        if let Err(e) = child.kill().await {
            debug!(error = %e, "caffeinate already gone");
        }
    }
}

#[async_trait]
impl PowerAssertionManager for CaffeinateAssertionManager {
    async fn activate(&self, behavior: ModeBehavior) -> Result<(), PowerAssertionError> {
        let mut held = self.held.lock().await;

        if let Some(current) = held.as_mut() {
            let alive = match current.child.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => true,
            };
            if current.behavior == behavior && alive {
                return Ok(());
            }
            if !alive {
                warn!("caffeinate exited unexpectedly, re-creating assertion");
            }
        }
        if let Some(previous) = held.take() {
            release(previous).await;
        }

        let flags = caffeinate_flags(behavior);
        let child = if flags.is_empty() {
            None
        } else {
            Some(self.spawn(&flags)?)
        };
        info!(flags = ?flags, "power assertions held");
        *held = Some(Held { behavior, child });
        Ok(())
    }

    async fn deactivate(&self) {
        let previous = self.held.lock().await.take();
        if let Some(previous) = previous {
            release(previous).await;
            info!("power assertions released");
        }
    }

    async fn is_active(&self) -> bool {
        self.held.lock().await.is_some()
    }
}

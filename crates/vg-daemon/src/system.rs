//! Real collaborators backed by system utilities.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use vg_core::command::{display_command, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use vg_core::types::ProbeSnapshot;

use crate::collaborators::{
    NetworkProbe, PowerState, PowerStateProvider, ProbeError, ProcessControlError, ProcessController,
    ProcessSnapshotProvider,
};

const PS: &str = "/bin/ps";
const ROUTE: &str = "/sbin/route";
const PING: &str = "/sbin/ping";
const KILLALL: &str = "/usr/bin/killall";
const ENV: &str = "/usr/bin/env";
const LOGIN_SHELL: &str = "/bin/zsh";
const OPEN: &str = "/usr/bin/open";
const PMSET: &str = "/usr/bin/pmset";
const IOREG: &str = "/usr/sbin/ioreg";

/// One ping with a one-second wait, plus slack for process start-up.
const PING_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Process snapshot
// ---------------------------------------------------------------------------

pub struct SystemProcessSnapshotProvider {
    runner: Arc<dyn CommandRunner>,
}

impl SystemProcessSnapshotProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ProcessSnapshotProvider for SystemProcessSnapshotProvider {
    async fn running_process_names(&self) -> Result<Vec<String>, ProbeError> {
        let args = ["-axo", "comm="];
        let out = self
            .runner
            .run(PS, &args, DEFAULT_COMMAND_TIMEOUT)
            .await
            .map_err(ProbeError::Command)?;
        if !out.success() {
            return Err(ProbeError::Command(format!(
                "{} exited with status {:?}",
                display_command(PS, &args),
                out.status
            )));
        }
        Ok(parse_process_names(&out.stdout))
    }
}

/// `ps -axo comm=` prints full executable paths; keep the basenames.
pub fn parse_process_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            Path::new(line)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| line.to_string())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Network probe
// ---------------------------------------------------------------------------

pub struct SystemNetworkProbe {
    runner: Arc<dyn CommandRunner>,
    internet_host: String,
}

impl SystemNetworkProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, internet_host: impl Into<String>) -> Self {
        Self {
            runner,
            internet_host: internet_host.into(),
        }
    }

    async fn default_gateway(&self) -> Result<String, ProbeError> {
        let out = self
            .runner
            .run(ROUTE, &["-n", "get", "default"], DEFAULT_COMMAND_TIMEOUT)
            .await
            .map_err(ProbeError::Command)?;
        if !out.success() {
            return Err(ProbeError::Command(format!(
                "route exited with status {:?}",
                out.status
            )));
        }
        parse_default_gateway(&out.stdout).ok_or(ProbeError::InvalidOutput("route"))
    }

    async fn ping(&self, host: &str) -> bool {
        match self
            .runner
            .run(PING, &["-c", "1", "-t", "1", host], PING_TIMEOUT)
            .await
        {
            Ok(out) => out.success(),
            Err(e) => {
                debug!(host, error = %e, "ping did not run");
                false
            }
        }
    }
}

#[async_trait]
impl NetworkProbe for SystemNetworkProbe {
    async fn probe(&self) -> Result<ProbeSnapshot, ProbeError> {
        let gateway = self.default_gateway().await?;
        let (gateway_reachable, internet_reachable) =
            tokio::join!(self.ping(&gateway), self.ping(&self.internet_host));
        Ok(ProbeSnapshot::new(gateway_reachable, internet_reachable))
    }
}

/// Extract the `gateway:` line from `route -n get default`.
pub fn parse_default_gateway(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("gateway:"))
        .map(str::trim)
        .filter(|gw| !gw.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Process control
// ---------------------------------------------------------------------------

pub struct SystemProcessController {
    runner: Arc<dyn CommandRunner>,
}

impl SystemProcessController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Start `program` and leave it running on its own.
    fn spawn_detached(program: &str, args: &[&str], target: &str) -> Result<(), ProcessControlError> {
        tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|child| {
                info!(command = target, pid = ?child.id(), "launched");
            })
            .map_err(|e| ProcessControlError::LaunchFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ProcessController for SystemProcessController {
    async fn force_terminate(&self, name: &str) -> Result<(), ProcessControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let args = ["-9", name];
        // killall's exit status is not meaningful here: no match is fine.
        self.runner
            .run(KILLALL, &args, DEFAULT_COMMAND_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|reason| ProcessControlError::CommandFailed {
                command: format!("{}: {reason}", display_command(KILLALL, &args)),
                code: None,
            })
    }

    async fn launch_by_name(&self, name: &str) -> Result<(), ProcessControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        Self::spawn_detached(ENV, &[name], name)
    }

    async fn launch_command(&self, command: &str) -> Result<(), ProcessControlError> {
        let command = command.trim();
        if command.is_empty() {
            return Ok(());
        }
        Self::spawn_detached(LOGIN_SHELL, &["-l", "-c", command], command)
    }

    async fn open_application(&self, bundle: &Path) -> Result<(), ProcessControlError> {
        let bundle = bundle.to_string_lossy().into_owned();
        let args = [bundle.as_str()];
        let out = self
            .runner
            .run(OPEN, &args, DEFAULT_COMMAND_TIMEOUT)
            .await
            .map_err(|reason| ProcessControlError::LaunchFailed {
                target: bundle.clone(),
                reason,
            })?;
        if !out.success() {
            return Err(ProcessControlError::CommandFailed {
                command: display_command(OPEN, &args),
                code: out.status,
            });
        }
        Ok(())
    }
}

/// The `.app` bundle that owns the launch command's executable, e.g.
/// `/Applications/EXO.app/Contents/MacOS/EXO --serve` gives
/// `/Applications/EXO.app`.
pub fn resolve_app_bundle(launch_command: &str) -> Option<PathBuf> {
    let executable = first_word(launch_command.trim())?;
    let path = Path::new(&executable);
    if !path.is_absolute() {
        return None;
    }
    path.ancestors()
        .find(|ancestor| {
            ancestor
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("app"))
        })
        .map(Path::to_path_buf)
}

/// First shell word, honoring one level of single or double quotes.
fn first_word(command: &str) -> Option<String> {
    let mut chars = command.chars();
    let first = chars.next()?;
    let word: String = if first == '"' || first == '\'' {
        chars.take_while(|c| *c != first).collect()
    } else {
        command.split_whitespace().next()?.to_string()
    };
    (!word.is_empty()).then_some(word)
}

// ---------------------------------------------------------------------------
// Power state
// ---------------------------------------------------------------------------

pub struct SystemPowerStateProvider {
    runner: Arc<dyn CommandRunner>,
}

impl SystemPowerStateProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn read(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.runner.run(program, args, DEFAULT_COMMAND_TIMEOUT).await {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(out) => {
                debug!(program, status = ?out.status, "power state read failed");
                None
            }
            Err(e) => {
                debug!(program, error = %e, "power state read failed");
                None
            }
        }
    }
}

#[async_trait]
impl PowerStateProvider for SystemPowerStateProvider {
    async fn power_state(&self) -> PowerState {
        let (batt, clamshell) = tokio::join!(
            self.read(PMSET, &["-g", "batt"]),
            self.read(IOREG, &["-r", "-k", "AppleClamshellState", "-d", "4"]),
        );
        PowerState {
            is_charging: batt.as_deref().is_some_and(parse_charging),
            lid_closed: clamshell.as_deref().is_some_and(parse_lid_closed),
        }
    }
}

/// `pmset -g batt` reports `charging`, `charged`, `discharging` or
/// `AC attached; not charging`.
pub fn parse_charging(output: &str) -> bool {
    let lower = output.to_lowercase();
    if lower.contains("discharging") || lower.contains("not charging") {
        return false;
    }
    lower.contains("charging") || lower.contains("charged")
}

pub fn parse_lid_closed(output: &str) -> bool {
    output
        .to_lowercase()
        .contains("\"appleclamshellstate\" = yes")
}

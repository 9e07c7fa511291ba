//! Guardian daemon for a long-running workload process.
//!
//! The daemon keeps the workload alive and the machine awake while it runs:
//! - power assertions and privileged sleep inhibition while the target runs
//! - restart escalation when the target stops
//! - connectivity and thermal policy evaluation
//! - a loopback-only JSON status endpoint

pub mod collaborators;
pub mod daemon;
pub mod orchestrator;
pub mod permission;
pub mod power;
pub mod shutdown;
pub mod sleep_guard;
pub mod startup;
pub mod status_api;
pub mod system;
pub mod thunderbolt;

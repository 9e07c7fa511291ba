//! Core domain for the vigil guardian daemon.
//!
//! The policy machines (connectivity escalation, thermal hysteresis), the
//! process matcher, the shared status store and the TOML configuration model
//! are free of OS side effects. The one exception is [`command`], the seam
//! through which the daemon and the privileged helper run system utilities.

pub mod command;
pub mod config;
pub mod connectivity;
pub mod process_matcher;
pub mod state_store;
pub mod thermal;
pub mod types;

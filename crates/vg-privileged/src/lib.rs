//! The privileged channel between the unprivileged daemon and the helper.
//!
//! Requests and replies are newline-delimited JSON over a Unix domain socket.
//! [`client::PrivilegedCommandClient`] adds connection caching, per-attempt
//! timeouts and retry of connection-level failures; [`server`] is the accept
//! loop the helper runs.

pub mod client;
pub mod once;
pub mod protocol;
pub mod server;

pub use client::{ClientConfig, PrivilegedClientError, PrivilegedCommandClient, PrivilegedCommanding};

//! Root-side helper for the vigil daemon.
//!
//! The helper owns every operation that needs elevated privileges: the
//! system-wide sleep override, Wi-Fi power cycling, static addressing of
//! Thunderbolt bridge services and SoC temperature sampling. It serves them on
//! a Unix socket using the [`vg_privileged`] protocol.

pub mod error;
pub mod network_ip;
pub mod service;
pub mod sleep;
pub mod temperature;
pub mod wifi;

pub use error::HelperError;
pub use service::HelperService;

//! Logging for the vigil daemon and helper.
//!
//! - **Logging**: human-readable, JSON, or plain-file output via `tracing-subscriber`
//! - **Redaction**: masking of metadata values before they reach a log line

pub mod logging;
pub mod redact;

use std::sync::Arc;

use tracing::info;
use vg_core::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};

use crate::error::{run_checked, HelperError, Result};

const NETWORKSETUP: &str = "/usr/sbin/networksetup";

/// Power-cycles the Wi-Fi interface.
pub struct WifiController {
    runner: Arc<dyn CommandRunner>,
}

impl WifiController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn restart_wifi(&self) -> Result<()> {
        let listing = run_checked(
            self.runner.as_ref(),
            NETWORKSETUP,
            &["-listallhardwareports"],
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await?;
        let interface = parse_wifi_interface(&listing.stdout).ok_or(HelperError::InterfaceNotFound)?;

        self.set_power(&interface, false).await?;
        self.set_power(&interface, true).await?;
        info!(interface = %interface, "wifi power cycled");
        Ok(())
    }

    async fn set_power(&self, interface: &str, on: bool) -> Result<()> {
        let state = if on { "on" } else { "off" };
        run_checked(
            self.runner.as_ref(),
            NETWORKSETUP,
            &["-setairportpower", interface, state],
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .map(|_| ())
    }
}

/// Find the device of the Wi-Fi (or legacy AirPort) port in
/// `networksetup -listallhardwareports` output.
pub fn parse_wifi_interface(listing: &str) -> Option<String> {
    let lines: Vec<&str> = listing.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        if !(line.contains("Hardware Port: Wi-Fi") || line.contains("Hardware Port: AirPort")) {
            continue;
        }
        let device = lines[index + 1..]
            .iter()
            .map(|l| l.trim())
            .find_map(|l| l.strip_prefix("Device:"))
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(device) = device {
            return Some(device.to_string());
        }
    }
    None
}

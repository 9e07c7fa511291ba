//! Static addressing for point-to-point Thunderbolt bridge services.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use vg_core::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use vg_core::types::{Ipv4Configuration, ServiceIpv4Snapshot};

use crate::error::{run_checked, HelperError, Result};

const NETWORKSETUP: &str = "/usr/sbin/networksetup";
const ROUTE: &str = "/sbin/route";

/// Router placeholder some localized System Settings builds write for "optional".
const OPTIONAL_ROUTER_PLACEHOLDER: &str = "可选";

/// Time for configd to settle after a manual address change.
const ROUTE_SETTLE: Duration = Duration::from_millis(500);

pub struct NetworkIpController {
    runner: Arc<dyn CommandRunner>,
}

impl NetworkIpController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn set_static_ip(&self, service: &str, ip: &str, subnet: &str, router: &str) -> Result<()> {
        require("service name", service)?;
        require("ip address", ip)?;
        require("subnet mask", subnet)?;

        let router = effective_router(ip, router);
        self.networksetup(&["-setmanual", service, ip, subnet, &router]).await?;
        info!(service, ip, subnet, router = %router, "static address applied");

        // A self-routed link makes configd install a scoped default route on
        // the bridge, which would pull internet traffic off the primary link.
        if router == ip {
            if let Some(device) = self.bsd_device(service).await {
                tokio::time::sleep(ROUTE_SETTLE).await;
                self.remove_scoped_default_route(&device).await;
            }
        }
        Ok(())
    }

    pub async fn set_v6_link_local(&self, service: &str) -> Result<()> {
        require("service name", service)?;
        self.networksetup(&["-setv6LinkLocal", service]).await?;
        info!(service, "ipv6 set to link-local");
        Ok(())
    }

    pub async fn current_ipv4_snapshot(&self, service: &str) -> Result<ServiceIpv4Snapshot> {
        require("service name", service)?;
        let output = self.networksetup(&["-getinfo", service]).await?;
        Ok(parse_ipv4_info(&output))
    }

    async fn networksetup(&self, args: &[&str]) -> Result<String> {
        run_checked(self.runner.as_ref(), NETWORKSETUP, args, DEFAULT_COMMAND_TIMEOUT)
            .await
            .map(|out| out.stdout)
    }

    async fn bsd_device(&self, service: &str) -> Option<String> {
        let out = self
            .runner
            .run(NETWORKSETUP, &["-listnetworkserviceorder"], DEFAULT_COMMAND_TIMEOUT)
            .await
            .ok()?;
        if !out.success() {
            return None;
        }
        parse_bsd_device(&out.stdout, service)
    }

    async fn remove_scoped_default_route(&self, device: &str) {
        // The route may not exist yet, or may already be gone.
        match self
            .runner
            .run(ROUTE, &["-n", "delete", "default", "-ifscope", device], DEFAULT_COMMAND_TIMEOUT)
            .await
        {
            Ok(out) if out.success() => info!(device, "scoped default route removed"),
            Ok(out) => debug!(device, status = ?out.status, "no scoped default route to remove"),
            Err(e) => debug!(device, error = %e, "route delete did not run"),
        }
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(HelperError::InvalidParameter(format!("{what} is empty")));
    }
    Ok(())
}

/// An empty router (or the localized "optional" placeholder) routes via the
/// interface's own address. `0.0.0.0` would make configd periodically reset
/// the service to a self-assigned address.
pub fn effective_router(ip: &str, router: &str) -> String {
    let router = router.trim();
    if router.is_empty() || router == OPTIONAL_ROUTER_PLACEHOLDER {
        ip.to_string()
    } else {
        router.to_string()
    }
}

/// Resolve the BSD device for `service` from
/// `networksetup -listnetworkserviceorder`:
///
/// ```text
/// (1) EXO Thunderbolt 2
/// (Hardware Port: Thunderbolt 2, Device: en3)
/// ```
pub fn parse_bsd_device(listing: &str, service: &str) -> Option<String> {
    let mut found = false;
    for line in listing.lines().map(str::trim) {
        if !found {
            if line.starts_with('(') {
                if let Some(close) = line.find(')') {
                    found = line[close + 1..].trim() == service;
                }
            }
            continue;
        }
        if let Some(start) = line.find("Device: ") {
            let device = line[start + "Device: ".len()..]
                .trim_end_matches(')')
                .trim();
            return (!device.is_empty()).then(|| device.to_string());
        }
        found = false;
    }
    None
}

/// Parse `networksetup -getinfo <service>`.
pub fn parse_ipv4_info(output: &str) -> ServiceIpv4Snapshot {
    let mut configuration = Ipv4Configuration::Unknown;
    let mut ip_address = None;

    for line in output.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if lower.contains("dhcp configuration") {
            configuration = Ipv4Configuration::Dhcp;
        } else if lower.contains("manual configuration") {
            configuration = Ipv4Configuration::Manual;
        }

        if lower.starts_with("ip address:") {
            let value = line["ip address:".len()..].trim();
            if !value.is_empty() && value != "none" && value != "(null)" {
                ip_address = Some(value.to_string());
            }
        }
    }

    if ip_address.as_deref().is_some_and(|ip| ip.starts_with("169.254.")) {
        configuration = Ipv4Configuration::SelfAssigned;
    }

    ServiceIpv4Snapshot {
        configuration,
        ip_address,
    }
}

//! Static addressing for Thunderbolt bridge services.
//!
//! Each enabled service gets its IPv4 address set manually and IPv6 switched
//! to link-local, one service at a time. `networksetup` misbehaves when
//! services are reconfigured back to back, hence the pauses.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use vg_core::config::ThunderboltConfig;
use vg_core::types::ThunderboltIpConfig;
use vg_privileged::PrivilegedCommanding;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub succeeded: usize,
    pub failed: usize,
    /// `"<service>: <error>"` for the first service that failed.
    pub first_failure: Option<String>,
}

impl ApplyReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub struct ThunderboltApplier {
    privileged: Arc<dyn PrivilegedCommanding>,
    configs: Vec<ThunderboltIpConfig>,
    inter_config_delay: Duration,
    v6_delay: Duration,
}

impl ThunderboltApplier {
    pub fn new(privileged: Arc<dyn PrivilegedCommanding>, config: &ThunderboltConfig) -> Self {
        Self {
            privileged,
            configs: config.configs.clone(),
            inter_config_delay: Duration::from_secs(config.inter_config_delay_secs),
            v6_delay: Duration::from_secs(config.v6_delay_secs),
        }
    }

    pub async fn apply(&self) -> ApplyReport {
        let mut report = ApplyReport::default();
        let enabled: Vec<&ThunderboltIpConfig> = self.configs.iter().filter(|c| c.enabled).collect();

        for (index, config) in enabled.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.inter_config_delay).await;
            }
            match self.apply_one(config).await {
                Ok(()) => {
                    info!(service = %config.service, ip = %config.ip, "thunderbolt service configured");
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(service = %config.service, error = %e, "thunderbolt service failed");
                    report.failed += 1;
                    report
                        .first_failure
                        .get_or_insert_with(|| format!("{}: {e}", config.service));
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "thunderbolt configuration finished"
        );
        report
    }

    async fn apply_one(&self, config: &ThunderboltIpConfig) -> vg_privileged::client::Result<()> {
        self.privileged
            .set_static_ip(&config.service, &config.ip, &config.subnet, &config.router)
            .await?;
        tokio::time::sleep(self.v6_delay).await;
        self.privileged.set_v6_link_local(&config.service).await
    }
}

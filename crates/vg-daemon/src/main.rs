use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use tracing::{info, warn};

use vg_core::config::Config;
use vg_daemon::daemon::Daemon;
use vg_telemetry::logging::{self, LogFormat};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "vigil-daemon starting");

    let daemon = Daemon::new(config);
    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c"),
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
        shutdown.trigger();
    });
    #[cfg(unix)]
    {
        let shutdown = daemon.shutdown_handle();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                    info!("received SIGTERM");
                    shutdown.trigger();
                }
                Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
            }
        });
    }

    daemon.run().await
}

/// `VIGIL_CONFIG`, then the first argument, then `~/.vigil/config.toml`.
fn load_config() -> Result<Config> {
    let explicit = std::env::var_os("VIGIL_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from));
    match explicit {
        Some(path) if Path::new(&path).exists() => Config::load_from(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        Some(path) => anyhow::bail!("config file {} does not exist", path.display()),
        None => Config::load().context("loading default config"),
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let general = &config.general;
    match &general.log_file {
        Some(file) => logging::init_logging_to_file("vigil-daemon", &general.log_level, Path::new(file))
            .with_context(|| format!("opening log file {file}"))?,
        None => logging::init_with_format(
            "vigil-daemon",
            &general.log_level,
            LogFormat::parse(&general.log_format),
        ),
    }
    Ok(())
}

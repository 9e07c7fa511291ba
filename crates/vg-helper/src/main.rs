use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tracing::{info, warn};

use vg_core::command::SystemCommandRunner;
use vg_core::config::Config;
use vg_helper::HelperService;
use vg_privileged::server;
use vg_telemetry::logging::{self, LogFormat};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match config_path() {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    logging::init_with_format(
        "vigil-helper",
        &config.general.log_level,
        LogFormat::parse(&config.general.log_format),
    );

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        warn!("vigil-helper is not running as root; privileged operations will fail");
    }

    let socket = PathBuf::from(&config.helper.socket_path);
    let listener = server::bind(&socket)
        .with_context(|| format!("binding helper socket {}", socket.display()))?;
    let service = Arc::new(HelperService::new(Arc::new(SystemCommandRunner)));

    info!(socket = %socket.display(), "vigil-helper started");
    server::serve(listener, service, shutdown_requested()).await;

    if let Err(e) = std::fs::remove_file(&socket) {
        warn!(error = %e, "failed to remove helper socket");
    }
    info!("vigil-helper stopped");
    Ok(())
}

/// `VIGIL_CONFIG`, then the first argument. Without either the helper runs
/// on defaults: it is started by launchd as root, so `~/.vigil` would resolve
/// to root's home.
fn config_path() -> Option<PathBuf> {
    std::env::var_os("VIGIL_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
        .filter(|p| Path::new(p).exists())
}

async fn shutdown_requested() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received ctrl-c"),
        _ = term.recv() => info!("received SIGTERM"),
    }
}

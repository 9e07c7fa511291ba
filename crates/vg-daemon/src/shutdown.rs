use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Daemon-wide stop flag.
///
/// The control loop, the status server and the SIGUSR1 listener all await
/// [`wait`](Self::wait). Ctrl-C, SIGTERM and [`Daemon::shutdown`] call
/// [`trigger`](Self::trigger). Once set the flag never clears.
///
/// [`Daemon::shutdown`]: crate::daemon::Daemon::shutdown
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stop: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self { stop: Arc::new(stop) }
    }

    pub fn trigger(&self) {
        let first = self.stop.send_if_modified(|stopping| !std::mem::replace(stopping, true));
        if first {
            info!("shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolve once [`trigger`](Self::trigger) has run, including before the call.
    pub async fn wait(&self) {
        let mut rx = self.stop.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

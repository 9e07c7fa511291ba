//! Client for the privileged helper.
//!
//! One connection is cached and shared by concurrent callers. Every call gets a
//! fresh request id and a [`OnceResult`] slot in the connection's pending map;
//! a background reader routes replies to slots by id. When the connection
//! fails, every pending slot is completed with an interruption so no caller
//! waits for its full timeout on a dead socket.
//!
//! Connection-level failures (unavailable, timeout, interrupted, remote I/O)
//! drop the cached connection and are retried up to `max_attempts`.
//! Failures reported by the helper itself are returned immediately.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vg_core::config::HelperConfig;
use vg_core::types::{Ipv4Configuration, PrivilegeState, ServiceIpv4Snapshot};

use crate::once::OnceResult;
use crate::protocol::{encode_line, Method, Request, Response, ResponseData};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrivilegedClientError {
    #[error("helper connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("helper call timed out after {0:?}")]
    Timeout(Duration),

    #[error("helper connection interrupted: {0}")]
    Interrupted(String),

    #[error("helper remote error: {0}")]
    Remote(String),

    /// The helper ran the operation and reported a failure.
    #[error("{0}")]
    OperationFailed(String),

    #[error("unexpected helper response for {operation}: {received}")]
    UnexpectedResponse {
        operation: &'static str,
        received: String,
    },
}

impl PrivilegedClientError {
    /// Whether the failure concerns the channel rather than the operation.
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::ConnectionUnavailable(_)
            | Self::Timeout(_)
            | Self::Interrupted(_)
            | Self::Remote(_) => true,
            Self::OperationFailed(message) => {
                let lower = message.to_lowercase();
                lower.contains("interrupted") || lower.contains("remote error")
            }
            Self::UnexpectedResponse { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrivilegedClientError>;

type Outcome = Result<ResponseData>;

// ---------------------------------------------------------------------------
// Trait seam
// ---------------------------------------------------------------------------

/// Privileged operations as the daemon sees them.
#[async_trait]
pub trait PrivilegedCommanding: Send + Sync {
    async fn set_disable_sleep(&self, disabled: bool) -> Result<()>;
    async fn restart_wifi(&self) -> Result<()>;
    async fn repair_privileges(&self) -> Result<()>;
    /// Never fails: an unreachable helper reads as [`PrivilegeState::Lost`].
    async fn current_privilege_state(&self) -> PrivilegeState;
    async fn current_soc_temperature(&self) -> Result<f64>;
    async fn set_static_ip(&self, service: &str, ip: &str, subnet: &str, router: &str) -> Result<()>;
    async fn set_v6_link_local(&self, service: &str) -> Result<()>;
    /// Never fails: errors read as [`Ipv4Configuration::Error`].
    async fn current_service_ipv4_snapshot(&self, service: &str) -> ServiceIpv4Snapshot;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub timeout: Duration,
    pub slow_timeout: Duration,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(5),
            slow_timeout: Duration::from_secs(15),
            max_attempts: 3,
            connect_timeout: Duration::from_secs(2),
        }
    }

    pub fn timeout_for(&self, method: &Method) -> Duration {
        if method.is_slow() {
            self.slow_timeout
        } else {
            self.timeout
        }
    }
}

impl From<&HelperConfig> for ClientConfig {
    fn from(cfg: &HelperConfig) -> Self {
        Self {
            socket_path: PathBuf::from(&cfg.socket_path),
            timeout: Duration::from_secs(cfg.timeout_secs),
            slow_timeout: Duration::from_secs(cfg.slow_timeout_secs),
            max_attempts: cfg.max_attempts,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

struct Shared {
    pending: DashMap<u64, Arc<OnceResult<Outcome>>>,
    closed: AtomicBool,
}

impl Shared {
    fn fail_all(&self, error: PrivilegedClientError) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, slot)) = self.pending.remove(&id) {
                slot.complete(Err(error.clone()));
            }
        }
    }
}

struct HelperConnection {
    serial: u64,
    shared: Arc<Shared>,
    writer: Mutex<OwnedWriteHalf>,
    reader: JoinHandle<()>,
}

impl HelperConnection {
    fn start(serial: u64, stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_replies(serial, read_half, shared.clone()));
        Self {
            serial,
            shared,
            writer: Mutex::new(write_half),
            reader,
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn register(&self, id: u64, slot: Arc<OnceResult<Outcome>>) {
        self.shared.pending.insert(id, slot);
    }

    fn forget(&self, id: u64) {
        self.shared.pending.remove(&id);
    }

    async fn send(&self, request: &Request) -> std::io::Result<()> {
        let line = encode_line(request).map_err(std::io::Error::other)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

impl Drop for HelperConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared
            .fail_all(PrivilegedClientError::Interrupted("connection dropped".into()));
    }
}

async fn read_replies(serial: u64, read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let response: Response = match serde_json::from_str(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(connection = serial, error = %e, "malformed helper reply");
                        continue;
                    }
                };
                match shared.pending.remove(&response.id) {
                    Some((_, slot)) => {
                        slot.complete(response.result.map_err(PrivilegedClientError::OperationFailed));
                    }
                    None => {
                        debug!(connection = serial, id = response.id, "reply for abandoned request");
                    }
                }
            }
            Ok(None) => {
                debug!(connection = serial, "helper closed the connection");
                shared.fail_all(PrivilegedClientError::Interrupted(
                    "helper closed the connection".into(),
                ));
                return;
            }
            Err(e) => {
                warn!(connection = serial, error = %e, "helper connection read failed");
                shared.fail_all(PrivilegedClientError::Remote(e.to_string()));
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PrivilegedCommandClient {
    config: ClientConfig,
    connection: Mutex<Option<Arc<HelperConnection>>>,
    next_id: AtomicU64,
    next_serial: AtomicU64,
}

impl PrivilegedCommandClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
            next_serial: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `method` and wait for its reply, retrying connection-level failures.
    pub async fn call(&self, method: Method) -> Result<ResponseData> {
        let attempts = self.config.max_attempts.max(1);
        let timeout = self.config.timeout_for(&method);
        let mut attempt = 1;
        loop {
            match self.call_once(&method, timeout).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_connection_level() && attempt < attempts => {
                    warn!(
                        op = method.name(),
                        attempt,
                        error = %e,
                        "helper call failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    warn!(op = method.name(), attempt, error = %e, "helper call failed");
                    return Err(e);
                }
            }
        }
    }

    async fn call_once(&self, method: &Method, timeout: Duration) -> Result<ResponseData> {
        let conn = self.connection().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (slot, mut rx) = OnceResult::channel();
        conn.register(id, slot.clone());

        // The reader may have failed the map before our insert landed.
        if conn.is_closed() {
            conn.forget(id);
            slot.complete(Err(PrivilegedClientError::Interrupted(
                "connection closed before send".into(),
            )));
        } else if let Err(e) = conn
            .send(&Request {
                id,
                method: method.clone(),
            })
            .await
        {
            conn.forget(id);
            slot.complete(Err(PrivilegedClientError::Remote(e.to_string())));
        }

        let outcome = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(received) => received.unwrap_or_else(|_| {
                Err(PrivilegedClientError::Interrupted("reply slot dropped".into()))
            }),
            Err(_) => {
                conn.forget(id);
                slot.complete(Err(PrivilegedClientError::Timeout(timeout)));
                // A reply may have won the slot right at the deadline.
                rx.try_recv()
                    .unwrap_or(Err(PrivilegedClientError::Timeout(timeout)))
            }
        };

        if let Err(e) = &outcome {
            if e.is_connection_level() {
                self.invalidate(&conn).await;
            }
        }
        outcome
    }

    async fn connection(&self) -> Result<Arc<HelperConnection>> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        let path = &self.config.socket_path;
        let stream = tokio::time::timeout(self.config.connect_timeout, UnixStream::connect(path))
            .await
            .map_err(|_| {
                PrivilegedClientError::ConnectionUnavailable(format!(
                    "connect to {} timed out",
                    path.display()
                ))
            })?
            .map_err(|e| {
                PrivilegedClientError::ConnectionUnavailable(format!("{}: {e}", path.display()))
            })?;

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        info!(connection = serial, socket = %path.display(), "connected to privileged helper");
        let conn = Arc::new(HelperConnection::start(serial, stream));
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection if it is still `conn`. A newer connection
    /// established by another caller is left alone.
    async fn invalidate(&self, conn: &Arc<HelperConnection>) {
        let mut cached = self.connection.lock().await;
        if cached.as_ref().is_some_and(|current| Arc::ptr_eq(current, conn)) {
            debug!(connection = conn.serial, "dropping helper connection");
            *cached = None;
        }
    }

    async fn call_unit(&self, method: Method) -> Result<()> {
        let operation = method.name();
        match self.call(method).await? {
            ResponseData::Ok => Ok(()),
            other => Err(unexpected(operation, other)),
        }
    }
}

fn unexpected(operation: &'static str, data: ResponseData) -> PrivilegedClientError {
    PrivilegedClientError::UnexpectedResponse {
        operation,
        received: format!("{data:?}"),
    }
}

#[async_trait]
impl PrivilegedCommanding for PrivilegedCommandClient {
    async fn set_disable_sleep(&self, disabled: bool) -> Result<()> {
        self.call_unit(Method::SetDisableSleep { disabled }).await
    }

    async fn restart_wifi(&self) -> Result<()> {
        self.call_unit(Method::RestartWifi).await
    }

    async fn repair_privileges(&self) -> Result<()> {
        self.call_unit(Method::RepairPrivileges).await
    }

    async fn current_privilege_state(&self) -> PrivilegeState {
        match self.call(Method::CurrentPrivilegeState).await {
            Ok(ResponseData::PrivilegeState(state)) => state,
            Ok(other) => {
                warn!(received = ?other, "unexpected privilege state reply");
                PrivilegeState::Lost
            }
            Err(_) => PrivilegeState::Lost,
        }
    }

    async fn current_soc_temperature(&self) -> Result<f64> {
        match self.call(Method::CurrentSocTemperature).await? {
            ResponseData::Temperature(celsius) => Ok(celsius),
            other => Err(unexpected("current_soc_temperature", other)),
        }
    }

    async fn set_static_ip(&self, service: &str, ip: &str, subnet: &str, router: &str) -> Result<()> {
        self.call_unit(Method::SetStaticIp {
            service: service.to_string(),
            ip: ip.to_string(),
            subnet: subnet.to_string(),
            router: router.to_string(),
        })
        .await
    }

    async fn set_v6_link_local(&self, service: &str) -> Result<()> {
        self.call_unit(Method::SetV6LinkLocal {
            service: service.to_string(),
        })
        .await
    }

    async fn current_service_ipv4_snapshot(&self, service: &str) -> ServiceIpv4Snapshot {
        let method = Method::CurrentServiceIpv4Snapshot {
            service: service.to_string(),
        };
        match self.call(method).await {
            Ok(ResponseData::Ipv4Snapshot(snapshot)) => snapshot,
            Ok(other) => {
                warn!(received = ?other, "unexpected ipv4 snapshot reply");
                ServiceIpv4Snapshot {
                    configuration: Ipv4Configuration::Error,
                    ip_address: None,
                }
            }
            Err(_) => ServiceIpv4Snapshot {
                configuration: Ipv4Configuration::Error,
                ip_address: None,
            },
        }
    }
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use vg_core::types::{Ipv4Configuration, PrivilegeState, ServiceIpv4Snapshot};
use vg_privileged::protocol::{encode_line, Method, Request, Response, ResponseData};
use vg_privileged::server::{self, RequestHandler};
use vg_privileged::{ClientConfig, PrivilegedClientError, PrivilegedCommandClient, PrivilegedCommanding};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeHelper {
    calls: AtomicUsize,
    fail_sleep_toggle: bool,
    wifi_delay: Option<Duration>,
}

#[async_trait]
impl RequestHandler for FakeHelper {
    async fn handle(&self, method: Method) -> Result<ResponseData, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match method {
            Method::SetDisableSleep { .. } if self.fail_sleep_toggle => {
                Err("pmset exited with status 1".into())
            }
            Method::SetDisableSleep { .. } => Ok(ResponseData::Ok),
            Method::RestartWifi => {
                if let Some(delay) = self.wifi_delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(ResponseData::Ok)
            }
            Method::CurrentPrivilegeState => Ok(ResponseData::PrivilegeState(PrivilegeState::Healthy)),
            Method::CurrentSocTemperature => Ok(ResponseData::Temperature(71.5)),
            Method::CurrentServiceIpv4Snapshot { .. } => {
                Ok(ResponseData::Ipv4Snapshot(ServiceIpv4Snapshot {
                    configuration: Ipv4Configuration::Manual,
                    ip_address: Some("10.0.0.2".into()),
                }))
            }
            _ => Ok(ResponseData::Ok),
        }
    }
}

fn socket_in(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("helper.sock")
}

fn spawn_helper(path: &Path, helper: Arc<FakeHelper>) {
    let listener = server::bind(path).expect("bind helper socket");
    tokio::spawn(server::serve(listener, helper, std::future::pending()));
}

fn fast_config(path: &Path) -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_millis(200),
        slow_timeout: Duration::from_millis(400),
        ..ClientConfig::new(path)
    }
}

/// Raw helper that counts accepted connections. When `drop_first` is set the
/// first connection is closed after reading one request.
fn spawn_counting_helper(path: &Path, drop_first: bool) -> Arc<AtomicUsize> {
    let listener = UnixListener::bind(path).expect("bind raw socket");
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if drop_first && n == 0 {
                        return;
                    }
                    let request: Request = serde_json::from_str(&line).unwrap();
                    let reply = Response {
                        id: request.id,
                        result: Ok(ResponseData::Ok),
                    };
                    let out = encode_line(&reply).unwrap();
                    if writer.write_all(out.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    accepts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn round_trips_typed_operations() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    spawn_helper(&path, Arc::new(FakeHelper::default()));

    let client = PrivilegedCommandClient::new(fast_config(&path));
    client.set_disable_sleep(true).await.unwrap();
    assert_eq!(client.current_soc_temperature().await.unwrap(), 71.5);
    assert_eq!(client.current_privilege_state().await, PrivilegeState::Healthy);

    let snapshot = client.current_service_ipv4_snapshot("EXO Thunderbolt 1").await;
    assert_eq!(snapshot.configuration, Ipv4Configuration::Manual);
    assert_eq!(snapshot.ip_address.as_deref(), Some("10.0.0.2"));
}

#[tokio::test]
async fn business_failures_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let helper = Arc::new(FakeHelper {
        fail_sleep_toggle: true,
        ..FakeHelper::default()
    });
    spawn_helper(&path, helper.clone());

    let client = PrivilegedCommandClient::new(fast_config(&path));
    let err = client.set_disable_sleep(true).await.unwrap_err();

    assert_eq!(
        err,
        PrivilegedClientError::OperationFailed("pmset exited with status 1".into())
    );
    assert_eq!(helper.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timeouts_are_retried_up_to_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let helper = Arc::new(FakeHelper {
        wifi_delay: Some(Duration::from_secs(2)),
        ..FakeHelper::default()
    });
    spawn_helper(&path, helper.clone());

    let client = PrivilegedCommandClient::new(ClientConfig {
        timeout: Duration::from_millis(50),
        ..fast_config(&path)
    });
    let err = client.restart_wifi().await.unwrap_err();

    assert!(matches!(err, PrivilegedClientError::Timeout(_)));
    assert_eq!(helper.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_helper_is_connection_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let client = PrivilegedCommandClient::new(fast_config(&socket_in(&dir)));

    let err = client.restart_wifi().await.unwrap_err();
    assert!(matches!(err, PrivilegedClientError::ConnectionUnavailable(_)));
    assert!(err.is_connection_level());

    assert_eq!(client.current_privilege_state().await, PrivilegeState::Lost);
    assert_eq!(
        client.current_service_ipv4_snapshot("en5").await.configuration,
        Ipv4Configuration::Error
    );
}

#[tokio::test]
async fn cached_connection_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let accepts = spawn_counting_helper(&path, false);

    let client = PrivilegedCommandClient::new(fast_config(&path));
    for _ in 0..4 {
        client.repair_privileges().await.unwrap();
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnects_after_helper_drops_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let accepts = spawn_counting_helper(&path, true);

    let client = PrivilegedCommandClient::new(ClientConfig {
        timeout: Duration::from_secs(5),
        ..fast_config(&path)
    });
    let started = Instant::now();
    client.restart_wifi().await.unwrap();

    assert_eq!(accepts.load(Ordering::SeqCst), 2);
    // The closed socket fails the pending call at once instead of at its deadline.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn interruption_surfaces_when_attempts_run_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    spawn_counting_helper(&path, true);

    let client = PrivilegedCommandClient::new(ClientConfig {
        timeout: Duration::from_secs(5),
        max_attempts: 1,
        ..fast_config(&path)
    });
    let err = client.restart_wifi().await.unwrap_err();
    assert!(matches!(err, PrivilegedClientError::Interrupted(_)));
}

#[tokio::test]
async fn concurrent_callers_share_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_in(&dir);
    let accepts = spawn_counting_helper(&path, false);

    let client = Arc::new(PrivilegedCommandClient::new(fast_config(&path)));
    // Establish the connection before fanning out.
    client.repair_privileges().await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.set_disable_sleep(i % 2 == 0).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

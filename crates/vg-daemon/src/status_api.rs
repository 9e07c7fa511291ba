//! Local read-only status endpoint.
//!
//! A single `GET /status` route serving the [`StateStore`] snapshot as JSON.
//! The listener only ever hands loopback peers to the HTTP stack; anything
//! else gets a canned `403` and is closed before a byte is read.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{ALLOW, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use vg_core::state_store::StateStore;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, thiserror::Error)]
pub enum StatusApiError {
    #[error("failed to bind status API on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("status API must listen on loopback, got {0}")]
    NonLoopback(String),

    #[error("status API server error: {0}")]
    Serve(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn status_router(store: Arc<StateStore>) -> Router {
    Router::new()
        .route(
            "/status",
            get(status)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(SetResponseHeaderLayer::overriding(
            CONNECTION,
            HeaderValue::from_static("close"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

fn json(status: StatusCode, body: impl Into<axum::body::Body>) -> Response {
    (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body.into()).into_response()
}

async fn status(State(store): State<Arc<StateStore>>) -> Response {
    let payload = store.snapshot_now().await;
    match serde_json::to_vec(&payload) {
        Ok(bytes) => json(StatusCode::OK, bytes),
        Err(e) => {
            warn!(error = %e, "status serialization failed");
            json(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"internal"}"#)
        }
    }
}

async fn method_not_allowed() -> Response {
    let mut response = json(StatusCode::METHOD_NOT_ALLOWED, r#"{"error":"method_not_allowed"}"#);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET"));
    response
}

async fn not_found() -> Response {
    json(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#)
}

// ---------------------------------------------------------------------------
// Loopback listener
// ---------------------------------------------------------------------------

pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

const FORBIDDEN_BODY: &str = r#"{"error":"forbidden"}"#;

/// Write a complete `403` response and close the write side.
pub async fn write_forbidden<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 403 Forbidden\r\nContent-Type: {JSON_CONTENT_TYPE}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{FORBIDDEN_BODY}",
        FORBIDDEN_BODY.len()
    );
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await
}

/// TCP listener that only yields loopback peers.
pub struct LoopbackListener {
    inner: TcpListener,
}

impl LoopbackListener {
    pub async fn bind(host: &str, port: u16) -> Result<Self, StatusApiError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            if !is_loopback(ip) {
                return Err(StatusApiError::NonLoopback(host.to_string()));
            }
        }
        let inner = TcpListener::bind((host, port))
            .await
            .map_err(|source| StatusApiError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let local = inner.local_addr()?;
        if !is_loopback(local.ip()) {
            return Err(StatusApiError::NonLoopback(local.to_string()));
        }
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl axum::serve::Listener for LoopbackListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = (Self::Io, Self::Addr)> + Send {
        async move {
            loop {
                match self.inner.accept().await {
                    Ok((stream, peer)) if is_loopback(peer.ip()) => return (stream, peer),
                    Ok((mut stream, peer)) => {
                        warn!(%peer, "rejected non-loopback status client");
                        tokio::spawn(async move {
                            if let Err(e) = write_forbidden(&mut stream).await {
                                debug!(%peer, error = %e, "forbidden response not delivered");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "status accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Serve the status route until `shutdown` resolves.
pub async fn serve<F>(listener: LoopbackListener, store: Arc<StateStore>, shutdown: F) -> Result<(), StatusApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "status API listening");
    axum::serve(listener, status_router(store))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("status API stopped");
    Ok(())
}

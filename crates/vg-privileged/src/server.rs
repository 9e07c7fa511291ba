//! Accept loop for the helper side of the privileged channel.
//!
//! Each connection is read line by line. Requests are dispatched concurrently
//! so a slow `powermetrics` sample does not hold up a quick sleep toggle that
//! arrives behind it on the same connection; replies share one writer.

use std::future::Future;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::protocol::{encode_line, Method, Request, Response, ResponseData};

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, method: Method) -> Result<ResponseData, String>;
}

/// Bind the helper socket, replacing a stale one left by a previous run.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    // The daemon runs as the logged-in user.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    info!(socket = %path.display(), "helper socket bound");
    Ok(listener)
}

/// Serve connections until `shutdown` resolves.
pub async fn serve<H, F>(listener: UnixListener, handler: Arc<H>, shutdown: F)
where
    H: RequestHandler,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            debug!(error = %e, "helper connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept helper connection");
                }
            },
            () = &mut shutdown => {
                info!("helper server stopping");
                break;
            }
        }
    }
}

async fn handle_connection<H: RequestHandler>(stream: UnixStream, handler: Arc<H>) -> io::Result<()> {
    let (reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "dropping malformed helper request");
                continue;
            }
        };

        let handler = handler.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let op = request.method.name();
            let result = handler.handle(request.method).await;
            if let Err(e) = &result {
                warn!(op, error = %e, "helper operation failed");
            }
            let response = Response {
                id: request.id,
                result,
            };
            if let Err(e) = write_response(&writer, &response).await {
                debug!(op, error = %e, "failed to write helper response");
            }
        });
    }
    Ok(())
}

async fn write_response(writer: &Mutex<OwnedWriteHalf>, response: &Response) -> io::Result<()> {
    let line = encode_line(response).map_err(io::Error::other)?;
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

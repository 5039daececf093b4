//! Unix-domain control socket.
//!
//! The wire contract is single-shot: a client connects, writes one
//! [`ControlRequest`] as a JSON line, reads back one [`ControlResponse`]
//! JSON line, and the daemon closes the connection. No JSON-RPC envelope,
//! no event streaming — `ControlRequest`/`ControlResponse` are already
//! self-describing tagged unions.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::protocol::{ControlRequest, ControlResponse};

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    MalformedRequest(serde_json::Error),
    #[error("connection closed before a request was sent")]
    EmptyRequest,
}

pub type Result<T> = std::result::Result<T, ControlError>;

/// Dispatches a parsed request to whatever owns the node's live state
/// (routing table, trust graph, relay service, ...) and produces a response.
pub trait ControlHandler: Send + Sync {
    fn handle(
        &self,
        request: ControlRequest,
    ) -> Pin<Box<dyn Future<Output = ControlResponse> + Send + '_>>;
}

/// Bound listener for the administrative control socket.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds the control socket at `path`, removing a stale socket file
    /// left behind by a prior, uncleanly-stopped daemon.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Accepts the next inbound control connection. Intended to be polled
    /// as one branch of the daemon's main `tokio::select!` loop.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Services exactly one request on `stream`, then lets it close.
pub async fn serve_request(stream: UnixStream, handler: &dyn ControlHandler) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(ControlError::EmptyRequest);
    }

    let response = match serde_json::from_str::<ControlRequest>(line.trim_end()) {
        Ok(request) => {
            debug!(?request, "handling control request");
            handler.handle(request).await
        }
        Err(e) => {
            warn!(error = %e, "malformed control request");
            ControlResponse::error(format!("malformed request: {e}"))
        }
    };

    let mut payload = serde_json::to_vec(&response).map_err(ControlError::MalformedRequest)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct EchoHandler;

    impl ControlHandler for EchoHandler {
        fn handle(
            &self,
            request: ControlRequest,
        ) -> Pin<Box<dyn Future<Output = ControlResponse> + Send + '_>> {
            Box::pin(async move {
                match request {
                    ControlRequest::Status => ControlResponse::Status {
                        lockdown: false,
                        airlock: "open".into(),
                        federated_sessions: 0,
                        peer_count: 0,
                    },
                    _ => ControlResponse::error("unsupported in test"),
                }
            })
        }
    }

    #[tokio::test]
    async fn binds_and_removes_stale_socket_on_rebind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capsule.sock");
        let server = ControlServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
        let server = ControlServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn serves_single_request_then_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capsule.sock");
        let server = ControlServer::bind(&path).unwrap();

        let client_path = path.clone();
        let client = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut stream = UnixStream::connect(&client_path).await.unwrap();
            stream.write_all(b"{\"type\":\"status\"}\n").await.unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let stream = server.accept().await.unwrap();
        serve_request(stream, &EchoHandler).await.unwrap();

        let response = client.await.unwrap();
        assert!(response.contains("\"type\":\"status\""));
    }
}

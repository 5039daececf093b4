//! Thin single-shot client for the daemon's control socket.

use std::path::PathBuf;

use capsule_control::{ControlRequest, ControlResponse};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("daemon is not running at {0}")]
    DaemonNotRunning(PathBuf),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("invalid response from daemon: {0}")]
    InvalidResponse(String),
    #[error("daemon returned an error: {0}")]
    DaemonError(String),
}

pub type Result<T> = std::result::Result<T, IpcError>;

/// Connects to the daemon's control socket, sends exactly one
/// [`ControlRequest`], and reads exactly one [`ControlResponse`].
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Sends `request` over a fresh connection and returns the daemon's
    /// response. A connection is opened and closed per call: the control
    /// protocol is single-shot, not a persistent session.
    pub async fn send(&self, request: ControlRequest) -> Result<ControlResponse> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ) {
                IpcError::DaemonNotRunning(self.socket_path.clone())
            } else {
                IpcError::ConnectionFailed(e.to_string())
            }
        })?;

        let (reader, mut writer) = stream.into_split();

        let mut payload =
            serde_json::to_vec(&request).map_err(|e| IpcError::InvalidResponse(e.to_string()))?;
        payload.push(b'\n');
        debug!(?request, "sending control request");
        writer
            .write_all(&payload)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

        let response: ControlResponse = serde_json::from_str(line.trim_end())
            .map_err(|e| IpcError::InvalidResponse(e.to_string()))?;

        if let ControlResponse::Error { message } = &response {
            return Err(IpcError::DaemonError(message.clone()));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connecting_to_missing_socket_reports_daemon_not_running() {
        let client = IpcClient::new(PathBuf::from("/tmp/capsule-test-definitely-absent.sock"));
        let err = client.send(ControlRequest::Status).await.unwrap_err();
        assert!(matches!(err, IpcError::DaemonNotRunning(_)));
    }
}
